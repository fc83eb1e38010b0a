use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime options of one entity graph instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GraphOptions {
    /// Period between incremental refreshes. `None` keeps the graph a
    /// one-shot snapshot.
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,

    /// Trailing window, in seconds, selecting recently updated rows.
    #[serde(default = "default_update_window_secs")]
    pub update_window_secs: u64,

    /// Optional per-query timeout.
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
}

const fn default_update_window_secs() -> u64 {
    60
}

/// Milliseconds in `duration`, rounded up so that a non-zero duration never
/// becomes 0.
fn whole_millis(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 && !duration.is_zero() {
        1
    } else {
        millis
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            refresh_interval_ms: None,
            update_window_secs: default_update_window_secs(),
            query_timeout_ms: None,
        }
    }
}

impl GraphOptions {
    /// Refresh every `interval`, rounded up to whole milliseconds.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = Some(whole_millis(interval));
        self
    }

    #[must_use]
    pub const fn with_update_window(mut self, window: Duration) -> Self {
        self.update_window_secs = window.as_secs();
        self
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(whole_millis(timeout));
        self
    }

    /// Period of the scheduled refresh. An interval of 0 disables it.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub const fn update_window(&self) -> Duration {
        Duration::from_secs(self.update_window_secs)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}
