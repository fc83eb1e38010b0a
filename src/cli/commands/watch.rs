//! Implementation of the `entity-graph watch` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::open_graph;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, GraphOptions};
use crate::services::{GraphStats, RefreshEvent, RefreshReport};

/// Refresh interval used when neither the flag nor the config sets one.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Graph spec file (YAML)
    #[arg(short, long)]
    pub spec: PathBuf,

    /// Refresh interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Trailing update window in seconds
    #[arg(long)]
    pub window_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RefreshOutput {
    pub run_number: u64,
    pub report: RefreshReport,
    pub stats: GraphStats,
}

impl CommandOutput for RefreshOutput {
    fn to_human(&self) -> String {
        format!(
            "Refresh #{}: {} record(s) updated, {} link(s) added in {}ms\n{}",
            self.run_number,
            self.report.total_fetched(),
            self.report.links.attached,
            self.report.duration_ms,
            TableFormatter::new().format_stats(&self.stats)
        )
    }
}

/// Graph options for a watch run: flags override the configuration.
pub fn watch_options(args: &WatchArgs, configured: &GraphOptions) -> GraphOptions {
    let interval = args
        .interval_ms
        .or(configured.refresh_interval_ms)
        .map_or(DEFAULT_WATCH_INTERVAL, Duration::from_millis);
    let mut options = configured.clone().with_refresh_interval(interval);
    if let Some(window) = args.window_secs {
        options = options.with_update_window(Duration::from_secs(window));
    }
    options
}

pub async fn execute(args: WatchArgs, config: &Config, json_mode: bool) -> Result<()> {
    let options = watch_options(&args, &config.graph);
    if options.refresh_interval_ms == Some(0) || options.update_window_secs == 0 {
        anyhow::bail!("Refresh interval and update window must be greater than zero");
    }
    let graph = open_graph(&args.spec, config, options).await?;
    let mut events = graph.subscribe();

    let report = match graph.initialize().await {
        Ok(report) => report,
        Err(e) => {
            graph.teardown().await;
            return Err(e).context("Failed to load graph");
        }
    };
    output(
        &RefreshOutput {
            run_number: 0,
            report,
            stats: graph.stats(),
        },
        json_mode,
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupted, stopping refresh");
                break;
            }
            event = events.recv() => match event {
                Ok(RefreshEvent::Completed { run_number, report, .. }) => {
                    output(&RefreshOutput { run_number, report, stats: graph.stats() }, json_mode);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "Refresh events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    graph.teardown().await;
    Ok(())
}
