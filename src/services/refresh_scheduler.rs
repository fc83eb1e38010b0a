//! Periodic refresh scheduler.
//!
//! Drives incremental passes on a fixed interval:
//! - A tick that finds a pass still in flight is skipped, not queued
//! - A failed pass is logged and the schedule continues
//! - A stop request ends the loop before the next tick

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::errors::GraphResult;
use crate::services::entity_graph::RefreshReport;

/// Something the scheduler can refresh.
#[async_trait]
pub trait RefreshTarget: Send + Sync + 'static {
    /// Run one incremental pass, unless a pass is already in flight.
    ///
    /// Returns `None` when the pass was skipped.
    async fn try_refresh(&self) -> Option<GraphResult<RefreshReport>>;

    /// Identifier used in logs and events.
    fn instance_id(&self) -> Uuid;
}

/// Shortest period the scheduler ticks at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Longest period the scheduler ticks at.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the refresh scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between passes. The first pass runs one interval after start.
    pub interval: Duration,
}

impl SchedulerConfig {
    pub const fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// The configured interval, clamped to `MIN_INTERVAL..=MAX_INTERVAL`.
    pub fn period(&self) -> Duration {
        self.interval.clamp(MIN_INTERVAL, MAX_INTERVAL)
    }
}

/// Event emitted by the refresh scheduler.
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    /// Scheduler started.
    Started { instance: Uuid },
    /// A pass completed.
    Completed {
        instance: Uuid,
        run_number: u64,
        report: RefreshReport,
    },
    /// A pass failed; the schedule continues.
    Failed {
        instance: Uuid,
        run_number: u64,
        error: String,
    },
    /// A tick found the previous pass still running.
    Skipped { instance: Uuid, run_number: u64 },
    /// Scheduler stopped.
    Stopped { instance: Uuid },
}

/// Status of the refresh scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub running: bool,
    /// Ticks handled, including skipped ones.
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
    /// Completion time of the last successful pass.
    pub last_run: Option<Instant>,
}

/// Handle to control a running scheduler.
pub struct SchedulerHandle {
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    status: Arc<RwLock<SchedulerStatus>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request the scheduler to stop. A pass already in flight is not
    /// interrupted; no further pass starts.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }

    /// Check if stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Get current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "Refresh scheduler task failed");
        }
    }
}

/// Background refresh loop for one target.
pub struct RefreshScheduler<T: RefreshTarget> {
    target: Arc<T>,
    config: SchedulerConfig,
    status: Arc<RwLock<SchedulerStatus>>,
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    events: broadcast::Sender<RefreshEvent>,
}

impl<T: RefreshTarget> RefreshScheduler<T> {
    pub fn new(target: Arc<T>, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            target,
            config,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            events,
        }
    }

    /// Publish events on an existing channel.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Sender<RefreshEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Spawn the loop onto the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let stop_flag = Arc::clone(&self.stop_flag);
        let shutdown = Arc::clone(&self.shutdown);
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(self.run_loop());
        SchedulerHandle {
            stop_flag,
            shutdown,
            status,
            task,
        }
    }

    async fn run_loop(self) {
        let instance = self.target.instance_id();
        self.status.write().await.running = true;
        let period = self.config.period();
        info!(%instance, interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "Refresh scheduler started");
        let _ = self.events.send(RefreshEvent::Started { instance });

        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                () = self.shutdown.notified() => break,
            }

            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            self.run_cycle(instance).await;
        }

        self.status.write().await.running = false;
        info!(%instance, "Refresh scheduler stopped");
        let _ = self.events.send(RefreshEvent::Stopped { instance });
    }

    async fn run_cycle(&self, instance: Uuid) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_runs += 1;
            status.total_runs
        };

        match self.target.try_refresh().await {
            None => {
                self.status.write().await.skipped_runs += 1;
                info!(%instance, run_number, "Previous refresh still running, skipping");
                let _ = self.events.send(RefreshEvent::Skipped {
                    instance,
                    run_number,
                });
            }
            Some(Ok(report)) => {
                {
                    let mut status = self.status.write().await;
                    status.successful_runs += 1;
                    status.last_run = Some(Instant::now());
                }
                debug!(%instance, run_number, fetched = report.total_fetched(), "Scheduled refresh completed");
                let _ = self.events.send(RefreshEvent::Completed {
                    instance,
                    run_number,
                    report,
                });
            }
            Some(Err(e)) => {
                self.status.write().await.failed_runs += 1;
                error!(%instance, run_number, error = %e, "Scheduled refresh failed");
                let _ = self.events.send(RefreshEvent::Failed {
                    instance,
                    run_number,
                    error: e.to_string(),
                });
            }
        }
    }
}
