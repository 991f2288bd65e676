//! Sweep scheduling
//!
//! The sweep does not schedule itself. A `SweepScheduler` decides when
//! `RecoverySweep::run` is called and hands back a handle that stops it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::sweep::RecoverySweep;
use crate::observability::{log_event_with_fields, Event};

/// Decides when the recovery sweep runs
pub trait SweepScheduler: Send + Sync + fmt::Debug {
    /// Start running `sweep`; must be called within a tokio runtime
    fn schedule(&self, sweep: Arc<RecoverySweep>) -> ScheduledSweep;
}

/// Handle to a running schedule
#[derive(Debug)]
pub struct ScheduledSweep {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduledSweep {
    /// Wrap a schedule task that exits once `stop` carries `true`
    pub fn new(stop: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { stop, task }
    }

    /// Signal the schedule to stop and wait for a running sweep to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Runs the sweep on a fixed period, first run immediately
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    period: Duration,
}

impl IntervalScheduler {
    /// Sweep every `period`
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl SweepScheduler for IntervalScheduler {
    fn schedule(&self, sweep: Arc<RecoverySweep>) -> ScheduledSweep {
        let (stop, mut stopped) = watch::channel(false);
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sweep.run().await {
                            log_event_with_fields(
                                Event::RecoverySweepFailed,
                                &[("error", e.to_string().as_str())],
                            );
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        ScheduledSweep::new(stop, task)
    }
}
