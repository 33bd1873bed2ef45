use crate::collectors::Collect;
use crate::config::MIN_INTERVAL_SECS;
use crate::store::SnapshotStore;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Drives collection cycles at a fixed interval. Consumed by [`Scheduler::start`].
pub struct Scheduler<C> {
    collector: C,
    store: SnapshotStore,
    interval: Duration,
}

/// Running loop returned by [`Scheduler::start`].
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<C: Collect> Scheduler<C> {
    pub fn new(collector: C, store: SnapshotStore, interval_secs: u64) -> Self {
        Self {
            collector,
            store,
            interval: Duration::from_secs(interval_secs.max(MIN_INTERVAL_SECS)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the loop. The first cycle runs without waiting for a tick.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            self.collector,
            self.store,
            self.interval,
            shutdown_rx,
        ));
        SchedulerHandle { shutdown_tx, task }
    }
}

impl SchedulerHandle {
    /// Requests a stop. A cycle already running still publishes.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(error = %err, "scheduler task ended abnormally");
        }
    }
}

async fn run_loop<C: Collect>(
    mut collector: C,
    store: SnapshotStore,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "collection loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("stop requested, leaving collection loop");
                    break;
                }
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let cycle = tokio::task::spawn_blocking(move || {
                    let snapshot = collector.collect();
                    (collector, snapshot)
                });
                match cycle.await {
                    Ok((returned, snapshot)) => {
                        collector = returned;
                        store.publish(snapshot);
                    }
                    Err(err) => {
                        error!(error = %err, "collection cycle panicked, stopping");
                        break;
                    }
                }
            }
        }
    }
}
