//! MonitorActor - drives the periodic monitoring cycle
//!
//! ```text
//! Timer tick ──► spawn cycle task ──► MonitorScheduler::run_cycle_guarded
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```
//!
//! The cycle runs in its own task so the command loop stays responsive while
//! probes wait on retries. Overlap is prevented by the scheduler's in-flight
//! guard, not by the actor.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, warn};

use super::messages::MonitorCommand;
use crate::monitors::{CycleOutcome, MonitorScheduler};

pub struct MonitorActor {
    scheduler: MonitorScheduler,
    command_rx: mpsc::Receiver<MonitorCommand>,
    interval_duration: Duration,
}

impl MonitorActor {
    pub fn new(
        scheduler: MonitorScheduler,
        command_rx: mpsc::Receiver<MonitorCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            scheduler,
            command_rx,
            interval_duration,
        }
    }

    /// Run until a Shutdown command arrives or every handle is dropped.
    ///
    /// The first cycle starts one full interval after spawning.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting monitor actor");

        let mut ticker = interval_at(
            Instant::now() + self.interval_duration,
            self.interval_duration,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.scheduler.clone();
                    tokio::spawn(async move {
                        if let CycleOutcome::Skipped = scheduler.run_cycle_guarded().await {
                            debug!("tick skipped, cycle still in flight");
                        }
                    });
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let scheduler = self.scheduler.clone();
                            tokio::spawn(async move {
                                let _ = respond_to.send(scheduler.run_cycle_guarded().await);
                            });
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("monitor actor stopped");
    }
}

/// Handle for controlling a MonitorActor
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    /// Spawn the actor as a tokio task and return its handle
    pub fn spawn(scheduler: MonitorScheduler, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = MonitorActor::new(scheduler, cmd_rx, interval_duration);
        tokio::spawn(actor.run());
        Self { sender: cmd_tx }
    }

    /// Run a cycle immediately and wait for its outcome
    pub async fn run_now(&self) -> Result<CycleOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive cycle outcome")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
