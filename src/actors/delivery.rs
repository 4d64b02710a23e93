//! DeliveryActor - drains the outbound queue on a short interval
//!
//! Batches run inline in the actor loop, so two batches never overlap and a
//! `DrainNow` issued during a tick simply runs after it.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, instrument, warn};

use super::messages::DeliveryCommand;
use crate::delivery::{DeliveryReport, DeliveryWorker};
use crate::oplog::OperationalLog;

pub struct DeliveryActor {
    worker: DeliveryWorker,
    oplog: OperationalLog,
    command_rx: mpsc::Receiver<DeliveryCommand>,
    interval_duration: Duration,
}

impl DeliveryActor {
    pub fn new(
        worker: DeliveryWorker,
        oplog: OperationalLog,
        command_rx: mpsc::Receiver<DeliveryCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            worker,
            oplog,
            command_rx,
            interval_duration,
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting delivery actor");

        let mut ticker = interval_at(
            Instant::now() + self.interval_duration,
            self.interval_duration,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.drain().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DeliveryCommand::DrainNow { respond_to } => {
                            debug!("received DrainNow command");
                            let result = self.drain().await;
                            let _ = respond_to.send(result);
                        }

                        DeliveryCommand::Shutdown => {
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

        debug!("delivery actor stopped");
    }

    /// Run one batch, failures end up in the operational log
    async fn drain(&self) -> Result<DeliveryReport> {
        match self.worker.run_batch(Utc::now()).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("delivery batch failed: {e}");
                self.oplog
                    .error("delivery", "Delivery batch failed", Some(&e.to_string()))
                    .await;
                Err(e).context("delivery batch failed")
            }
        }
    }
}

/// Handle for controlling a DeliveryActor
#[derive(Clone)]
pub struct DeliveryHandle {
    sender: mpsc::Sender<DeliveryCommand>,
}

impl DeliveryHandle {
    pub fn spawn(
        worker: DeliveryWorker,
        oplog: OperationalLog,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = DeliveryActor::new(worker, oplog, cmd_rx, interval_duration);
        tokio::spawn(actor.run());
        Self { sender: cmd_tx }
    }

    /// Deliver one batch immediately and wait for the report
    pub async fn drain_now(&self) -> Result<DeliveryReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeliveryCommand::DrainNow { respond_to: tx })
            .await
            .context("failed to send DrainNow command")?;

        rx.await.context("failed to receive delivery report")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(DeliveryCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
