//! Commands accepted by the background actors
//!
//! Both actors are driven by their own interval timer. The commands exist so
//! the hub and the tests can force a run and stop the actor cleanly.

use tokio::sync::oneshot;

use crate::delivery::DeliveryReport;
use crate::monitors::CycleOutcome;

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a monitoring cycle now, bypassing the interval timer
    ///
    /// Answers `CycleOutcome::Skipped` when a cycle is already in flight.
    RunNow {
        respond_to: oneshot::Sender<CycleOutcome>,
    },

    /// Stop ticking. A cycle that is already running finishes on its own.
    Shutdown,
}

/// Commands that can be sent to the DeliveryActor
#[derive(Debug)]
pub enum DeliveryCommand {
    /// Deliver one batch of due jobs now
    DrainNow {
        respond_to: oneshot::Sender<anyhow::Result<DeliveryReport>>,
    },

    Shutdown,
}
