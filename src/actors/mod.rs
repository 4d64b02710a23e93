//! Background actors of the hub
//!
//! Each actor runs as an independent tokio task that owns its interval timer
//! and listens on an mpsc command channel. Monitoring and delivery run in
//! separate tasks so a slow probe cycle never delays outgoing messages.
//!
//! ```text
//!            ┌─────────────────┐
//!            │   Hub (main)    │
//!            └────────┬────────┘
//!                     │ spawns
//!          ┌──────────┴──────────┐
//!          │                     │
//!  ┌───────▼───────┐     ┌───────▼───────┐
//!  │ MonitorActor  │     │ DeliveryActor │
//!  │ (30s ticks)   │     │ (5s ticks)    │
//!  └───────┬───────┘     └───────▲───────┘
//!          │ jobs                │ due jobs
//!          └──────► storage ─────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel (`RunNow`,
//!    `DrainNow`, `Shutdown`)
//! 2. **Request/Response**: oneshot channels carry the outcome of a forced run
//! 3. **Hand-off**: the monitor only writes delivery jobs, the delivery actor
//!    picks them up from storage on its next tick

pub mod delivery;
pub mod messages;
pub mod monitor;

pub use delivery::{DeliveryActor, DeliveryHandle};
pub use monitor::{MonitorActor, MonitorHandle};
