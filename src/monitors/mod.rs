pub mod debounce;
pub mod probe;
pub mod scheduler;

pub use debounce::AlertEvaluation;
pub use probe::{NetworkProber, ProbeOutcome, Prober, probe_with_retry};
pub use scheduler::{CycleOutcome, CycleReport, MonitorScheduler};
