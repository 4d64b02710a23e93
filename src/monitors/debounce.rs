/// Outcome of comparing one observation against a dimension's debounce flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvaluation {
    /// Good observation, nothing outstanding
    Ok,
    /// Still bad, the alert for this failure is already out
    StillFailing,
    /// Bad observation with no outstanding alert: send one and set the flag
    StartsFailing,
    /// Good observation while the flag is set: clear it silently
    Recovered,
}

impl AlertEvaluation {
    pub fn evaluate(is_bad: bool, alert_sent: bool) -> AlertEvaluation {
        match (is_bad, alert_sent) {
            (false, false) => AlertEvaluation::Ok,
            (false, true) => AlertEvaluation::Recovered,
            (true, false) => AlertEvaluation::StartsFailing,
            (true, true) => AlertEvaluation::StillFailing,
        }
    }

    /// Whether an alert has to be queued
    pub fn should_alert(&self) -> bool {
        matches!(self, AlertEvaluation::StartsFailing)
    }

    /// Flag value to persist after this evaluation
    pub fn next_flag(&self) -> bool {
        matches!(
            self,
            AlertEvaluation::StartsFailing | AlertEvaluation::StillFailing
        )
    }

    /// Whether the stored flag has to be rewritten
    pub fn changes_flag(&self) -> bool {
        matches!(
            self,
            AlertEvaluation::StartsFailing | AlertEvaluation::Recovered
        )
    }
}
