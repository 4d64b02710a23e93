//! Reachability transition log and availability reconstruction
//!
//! The log only stores status *changes*: consecutive events of one device
//! never carry the same status. Availability slices are rebuilt on demand
//! by pairing every event with its successor.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::PingStatus;
use crate::storage::{PingHistoryEvent, StorageBackend, StorageResult};

/// Upper bound of events loaded for one reconstruction
pub const MAX_HISTORY_EVENTS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryPeriod {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "all")]
    All,
}

impl HistoryPeriod {
    /// Parse a period name, falling back to 24h for anything unknown
    pub fn parse(value: Option<&str>) -> HistoryPeriod {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("7d") => HistoryPeriod::Week,
            Some("30d") => HistoryPeriod::Month,
            Some("all") => HistoryPeriod::All,
            _ => HistoryPeriod::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryPeriod::Day => "24h",
            HistoryPeriod::Week => "7d",
            HistoryPeriod::Month => "30d",
            HistoryPeriod::All => "all",
        }
    }

    /// Start of the window, `None` when unbounded
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            HistoryPeriod::Day => Some(now - Duration::hours(24)),
            HistoryPeriod::Week => Some(now - Duration::days(7)),
            HistoryPeriod::Month => Some(now - Duration::days(30)),
            HistoryPeriod::All => None,
        }
    }
}

/// A contiguous interval during which a device held one status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySlice {
    pub status: PingStatus,
    pub started_at: DateTime<Utc>,
    /// Open-ended for the last slice of an unbounded window
    pub ended_at: Option<DateTime<Utc>>,
}

/// Turn oldest-first transition events into availability slices.
///
/// With a window start (`from`), slices are clamped to the window and the
/// last one ends at `now`. Without it, the last slice stays open.
pub fn build_availability_slices(
    events: &[PingHistoryEvent],
    from: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<AvailabilitySlice> {
    events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            let start = match from {
                Some(from) if event.checked_at < from => from,
                _ => event.checked_at,
            };

            let end = match events.get(index + 1) {
                Some(next) => Some(next.checked_at),
                None => from.map(|_| now),
            };

            if let (Some(from), Some(end)) = (from, end) {
                if end <= from {
                    return None;
                }
            }

            if end.is_some_and(|end| end <= start) {
                return None;
            }

            Some(AvailabilitySlice {
                status: event.status,
                started_at: start,
                ended_at: end,
            })
        })
        .collect()
}

/// Events and slices of one device over one period
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    pub period: HistoryPeriod,
    pub events: Vec<PingHistoryEvent>,
    pub slices: Vec<AvailabilitySlice>,
}

/// Load the transition log of a device and rebuild its availability.
///
/// For bounded periods the last event before the window is prepended so the
/// leading edge carries the right status.
#[instrument(skip(storage))]
pub async fn reconstruct(
    storage: &dyn StorageBackend,
    device_id: i64,
    period: HistoryPeriod,
    now: DateTime<Utc>,
) -> StorageResult<HistoryWindow> {
    let from = period.window_start(now);

    let mut events: Vec<PingHistoryEvent> = storage
        .list_history_events(device_id, from, MAX_HISTORY_EVENTS)
        .await?
        .into_iter()
        .filter(|event| event.checked_at <= now)
        .collect();

    if let Some(from) = from {
        if let Some(previous) = storage.last_history_event_before(device_id, from).await? {
            events.insert(0, previous);
        }
    }

    let slices = build_availability_slices(&events, from, now);
    debug!(
        "device {device_id}: {} events -> {} slices over {}",
        events.len(),
        slices.len(),
        period.as_str()
    );

    Ok(HistoryWindow {
        period,
        events,
        slices,
    })
}

/// Append `status` to the log unless it repeats the previous event.
///
/// Only real observations (online/offline) are recorded. Returns whether an
/// event was written.
pub async fn record_transition(
    storage: &dyn StorageBackend,
    device_id: i64,
    status: PingStatus,
    at: DateTime<Utc>,
) -> StorageResult<bool> {
    if !status.is_observation() {
        return Ok(false);
    }

    let last = storage.last_history_event(device_id).await?;
    if last.is_some_and(|last| last.status == status) {
        return Ok(false);
    }

    storage.append_history_event(device_id, status, at).await?;
    debug!("device {device_id}: reachability changed to {status}");
    Ok(true)
}
