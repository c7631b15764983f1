use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatEventKind {
    Reserved,
    Released,
}

/// Emitted after a seat flips state on a trip schedule.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeatEvent {
    pub kind: SeatEventKind,
    pub trip_schedule_id: Uuid,
    pub bus_id: Uuid,
    pub seat_number: u32,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl SeatEvent {
    pub fn reserved(trip_schedule_id: Uuid, bus_id: Uuid, seat_number: u32, user_id: &str) -> Self {
        Self {
            kind: SeatEventKind::Reserved,
            trip_schedule_id,
            bus_id,
            seat_number,
            user_id: user_id.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn released(trip_schedule_id: Uuid, bus_id: Uuid, seat_number: u32, user_id: &str) -> Self {
        Self {
            kind: SeatEventKind::Released,
            ..Self::reserved(trip_schedule_id, bus_id, seat_number, user_id)
        }
    }

    /// SSE event name for this payload.
    pub fn event_name(&self) -> &'static str {
        match self.kind {
            SeatEventKind::Reserved => "seat_reserved",
            SeatEventKind::Released => "seat_released",
        }
    }
}
