use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::Bus;
use crate::trip::TripSchedule;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub route_id: Uuid,
    pub date: NaiveDate, // calendar date of the trip, no time component
    #[serde(default)]
    pub is_return_trip: Option<bool>,
}

impl SearchQuery {
    pub fn matches(&self, trip: &TripSchedule) -> bool {
        trip.route_id == self.route_id
            && trip.trip_date == self.date
            && self.is_return_trip.map_or(true, |r| trip.is_return_trip == r)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BusInfo {
    pub id: Uuid,
    pub bus_code: String,
    pub registration_number: String,
    pub model: String,
    pub owner: String,
    pub seat_capacity: u32,
}

impl From<&Bus> for BusInfo {
    fn from(bus: &Bus) -> Self {
        Self {
            id: bus.id,
            bus_code: bus.bus_code.clone(),
            registration_number: bus.registration_number.clone(),
            model: bus.model.clone(),
            owner: bus.owner.clone(),
            seat_capacity: bus.seat_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripSummary {
    pub trip_schedule_id: Uuid,
    pub route_id: Uuid,
    pub trip_date: NaiveDate,
    pub is_return_trip: bool,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: i64,
    pub total_seats: u32,
    pub available_seats: u32,
    pub bus: BusInfo,
}

impl TripSummary {
    pub fn from_trip(bus: &Bus, trip: &TripSchedule) -> Self {
        Self {
            trip_schedule_id: trip.id,
            route_id: trip.route_id,
            trip_date: trip.trip_date,
            is_return_trip: trip.is_return_trip,
            departure_time: trip.departure_time,
            arrival_time: trip.arrival_time,
            price: trip.price,
            total_seats: trip.total_seats(),
            available_seats: trip.available_seats(),
            bus: BusInfo::from(bus),
        }
    }
}

/// Departure time ascending; ties broken by bus id, then trip id, so results
/// are stable regardless of storage order.
pub fn sort_by_departure(results: &mut [TripSummary]) {
    results.sort_by(|a, b| {
        a.departure_time
            .cmp(&b.departure_time)
            .then_with(|| a.bus.id.cmp(&b.bus.id))
            .then_with(|| a.trip_schedule_id.cmp(&b.trip_schedule_id))
    });
}
