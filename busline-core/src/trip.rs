use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// A single seat slot on one trip occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub seat_number: u32,
    pub is_reserved: bool,
    pub reserved_by: Option<String>,
    pub booking_date: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn vacant(seat_number: u32) -> Self {
        Self {
            seat_number,
            is_reserved: false,
            reserved_by: None,
            booking_date: None,
        }
    }

    /// Flip an unreserved seat to reserved. The three reservation fields are
    /// written together so `reserved_by`/`booking_date` are set iff reserved.
    pub fn reserve(&mut self, user_id: &str, booked_at: DateTime<Utc>) -> CoreResult<()> {
        if self.is_reserved {
            return Err(CoreError::ConflictError(format!(
                "seat {} is already reserved",
                self.seat_number
            )));
        }

        self.is_reserved = true;
        self.reserved_by = Some(user_id.to_string());
        self.booking_date = Some(booked_at);
        Ok(())
    }

    /// Flip a reserved seat back. Non-admins may only release their own booking.
    pub fn release(&mut self, user_id: &str, is_admin: bool) -> CoreResult<()> {
        let owned = self.reserved_by.as_deref() == Some(user_id);
        if !self.is_reserved || (!is_admin && !owned) {
            return Err(CoreError::ConflictError(format!(
                "seat {} is not reserved by {}",
                self.seat_number, user_id
            )));
        }

        *self = Seat::vacant(self.seat_number);
        Ok(())
    }
}

/// Materialize the seat map for a new trip: seats `1..=seat_capacity`, all vacant.
pub fn generate_seats(seat_capacity: u32) -> Vec<Seat> {
    (1..=seat_capacity).map(Seat::vacant).collect()
}

/// Admin input for scheduling a trip. Everything is optional at the wire level
/// so missing fields surface as validation errors rather than parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTripSchedule {
    pub route_id: Option<Uuid>,
    pub trip_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_return_trip: bool,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub price: Option<i64>,
}

/// One scheduled run of a bus. Owned by exactly one bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripSchedule {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub trip_date: NaiveDate,
    pub is_return_trip: bool,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Minor currency units.
    pub price: i64,
    pub seats: Vec<Seat>,
    pub created_at: DateTime<Utc>,
}

impl TripSchedule {
    /// Validate `new_trip` and build the trip with a seat map sized to
    /// `seat_capacity`. Callers pass the owning bus's capacity as read under
    /// the same lock/transaction that persists the trip.
    pub fn create(bus_id: Uuid, new_trip: &NewTripSchedule, seat_capacity: u32) -> CoreResult<Self> {
        let route_id = new_trip
            .route_id
            .ok_or_else(|| CoreError::ValidationError("route_id is required".to_string()))?;
        let trip_date = new_trip
            .trip_date
            .ok_or_else(|| CoreError::ValidationError("trip_date is required".to_string()))?;
        let departure_time = new_trip
            .departure_time
            .ok_or_else(|| CoreError::ValidationError("departure_time is required".to_string()))?;
        let arrival_time = new_trip
            .arrival_time
            .ok_or_else(|| CoreError::ValidationError("arrival_time is required".to_string()))?;
        let price = new_trip
            .price
            .ok_or_else(|| CoreError::ValidationError("price is required".to_string()))?;

        if price < 0 {
            return Err(CoreError::ValidationError("price must not be negative".to_string()));
        }
        if arrival_time <= departure_time {
            return Err(CoreError::ValidationError(
                "arrival_time must be after departure_time".to_string(),
            ));
        }
        if seat_capacity == 0 {
            return Err(CoreError::ValidationError(
                "bus has no seats to schedule".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            route_id,
            bus_id,
            trip_date,
            is_return_trip: new_trip.is_return_trip,
            departure_time,
            arrival_time,
            price,
            seats: generate_seats(seat_capacity),
            created_at: Utc::now(),
        })
    }

    pub fn total_seats(&self) -> u32 {
        self.seats.len() as u32
    }

    pub fn available_seats(&self) -> u32 {
        self.seats.iter().filter(|s| !s.is_reserved).count() as u32
    }

    pub fn seat(&self, seat_number: u32) -> Option<&Seat> {
        self.seats.iter().find(|s| s.seat_number == seat_number)
    }

    fn seat_mut(&mut self, seat_number: u32) -> CoreResult<&mut Seat> {
        let trip_id = self.id;
        self.seats
            .iter_mut()
            .find(|s| s.seat_number == seat_number)
            .ok_or_else(|| {
                CoreError::NotFoundError(format!("seat {} on trip schedule {}", seat_number, trip_id))
            })
    }

    /// Compare-and-set on one seat. Must run under exclusive access to the trip.
    pub fn reserve_seat(
        &mut self,
        seat_number: u32,
        user_id: &str,
        booked_at: DateTime<Utc>,
    ) -> CoreResult<SeatBooking> {
        let (trip_schedule_id, bus_id) = (self.id, self.bus_id);
        let seat = self.seat_mut(seat_number)?;
        seat.reserve(user_id, booked_at)?;

        Ok(SeatBooking {
            trip_schedule_id,
            bus_id,
            seat: seat.clone(),
        })
    }

    pub fn release_seat(
        &mut self,
        seat_number: u32,
        user_id: &str,
        is_admin: bool,
    ) -> CoreResult<SeatBooking> {
        let (trip_schedule_id, bus_id) = (self.id, self.bus_id);
        let seat = self.seat_mut(seat_number)?;
        seat.release(user_id, is_admin)?;

        Ok(SeatBooking {
            trip_schedule_id,
            bus_id,
            seat: seat.clone(),
        })
    }
}

/// Result of a seat state change, with enough context to publish an event.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SeatBooking {
    pub trip_schedule_id: Uuid,
    pub bus_id: Uuid,
    pub seat: Seat,
}
