use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bus::{Bus, BusUpdate};
use crate::employee::Employee;
use crate::search::{SearchQuery, TripSummary};
use crate::trip::{NewTripSchedule, SeatBooking, TripSchedule};
use crate::CoreResult;

/// Persistence for buses and everything they own.
///
/// Implementations must make `reserve_seat`/`release_seat` a single atomic
/// conditional update on the seat, and must enforce uniqueness of
/// `bus_code`, `registration_number` and `chassis_number` as
/// `CoreError::UniquenessError`.
#[async_trait]
pub trait BusRepository: Send + Sync {
    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()>;

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>>;

    /// All buses in creation order, trip schedules included.
    async fn list_buses(&self) -> CoreResult<Vec<Bus>>;

    /// Applies `update` via [`Bus::apply_update`] under exclusive access to the
    /// bus. `Ok(None)` when the bus does not exist.
    async fn update_bus(
        &self,
        id: Uuid,
        update: &BusUpdate,
        max_seat_capacity: u32,
    ) -> CoreResult<Option<Bus>>;

    /// Removes the bus with its trip schedules and seats. `false` if absent.
    async fn delete_bus(&self, id: Uuid) -> CoreResult<bool>;

    /// Builds the trip with [`TripSchedule::create`] using the bus capacity read
    /// in the same critical section. `Ok(None)` when the bus does not exist.
    async fn insert_trip_schedule(
        &self,
        bus_id: Uuid,
        new_trip: &NewTripSchedule,
    ) -> CoreResult<Option<TripSchedule>>;

    async fn get_trip_schedule(&self, id: Uuid) -> CoreResult<Option<TripSchedule>>;

    /// Matching trips with availability; ordering is left to the caller.
    async fn search_trip_schedules(&self, query: &SearchQuery) -> CoreResult<Vec<TripSummary>>;

    async fn reserve_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        booked_at: DateTime<Utc>,
    ) -> CoreResult<SeatBooking>;

    async fn release_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        is_admin: bool,
    ) -> CoreResult<SeatBooking>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn insert_employee(&self, employee: &Employee) -> CoreResult<()>;

    async fn get_employee(&self, id: Uuid) -> CoreResult<Option<Employee>>;

    async fn list_employees(&self) -> CoreResult<Vec<Employee>>;
}
