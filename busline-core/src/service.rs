use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Bus, BusUpdate, BusView, NewBus};
use crate::employee::{Employee, NewEmployee};
use crate::repository::{BusRepository, EmployeeRepository};
use crate::search::{sort_by_departure, SearchQuery, TripSummary};
use crate::trip::{NewTripSchedule, Seat, SeatBooking, TripSchedule};
use crate::{required_text, CoreError, CoreResult};

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_max_seat_capacity")]
    pub max_seat_capacity: u32,
}

fn default_max_seat_capacity() -> u32 { 100 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_seat_capacity: default_max_seat_capacity(),
        }
    }
}

/// Entry point for every bus, trip, seat and employee operation.
pub struct BusService {
    buses: Arc<dyn BusRepository>,
    employees: Arc<dyn EmployeeRepository>,
    rules: BookingRules,
}

impl BusService {
    pub fn new(
        buses: Arc<dyn BusRepository>,
        employees: Arc<dyn EmployeeRepository>,
        rules: BookingRules,
    ) -> Self {
        Self { buses, employees, rules }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    // ==================================================================
    // Bus registry
    // ==================================================================

    pub async fn create_bus(&self, new_bus: NewBus) -> CoreResult<Bus> {
        let bus = Bus::new(new_bus, self.rules.max_seat_capacity)?;
        self.buses.insert_bus(&bus).await?;

        info!("Bus created: {} ({})", bus.bus_code, bus.id);
        Ok(bus)
    }

    pub async fn update_bus(&self, id: Uuid, update: BusUpdate) -> CoreResult<Bus> {
        let bus = self
            .buses
            .update_bus(id, &update, self.rules.max_seat_capacity)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("bus {}", id)))?;

        info!("Bus updated: {}", id);
        Ok(bus)
    }

    pub async fn delete_bus(&self, id: Uuid) -> CoreResult<()> {
        if !self.buses.delete_bus(id).await? {
            return Err(CoreError::NotFoundError(format!("bus {}", id)));
        }

        info!("Bus deleted with its trip schedules: {}", id);
        Ok(())
    }

    pub async fn get_bus(&self, id: Uuid) -> CoreResult<BusView> {
        let bus = self
            .buses
            .get_bus(id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("bus {}", id)))?;

        let crew = self.crew_directory().await?;
        Ok(resolve_crew(bus, &crew))
    }

    pub async fn list_buses(&self) -> CoreResult<Vec<BusView>> {
        let buses = self.buses.list_buses().await?;
        let crew = self.crew_directory().await?;

        Ok(buses.into_iter().map(|bus| resolve_crew(bus, &crew)).collect())
    }

    async fn crew_directory(&self) -> CoreResult<HashMap<Uuid, Employee>> {
        let employees = self.employees.list_employees().await?;
        Ok(employees.into_iter().map(|e| (e.id, e)).collect())
    }

    // ==================================================================
    // Trip schedules & seats
    // ==================================================================

    pub async fn create_trip_schedule(
        &self,
        bus_id: Uuid,
        new_trip: NewTripSchedule,
    ) -> CoreResult<TripSchedule> {
        let trip = self
            .buses
            .insert_trip_schedule(bus_id, &new_trip)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("bus {}", bus_id)))?;

        info!(
            "Trip schedule {} created for bus {} with {} seats",
            trip.id,
            bus_id,
            trip.seats.len()
        );
        Ok(trip)
    }

    pub async fn get_seats_for_trip(&self, trip_schedule_id: Uuid) -> CoreResult<Vec<Seat>> {
        let trip = self
            .buses
            .get_trip_schedule(trip_schedule_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("trip schedule {}", trip_schedule_id)))?;

        let mut seats = trip.seats;
        seats.sort_by_key(|s| s.seat_number);
        Ok(seats)
    }

    pub async fn search_available_buses(&self, query: &SearchQuery) -> CoreResult<Vec<TripSummary>> {
        let mut results = self.buses.search_trip_schedules(query).await?;
        sort_by_departure(&mut results);
        Ok(results)
    }

    // ==================================================================
    // Reservations
    // ==================================================================

    pub async fn reserve_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
    ) -> CoreResult<SeatBooking> {
        let user_id = required_text("user_id", Some(user_id))?;

        match self
            .buses
            .reserve_seat(trip_schedule_id, seat_number, &user_id, Utc::now())
            .await
        {
            Ok(booking) => {
                info!(
                    "Seat {} reserved on trip {} by {}",
                    seat_number, trip_schedule_id, user_id
                );
                Ok(booking)
            }
            Err(err @ CoreError::ConflictError(_)) => {
                warn!(
                    "Reservation rejected for seat {} on trip {}: {}",
                    seat_number, trip_schedule_id, err
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn release_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        is_admin: bool,
    ) -> CoreResult<SeatBooking> {
        let user_id = required_text("user_id", Some(user_id))?;

        match self
            .buses
            .release_seat(trip_schedule_id, seat_number, &user_id, is_admin)
            .await
        {
            Ok(booking) => {
                info!(
                    "Seat {} released on trip {} by {}",
                    seat_number, trip_schedule_id, user_id
                );
                Ok(booking)
            }
            Err(err @ CoreError::ConflictError(_)) => {
                warn!(
                    "Release rejected for seat {} on trip {}: {}",
                    seat_number, trip_schedule_id, err
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    // ==================================================================
    // Employees
    // ==================================================================

    pub async fn create_employee(&self, new_employee: NewEmployee) -> CoreResult<Employee> {
        let employee = Employee::new(new_employee)?;
        self.employees.insert_employee(&employee).await?;

        info!("Employee created: {} ({})", employee.id, employee.role.as_str());
        Ok(employee)
    }

    pub async fn get_employee(&self, id: Uuid) -> CoreResult<Employee> {
        self.employees
            .get_employee(id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("employee {}", id)))
    }

    pub async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        self.employees.list_employees().await
    }
}

fn resolve_crew(bus: Bus, crew: &HashMap<Uuid, Employee>) -> BusView {
    let driver = crew.get(&bus.driver_id).map(Employee::summary);
    let conductor = crew.get(&bus.conductor_id).map(Employee::summary);
    BusView { bus, driver, conductor }
}
