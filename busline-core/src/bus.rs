use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::employee::EmployeeSummary;
use crate::trip::TripSchedule;
use crate::{optional_text, required_text, CoreError, CoreResult};

/// A physical vehicle. Trip schedules (and their seats) are owned by the bus
/// and go away with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bus {
    pub id: Uuid,
    /// Operator-facing bus identifier.
    pub bus_code: String,
    pub registration_number: String,
    pub chassis_number: Option<String>,
    pub model: String,
    pub seat_capacity: u32,
    pub driver_id: Uuid,
    pub conductor_id: Uuid,
    pub owner: String,
    pub trip_schedules: Vec<TripSchedule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload. Fields are optional so absent values are reported as
/// validation errors with the field name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBus {
    pub bus_code: Option<String>,
    pub registration_number: Option<String>,
    pub chassis_number: Option<String>,
    pub model: Option<String>,
    pub seat_capacity: Option<i64>,
    pub driver_id: Option<Uuid>,
    pub conductor_id: Option<Uuid>,
    pub owner: Option<String>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusUpdate {
    pub bus_code: Option<String>,
    pub registration_number: Option<String>,
    /// An empty string clears the chassis number.
    pub chassis_number: Option<String>,
    pub model: Option<String>,
    pub seat_capacity: Option<i64>,
    pub driver_id: Option<Uuid>,
    pub conductor_id: Option<Uuid>,
    pub owner: Option<String>,
}

impl BusUpdate {
    /// Employee references this update would introduce.
    pub fn employee_refs(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.driver_id.into_iter().chain(self.conductor_id)
    }
}

/// A bus as listed to clients, with crew references resolved.
#[derive(Debug, Clone, Serialize)]
pub struct BusView {
    #[serde(flatten)]
    pub bus: Bus,
    pub driver: Option<EmployeeSummary>,
    pub conductor: Option<EmployeeSummary>,
}

fn seat_capacity(value: Option<i64>, max_seat_capacity: u32) -> CoreResult<u32> {
    let value = value
        .ok_or_else(|| CoreError::ValidationError("seat_capacity is required".to_string()))?;

    if value < 1 {
        return Err(CoreError::ValidationError(
            "seat_capacity must be at least 1".to_string(),
        ));
    }
    if value > i64::from(max_seat_capacity) {
        return Err(CoreError::ValidationError(format!(
            "seat_capacity must not exceed {}",
            max_seat_capacity
        )));
    }

    Ok(value as u32)
}

impl Bus {
    pub fn new(new_bus: NewBus, max_seat_capacity: u32) -> CoreResult<Self> {
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            bus_code: required_text("bus_code", new_bus.bus_code.as_deref())?,
            registration_number: required_text(
                "registration_number",
                new_bus.registration_number.as_deref(),
            )?,
            chassis_number: optional_text(new_bus.chassis_number.as_deref()),
            model: required_text("model", new_bus.model.as_deref())?,
            seat_capacity: seat_capacity(new_bus.seat_capacity, max_seat_capacity)?,
            driver_id: new_bus
                .driver_id
                .ok_or_else(|| CoreError::ValidationError("driver_id is required".to_string()))?,
            conductor_id: new_bus.conductor_id.ok_or_else(|| {
                CoreError::ValidationError("conductor_id is required".to_string())
            })?,
            owner: required_text("owner", new_bus.owner.as_deref())?,
            trip_schedules: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update. Either every field is applied or none is.
    ///
    /// Seat maps are generated once per trip, so capacity is frozen as soon as
    /// the bus owns a trip schedule.
    pub fn apply_update(&mut self, update: &BusUpdate, max_seat_capacity: u32) -> CoreResult<()> {
        let mut next = self.clone();

        if let Some(code) = update.bus_code.as_deref() {
            next.bus_code = required_text("bus_code", Some(code))?;
        }
        if let Some(reg) = update.registration_number.as_deref() {
            next.registration_number = required_text("registration_number", Some(reg))?;
        }
        if let Some(chassis) = update.chassis_number.as_deref() {
            next.chassis_number = optional_text(Some(chassis));
        }
        if let Some(model) = update.model.as_deref() {
            next.model = required_text("model", Some(model))?;
        }
        if update.seat_capacity.is_some() {
            let capacity = seat_capacity(update.seat_capacity, max_seat_capacity)?;
            if capacity != self.seat_capacity && !self.trip_schedules.is_empty() {
                return Err(CoreError::ValidationError(
                    "seat_capacity cannot change once trip schedules exist".to_string(),
                ));
            }
            next.seat_capacity = capacity;
        }
        if let Some(driver_id) = update.driver_id {
            next.driver_id = driver_id;
        }
        if let Some(conductor_id) = update.conductor_id {
            next.conductor_id = conductor_id;
        }
        if let Some(owner) = update.owner.as_deref() {
            next.owner = required_text("owner", Some(owner))?;
        }

        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    /// Name of the first unique field `self` shares with `other`, if any.
    pub fn unique_conflict(&self, other: &Bus) -> Option<&'static str> {
        if self.id == other.id {
            return None;
        }
        if self.bus_code == other.bus_code {
            return Some("bus_code");
        }
        if self.registration_number == other.registration_number {
            return Some("registration_number");
        }
        match (&self.chassis_number, &other.chassis_number) {
            (Some(a), Some(b)) if a == b => Some("chassis_number"),
            _ => None,
        }
    }

    pub fn trip_schedule(&self, trip_schedule_id: Uuid) -> Option<&TripSchedule> {
        self.trip_schedules.iter().find(|t| t.id == trip_schedule_id)
    }

    pub fn trip_schedule_mut(&mut self, trip_schedule_id: Uuid) -> Option<&mut TripSchedule> {
        self.trip_schedules.iter_mut().find(|t| t.id == trip_schedule_id)
    }
}
