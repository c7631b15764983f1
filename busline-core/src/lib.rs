pub mod bus;
pub mod employee;
pub mod repository;
pub mod search;
pub mod service;
pub mod trip;

pub use bus::{Bus, BusUpdate, BusView, NewBus};
pub use employee::{Employee, EmployeeRole, EmployeeSummary, NewEmployee};
pub use repository::{BusRepository, EmployeeRepository};
pub use search::{BusInfo, SearchQuery, TripSummary};
pub use service::{BookingRules, BusService};
pub use trip::{NewTripSchedule, Seat, SeatBooking, TripSchedule};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Duplicate value: {0}")]
    UniquenessError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl CoreError {
    /// Stable machine-readable name, used as the `kind` of API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "VALIDATION",
            CoreError::UniquenessError(_) => "UNIQUENESS",
            CoreError::NotFoundError(_) => "NOT_FOUND",
            CoreError::ConflictError(_) => "CONFLICT",
            CoreError::StorageError(_) => "STORAGE",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Trims a required text field, rejecting absent or blank values.
pub(crate) fn required_text(field: &str, value: Option<&str>) -> CoreResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CoreError::ValidationError(format!("{} is required", field))),
    }
}

/// Trims an optional text field; blank collapses to `None`.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
