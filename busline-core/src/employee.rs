use busline_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{optional_text, required_text, CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmployeeRole {
    Driver,
    Conductor,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Driver => "DRIVER",
            EmployeeRole::Conductor => "CONDUCTOR",
        }
    }
}

impl FromStr for EmployeeRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRIVER" => Ok(EmployeeRole::Driver),
            "CONDUCTOR" => Ok(EmployeeRole::Conductor),
            other => Err(CoreError::ValidationError(format!("unknown employee role: {}", other))),
        }
    }
}

/// Crew member referenced by buses as driver or conductor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub role: EmployeeRole,
    pub contact_number: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEmployee {
    pub name: Option<String>,
    pub role: Option<EmployeeRole>,
    pub contact_number: Option<String>,
}

/// What a bus listing shows for its driver/conductor.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub name: String,
    pub role: EmployeeRole,
}

impl Employee {
    pub fn new(new_employee: NewEmployee) -> CoreResult<Self> {
        let name = required_text("name", new_employee.name.as_deref())?;
        let role = new_employee
            .role
            .ok_or_else(|| CoreError::ValidationError("role is required".to_string()))?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            role,
            contact_number: optional_text(new_employee.contact_number.as_deref()).map(Masked::from),
            created_at: Utc::now(),
        })
    }

    pub fn summary(&self) -> EmployeeSummary {
        EmployeeSummary {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
        }
    }
}
