use async_trait::async_trait;
use busline_core::repository::EmployeeRepository;
use busline_core::{CoreResult, Employee, EmployeeRole};
use busline_shared::Masked;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::storage_error;

pub struct PostgresEmployeeRepository {
    pool: PgPool,
}

impl PostgresEmployeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EmployeeRow {
    id: Uuid,
    name: String,
    role: String,
    contact_number: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = busline_core::CoreError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        Ok(Employee {
            id: row.id,
            name: row.name,
            role: row.role.parse::<EmployeeRole>()?,
            contact_number: row.contact_number.map(Masked::from),
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EmployeeRepository for PostgresEmployeeRepository {
    async fn insert_employee(&self, employee: &Employee) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, name, role, contact_number, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(employee.id)
        .bind(&employee.name)
        .bind(employee.role.as_str())
        .bind(employee.contact_number.as_ref().map(|c| c.inner().as_str()))
        .bind(employee.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_employee(&self, id: Uuid) -> CoreResult<Option<Employee>> {
        let row: Option<EmployeeRow> = sqlx::query_as(
            "SELECT id, name, role, contact_number, created_at FROM employees WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Employee::try_from).transpose()
    }

    async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        let rows: Vec<EmployeeRow> = sqlx::query_as(
            "SELECT id, name, role, contact_number, created_at FROM employees ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Employee::try_from).collect()
    }
}
