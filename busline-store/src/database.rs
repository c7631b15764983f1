use busline_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Constraint names from the migrations, mapped to the field they guard.
fn unique_field(constraint: &str) -> &str {
    match constraint {
        "buses_bus_code_key" => "bus_code",
        "buses_registration_number_key" => "registration_number",
        "buses_chassis_number_key" => "chassis_number",
        other => other,
    }
}

/// Translate a driver error into the core taxonomy.
pub(crate) fn storage_error(err: sqlx::Error) -> CoreError {
    if let Some(db_err) = err.as_database_error() {
        let constraint = db_err.constraint().unwrap_or("unknown");
        if db_err.is_unique_violation() {
            return CoreError::UniquenessError(format!(
                "{} is already in use",
                unique_field(constraint)
            ));
        }
        if db_err.is_foreign_key_violation() {
            return CoreError::ValidationError(format!(
                "reference does not exist ({})",
                constraint
            ));
        }
        if db_err.is_check_violation() {
            return CoreError::ValidationError(format!("constraint violated ({})", constraint));
        }
    }

    error!("Database error: {}", err);
    CoreError::StorageError(err.to_string())
}
