pub mod app_config;
pub mod bus_repo;
pub mod database;
pub mod employee_repo;
pub mod memory_repo;
pub mod redis_repo;

pub use bus_repo::PostgresBusRepository;
pub use database::DbClient;
pub use employee_repo::PostgresEmployeeRepository;
pub use memory_repo::MemoryStore;
pub use redis_repo::RedisClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("database.url is required for the postgres backend")]
    MissingDatabaseUrl,
}

use app_config::{DatabaseConfig, StorageBackend};
use busline_core::repository::{BusRepository, EmployeeRepository};
use std::sync::Arc;
use tracing::info;

/// Repository handles for the configured backend.
#[derive(Clone)]
pub struct Repositories {
    pub buses: Arc<dyn BusRepository>,
    pub employees: Arc<dyn EmployeeRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            buses: store.clone(),
            employees: store,
        }
    }
}

/// Connect to the configured backend; Postgres is migrated before use.
pub async fn open_repositories(config: &DatabaseConfig) -> Result<Repositories, StoreError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Repositories::in_memory())
        }
        StorageBackend::Postgres => {
            let url = config.url.as_deref().ok_or(StoreError::MissingDatabaseUrl)?;
            let db = DbClient::new(url, config.max_connections).await?;
            db.migrate().await?;
            info!("Connected to Postgres");

            Ok(Repositories {
                buses: Arc::new(PostgresBusRepository::new(db.pool.clone())),
                employees: Arc::new(PostgresEmployeeRepository::new(db.pool)),
            })
        }
    }
}
