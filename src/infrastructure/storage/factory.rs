//! Repository factory for runtime storage selection

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{AppConfig, StorageType};
use crate::domain::user::UserRepository;
use crate::domain::DomainError;
use crate::infrastructure::user::{InMemoryUserRepository, PostgresUserRepository};

/// Factory for creating user repositories
#[derive(Debug)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Creates the repository selected by `storage.kind`
    pub fn create(config: &AppConfig) -> Result<Arc<dyn UserRepository>, DomainError> {
        match config.storage.kind {
            StorageType::InMemory => {
                info!("Using in-memory user repository");
                Ok(Arc::new(InMemoryUserRepository::new()))
            }
            StorageType::Postgres => Ok(Arc::new(Self::create_postgres(config)?)),
        }
    }

    /// Creates a PostgreSQL repository; no connection is opened here
    pub fn create_postgres(config: &AppConfig) -> Result<PostgresUserRepository, DomainError> {
        let repository = PostgresUserRepository::from_connection_string(config.connection_string()?)?
            .with_connect_timeout(Duration::from_secs(config.storage.connect_timeout_secs));

        info!(repository = ?repository, "Using PostgreSQL user repository");
        Ok(repository)
    }
}
