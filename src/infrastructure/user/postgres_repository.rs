//! PostgreSQL user repository implementation
//!
//! Connections are opened per call and closed before the call returns. No
//! pool sits underneath: a failing operation can never leave a shared
//! connection in a bad state, at the cost of a connect for every round trip.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::user::{User, UserId, UserRepository};
use crate::domain::DomainError;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS "User" (
        "Id" SERIAL PRIMARY KEY,
        "UserName" TEXT NOT NULL,
        "PasswordHash" TEXT NOT NULL DEFAULT '',
        "RoleId" INTEGER NOT NULL,
        "IsActive" BOOLEAN NOT NULL DEFAULT TRUE
    )
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO "User" ("UserName", "PasswordHash", "RoleId", "IsActive")
    VALUES ($1, $2, $3, $4)
    RETURNING "Id"
"#;

const UPDATE_SQL: &str = r#"
    UPDATE "User"
    SET "UserName" = $2, "PasswordHash" = $3, "RoleId" = $4, "IsActive" = $5
    WHERE "Id" = $1
"#;

const DELETE_SQL: &str = r#"DELETE FROM "User" WHERE "Id" = $1"#;

const SELECT_BY_ID_SQL: &str = r#"
    SELECT "Id", "UserName", "PasswordHash", "RoleId", "IsActive"
    FROM "User"
    WHERE "Id" = $1
"#;

const SELECT_BY_USER_NAME_SQL: &str = r#"
    SELECT "Id", "UserName", "PasswordHash", "RoleId", "IsActive"
    FROM "User"
    WHERE "UserName" = $1
    ORDER BY "Id"
    LIMIT 1
"#;

/// PostgreSQL implementation of UserRepository
#[derive(Clone)]
pub struct PostgresUserRepository {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl Debug for PostgresUserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUserRepository")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("database", &self.options.get_database())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl PostgresUserRepository {
    /// Create a repository connecting with the given options
    pub fn new(options: PgConnectOptions) -> Self {
        Self {
            options,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Create a repository from a `postgres://` connection string
    pub fn from_connection_string(connection_string: &str) -> Result<Self, DomainError> {
        let options = PgConnectOptions::from_str(connection_string).map_err(|e| {
            DomainError::configuration(format!("Invalid connection string: {}", e))
        })?;

        Ok(Self::new(options))
    }

    /// Bound the time spent opening each per-call connection
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create the `User` table if it does not exist yet.
    ///
    /// Cancelling abandons the connect or the statement in flight.
    pub async fn ensure_schema(&self, cancel: &CancellationToken) -> Result<(), DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::cancelled("ensure_schema"));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Schema bootstrap cancelled");
                Err(DomainError::cancelled("ensure_schema"))
            }
            result = self.create_table() => result,
        }
    }

    async fn create_table(&self) -> Result<(), DomainError> {
        let mut conn = self.open().await?;
        let result = sqlx::query(CREATE_TABLE_SQL).execute(&mut conn).await;
        release(conn).await;

        result.map_err(|e| DomainError::storage(format!("Failed to create User table: {}", e)))?;
        debug!("User table ensured");

        Ok(())
    }

    async fn open(&self) -> Result<PgConnection, DomainError> {
        tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                DomainError::storage(format!(
                    "Timed out connecting to PostgreSQL after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
    }
}

/// Close a per-call connection; a failed close only loses the socket
async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close PostgreSQL connection cleanly");
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn insert(&self, user: &User) -> Result<UserId, DomainError> {
        let mut conn = self.open().await?;
        let result: Result<i32, sqlx::Error> = sqlx::query_scalar(INSERT_SQL)
            .bind(user.user_name())
            .bind(user.password_hash())
            .bind(user.role_id())
            .bind(user.is_active())
            .fetch_one(&mut conn)
            .await;
        release(conn).await;

        let id = result.map_err(|e| DomainError::storage(format!("Failed to insert user: {}", e)))?;

        Ok(UserId::new(id))
    }

    async fn update(&self, user: &User) -> Result<(), DomainError> {
        let id = user.persisted_id()?;

        let mut conn = self.open().await?;
        let result = sqlx::query(UPDATE_SQL)
            .bind(id.value())
            .bind(user.user_name())
            .bind(user.password_hash())
            .bind(user.role_id())
            .bind(user.is_active())
            .execute(&mut conn)
            .await;
        release(conn).await;

        let result =
            result.map_err(|e| DomainError::storage(format!("Failed to update user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::storage(format!(
                "Update affected no rows for user {}",
                id
            )));
        }

        Ok(())
    }

    async fn delete(&self, user: &User) -> Result<(), DomainError> {
        let id = user.persisted_id()?;

        let mut conn = self.open().await?;
        let result = sqlx::query(DELETE_SQL)
            .bind(id.value())
            .execute(&mut conn)
            .await;
        release(conn).await;

        let result =
            result.map_err(|e| DomainError::storage(format!("Failed to delete user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::storage(format!(
                "Delete affected no rows for user {}",
                id
            )));
        }

        Ok(())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, DomainError> {
        let mut conn = self.open().await?;
        let result = sqlx::query(SELECT_BY_ID_SQL)
            .bind(id.value())
            .fetch_optional(&mut conn)
            .await;
        release(conn).await;

        let row = result.map_err(|e| DomainError::storage(format!("Failed to get user: {}", e)))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_user_name(&self, user_name: &str) -> Result<Option<User>, DomainError> {
        let mut conn = self.open().await?;
        let result = sqlx::query(SELECT_BY_USER_NAME_SQL)
            .bind(user_name)
            .fetch_optional(&mut conn)
            .await;
        release(conn).await;

        let row = result.map_err(|e| {
            DomainError::storage(format!("Failed to get user by user name: {}", e))
        })?;

        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &PgRow) -> Result<User, DomainError> {
    let column = |e: sqlx::Error| DomainError::storage(format!("Malformed User row: {}", e));

    let id: i32 = row.try_get("Id").map_err(column)?;
    let user_name: String = row.try_get("UserName").map_err(column)?;
    let password_hash: Option<String> = row.try_get("PasswordHash").map_err(column)?;
    let role_id: i32 = row.try_get("RoleId").map_err(column)?;
    let is_active: bool = row.try_get("IsActive").map_err(column)?;

    Ok(User::restore(
        UserId::new(id),
        user_name,
        password_hash.unwrap_or_default(),
        role_id,
        is_active,
    ))
}
