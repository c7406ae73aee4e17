//! User repository trait

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::entity::{User, UserId};
use crate::domain::DomainError;

/// Table the repository reads and writes
pub const USER_TABLE: &str = "User";

/// Round trips against the `User` table.
///
/// Every call acquires its own store connection and releases it before
/// returning, whatever the outcome.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new record and return the id the store assigned
    async fn insert(&self, user: &User) -> Result<UserId, DomainError>;

    /// Persist all mutable fields of an existing record.
    ///
    /// A missing row is reported as a storage error.
    async fn update(&self, user: &User) -> Result<(), DomainError>;

    /// Remove a record by its id
    async fn delete(&self, user: &User) -> Result<(), DomainError>;

    /// Point lookup by primary key
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, DomainError>;

    /// Exact match on `UserName`; first match wins
    async fn get_by_user_name(&self, user_name: &str) -> Result<Option<User>, DomainError>;
}
