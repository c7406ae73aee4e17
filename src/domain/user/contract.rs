//! Identity-management contract
//!
//! A host authentication framework talks to a credential store through three
//! independent capability sets. One adapter type may implement all of them,
//! and a host wires in only the subset it needs.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::entity::User;
use crate::domain::DomainError;

/// Reason attached to a failed identity operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorCode {
    UserNotFound,
    PasswordAlreadyHashed,
    PasswordMissing,
}

impl std::fmt::Display for IdentityErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::UserNotFound => "UserNotFound",
            Self::PasswordAlreadyHashed => "PasswordAlreadyHashed",
            Self::PasswordMissing => "PasswordMissing",
        };
        f.write_str(code)
    }
}

/// A single failure reason with a human-readable description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    pub code: IdentityErrorCode,
    pub description: String,
}

impl IdentityError {
    /// Create an error with a code and a human readable description
    pub fn new(code: IdentityErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn user_not_found(user_id: impl std::fmt::Display) -> Self {
        Self::new(
            IdentityErrorCode::UserNotFound,
            format!("User with ID {} not found.", user_id),
        )
    }
}

/// Structured outcome of an identity mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResult {
    Success,
    Failed(Vec<IdentityError>),
}

impl IdentityResult {
    pub fn failed(error: IdentityError) -> Self {
        Self::Failed(vec![error])
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn errors(&self) -> &[IdentityError] {
        match self {
            Self::Success => &[],
            Self::Failed(errors) => errors,
        }
    }
}

impl std::fmt::Display for IdentityResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("Succeeded"),
            Self::Failed(errors) => {
                let codes: Vec<String> = errors.iter().map(|e| e.code.to_string()).collect();
                write!(f, "Failed : {}", codes.join(","))
            }
        }
    }
}

/// Primary store capability
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user; the store assigns its id onto `user`
    async fn create(
        &self,
        user: &mut User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError>;

    async fn update(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError>;

    async fn delete(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError>;

    /// Look up by the contract's opaque string id.
    ///
    /// A non-integer id is an `InvalidId` error; an unknown id is `Ok(None)`.
    async fn find_by_id(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError>;

    async fn find_by_name(
        &self,
        normalized_user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError>;

    async fn get_user_id(&self, user: &User, cancel: &CancellationToken)
        -> Result<String, DomainError>;

    async fn get_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError>;

    async fn set_user_name(
        &self,
        user: &mut User,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    async fn get_normalized_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError>;

    async fn set_normalized_user_name(
        &self,
        user: &mut User,
        normalized_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;
}

/// Password capability
#[async_trait]
pub trait UserPasswordStore: UserStore {
    /// Stage a password on `user`; the value always goes through the hasher
    async fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    async fn get_password_hash(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError>;

    async fn has_password(&self, user: &User, cancel: &CancellationToken)
        -> Result<bool, DomainError>;
}

/// Email capability
///
/// The user table has no email column, so implementations may satisfy this
/// with fixed values.
#[async_trait]
pub trait UserEmailStore: UserStore {
    async fn set_email(
        &self,
        user: &mut User,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    async fn get_email(&self, user: &User, cancel: &CancellationToken)
        -> Result<String, DomainError>;

    async fn get_email_confirmed(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<bool, DomainError>;

    async fn set_email_confirmed(
        &self,
        user: &mut User,
        confirmed: bool,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    async fn find_by_email(
        &self,
        normalized_email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError>;

    async fn get_normalized_email(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError>;

    async fn set_normalized_email(
        &self,
        user: &mut User,
        normalized_email: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;
}
