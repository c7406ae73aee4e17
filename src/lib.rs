//! Credential Store
//!
//! Bridges an identity-management contract to a relational `User` table:
//! - Record repository with one connection per operation (PostgreSQL or in-memory)
//! - Credential adapter implementing the user, password and email capabilities
//! - Argon2 password hashing supplied as a pluggable capability

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::user::{
    IdentityError, IdentityErrorCode, IdentityResult, User, UserEmailStore, UserId,
    UserPasswordStore, UserRepository, UserStore,
};
pub use domain::DomainError;
pub use infrastructure::user::{
    Argon2Hasher, CredentialStore, InMemoryUserRepository, PasswordHasher, PasswordVerification,
    PostgresUserRepository,
};
