//! User infrastructure module
//!
//! This module provides the credential store adapter, password hashing with
//! Argon2, and the in-memory and PostgreSQL user repositories.

mod password;
mod postgres_repository;
mod repository;
mod store;

pub use password::{Argon2Hasher, PasswordHasher, PasswordVerification};
pub use postgres_repository::PostgresUserRepository;
pub use repository::InMemoryUserRepository;
pub use store::CredentialStore;
