//! Domain layer - User record, repository and identity contract

pub mod error;
pub mod user;

pub use error::DomainError;
