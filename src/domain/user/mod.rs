//! User domain
//!
//! This module provides the user record, the repository trait for the `User`
//! table and the identity-management contract a host authenticates through.

mod contract;
mod entity;
mod repository;

pub use contract::{
    IdentityError, IdentityErrorCode, IdentityResult, UserEmailStore, UserPasswordStore,
    UserStore,
};
pub use entity::{User, UserId};
pub use repository::{UserRepository, USER_TABLE};

#[cfg(test)]
pub use repository::MockUserRepository;
