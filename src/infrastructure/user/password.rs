//! Password hashing capability and its Argon2 implementation

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as Argon2PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params,
};

#[cfg(test)]
use mockall::automock;

use crate::domain::user::User;
use crate::domain::DomainError;

/// Outcome of checking a provided password against a stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerification {
    Failed,
    Success,
    /// Matches, but was produced with outdated parameters
    SuccessRehashNeeded,
}

/// Hashing capability supplied by the host.
///
/// The credential store only ever calls `hash` and `is_hashed`; `verify`
/// is for the host's sign-in path.
#[cfg_attr(test, automock)]
pub trait PasswordHasher: Send + Sync {
    /// Hash a password for the given user
    fn hash(&self, user: &User, password: &str) -> Result<String, DomainError>;

    /// Verify a provided password against a stored hash
    fn verify(&self, user: &User, hash: &str, provided: &str) -> PasswordVerification;

    /// Whether a stored value already is output of this hasher
    fn is_hashed(&self, value: &str) -> bool;
}

/// Argon2id hasher emitting PHC strings
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    /// Create a hasher with the default Argon2id parameters
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, _user: &User, password: &str) -> Result<String, DomainError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DomainError::hashing(format!("Failed to hash password: {}", e)))
    }

    fn verify(&self, _user: &User, hash: &str, provided: &str) -> PasswordVerification {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return PasswordVerification::Failed,
        };

        if Argon2::default()
            .verify_password(provided.as_bytes(), &parsed_hash)
            .is_err()
        {
            return PasswordVerification::Failed;
        }

        let current = Params::default();
        let outdated = parsed_hash.algorithm != Algorithm::default().ident()
            || Params::try_from(&parsed_hash)
                .map(|params| {
                    params.m_cost() != current.m_cost()
                        || params.t_cost() != current.t_cost()
                        || params.p_cost() != current.p_cost()
                })
                .unwrap_or(true);

        if outdated {
            PasswordVerification::SuccessRehashNeeded
        } else {
            PasswordVerification::Success
        }
    }

    /// Only a complete Argon2 PHC string counts; a plaintext that merely
    /// starts with `$` does not
    fn is_hashed(&self, value: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(value) else {
            return false;
        };

        Algorithm::try_from(parsed.algorithm).is_ok()
            && parsed.salt.is_some()
            && parsed.hash.is_some()
            && Params::try_from(&parsed).is_ok()
    }
}
