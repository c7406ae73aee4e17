//! User record and identifier types

use std::str::FromStr;

use serde::Serialize;

use crate::domain::DomainError;

/// Surrogate primary key of a user record, assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    /// Wrap a raw store key
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    /// Parse the opaque string id used by the identity contract
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>()
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("'{}' is not an integer user ID: {}", s, e)))
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the `User` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// None until the store has persisted the record
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<UserId>,
    /// Login name, doubling as the normalized name
    user_name: String,
    /// Hasher output - never exposed in serialization
    #[serde(skip_serializing)]
    password_hash: String,
    /// Reference to a role the store owns
    role_id: i32,
    /// Account-enabled flag
    is_active: bool,
}

impl User {
    /// Create a new, not yet persisted, active user without a password
    pub fn new(user_name: impl Into<String>, role_id: i32) -> Self {
        Self {
            id: None,
            user_name: user_name.into(),
            password_hash: String::new(),
            role_id,
            is_active: true,
        }
    }

    /// Rebuild a record loaded from the store
    pub fn restore(
        id: UserId,
        user_name: impl Into<String>,
        password_hash: impl Into<String>,
        role_id: i32,
        is_active: bool,
    ) -> Self {
        Self {
            id: Some(id),
            user_name: user_name.into(),
            password_hash: password_hash.into(),
            role_id,
            is_active,
        }
    }

    // Getters

    pub fn id(&self) -> Option<UserId> {
        self.id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role_id(&self) -> i32 {
        self.role_id
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// The id of a persisted record.
    ///
    /// A transient record is caller misuse rather than a store failure, so it
    /// is reported as `NotPersisted` before any round trip is attempted.
    pub fn persisted_id(&self) -> Result<UserId, DomainError> {
        self.id
            .ok_or_else(|| DomainError::not_persisted(self.user_name.as_str()))
    }

    // Mutators

    pub fn set_user_name(&mut self, user_name: impl Into<String>) {
        self.user_name = user_name.into();
    }

    pub fn set_role_id(&mut self, role_id: i32) {
        self.role_id = role_id;
    }

    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }

    /// Store-assigned key
    pub(crate) fn assign_id(&mut self, id: UserId) {
        self.id = Some(id);
    }

    /// Only reachable through the hashing path
    pub(crate) fn assign_password_hash(&mut self, password_hash: impl Into<String>) {
        self.password_hash = password_hash.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parse() {
        let id: UserId = "42".parse().unwrap();
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_user_id_parse_rejects_non_numeric() {
        let result = "abc".parse::<UserId>();
        assert!(matches!(result, Err(DomainError::InvalidId { .. })));

        assert!("".parse::<UserId>().is_err());
        assert!("1.5".parse::<UserId>().is_err());
        assert!("99999999999".parse::<UserId>().is_err());
    }

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("alice", 1);

        assert!(user.id().is_none());
        assert_eq!(user.user_name(), "alice");
        assert_eq!(user.password_hash(), "");
        assert_eq!(user.role_id(), 1);
        assert!(user.is_active());
    }

    #[test]
    fn test_persisted_id_requires_assignment() {
        let mut user = User::new("alice", 1);
        assert!(matches!(
            user.persisted_id(),
            Err(DomainError::NotPersisted { ref user_name }) if user_name == "alice"
        ));

        user.assign_id(UserId::new(7));
        assert_eq!(user.persisted_id().unwrap(), UserId::new(7));
    }

    #[test]
    fn test_mutators() {
        let mut user = User::restore(UserId::new(3), "bob", "hash", 2, true);

        user.set_user_name("BOB");
        user.set_role_id(5);
        user.set_active(false);

        assert_eq!(user.user_name(), "BOB");
        assert_eq!(user.role_id(), 5);
        assert!(!user.is_active());
        assert_eq!(user.password_hash(), "hash");
    }

    #[test]
    fn test_serialization_excludes_password() {
        let user = User::restore(UserId::new(1), "alice", "secret_hash", 1, true);

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["userName"], "alice");
        assert_eq!(json["isActive"], true);
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("secret_hash"));
    }
}
