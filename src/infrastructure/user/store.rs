//! Credential store adapter
//!
//! Implements the identity contract over a [`UserRepository`]. Setters only
//! stage changes on the caller's record; reads and writes that must reach the
//! table go through one repository round trip each.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::user::{
    IdentityError, IdentityErrorCode, IdentityResult, User, UserEmailStore, UserId,
    UserPasswordStore, UserRepository, UserStore,
};
use crate::domain::DomainError;

use super::password::PasswordHasher;

/// Adapter satisfying the primary, password and email capabilities
pub struct CredentialStore<R: ?Sized, H: ?Sized> {
    repository: Arc<R>,
    hasher: Arc<H>,
}

impl<R: ?Sized, H: ?Sized> std::fmt::Debug for CredentialStore<R, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl<R: ?Sized, H: ?Sized> Clone for CredentialStore<R, H> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl<R, H> CredentialStore<R, H>
where
    R: UserRepository + ?Sized,
    H: PasswordHasher + ?Sized,
{
    /// Create a new credential store over a repository and a hasher
    pub fn new(repository: Arc<R>, hasher: Arc<H>) -> Self {
        Self { repository, hasher }
    }

    /// The hasher the store stages passwords with
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Re-hash the stored password of a user and persist it.
    ///
    /// Meant to run once per user to move legacy plaintext rows to hashed
    /// form. Running it again hashes the hash and the user can no longer sign
    /// in; use [`CredentialStore::migrate_legacy_password`] unless that is
    /// really intended.
    pub async fn hash_and_save_password(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        let Some(user) = self.load_for_migration(user_id, cancel).await? else {
            return Ok(IdentityResult::failed(IdentityError::user_not_found(user_id)));
        };

        self.rehash_and_save(user, cancel).await
    }

    /// Guarded one-shot migration of a legacy plaintext password.
    ///
    /// Refuses users whose stored value already is hasher output or is empty,
    /// so repeated runs leave credentials intact.
    pub async fn migrate_legacy_password(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        let Some(user) = self.load_for_migration(user_id, cancel).await? else {
            return Ok(IdentityResult::failed(IdentityError::user_not_found(user_id)));
        };

        if user.password_hash().is_empty() {
            return Ok(IdentityResult::failed(IdentityError::new(
                IdentityErrorCode::PasswordMissing,
                format!("User with ID {} has no password to migrate.", user_id),
            )));
        }

        if self.hasher.is_hashed(user.password_hash()) {
            info!(user_id = %user_id, "Password already hashed, skipping migration");
            return Ok(IdentityResult::failed(IdentityError::new(
                IdentityErrorCode::PasswordAlreadyHashed,
                format!("User with ID {} already has a hashed password.", user_id),
            )));
        }

        self.rehash_and_save(user, cancel).await
    }

    async fn load_for_migration(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError> {
        let user =
            cancellable(cancel, "hash_and_save_password", || self.repository.get_by_id(user_id))
                .await?;

        if user.is_none() {
            warn!(user_id = %user_id, "Password migration requested for unknown user");
        }

        Ok(user)
    }

    async fn rehash_and_save(
        &self,
        mut user: User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        let user_id = user.persisted_id()?;
        let rehashed = self.hasher.hash(&user, user.password_hash())?;
        user.assign_password_hash(rehashed);

        cancellable(cancel, "hash_and_save_password", || self.repository.update(&user)).await?;
        info!(user_id = %user_id, "Stored password re-hashed");

        Ok(IdentityResult::Success)
    }
}

/// Race a repository round trip against the caller's cancellation.
///
/// Dropping the losing future drops its connection with it.
async fn cancellable<T, F, Fut>(
    cancel: &CancellationToken,
    operation: &'static str,
    round_trip: F,
) -> Result<T, DomainError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    ensure_not_cancelled(cancel, operation)?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(operation, "Store round trip cancelled");
            Err(DomainError::cancelled(operation))
        }
        result = round_trip() => result,
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, operation: &'static str) -> Result<(), DomainError> {
    if cancel.is_cancelled() {
        return Err(DomainError::cancelled(operation));
    }
    Ok(())
}

#[async_trait]
impl<R, H> UserStore for CredentialStore<R, H>
where
    R: UserRepository + ?Sized,
    H: PasswordHasher + ?Sized,
{
    async fn create(
        &self,
        user: &mut User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        let id = cancellable(cancel, "create", || self.repository.insert(user)).await?;
        user.assign_id(id);

        info!(user_id = %id, user_name = %user.user_name(), "Created user");
        Ok(IdentityResult::Success)
    }

    async fn update(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        cancellable(cancel, "update", || self.repository.update(user)).await?;

        debug!(user_id = ?user.id(), "Updated user");
        Ok(IdentityResult::Success)
    }

    async fn delete(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<IdentityResult, DomainError> {
        cancellable(cancel, "delete", || self.repository.delete(user)).await?;

        info!(user_id = ?user.id(), "Deleted user");
        Ok(IdentityResult::Success)
    }

    async fn find_by_id(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError> {
        let id: UserId = user_id.parse()?;
        cancellable(cancel, "find_by_id", || self.repository.get_by_id(id)).await
    }

    async fn find_by_name(
        &self,
        normalized_user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError> {
        cancellable(cancel, "find_by_name", || {
            self.repository.get_by_user_name(normalized_user_name)
        })
        .await
    }

    async fn get_user_id(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_user_id")?;
        Ok(user.persisted_id()?.to_string())
    }

    async fn get_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_user_name")?;
        Ok(user.user_name().to_string())
    }

    async fn set_user_name(
        &self,
        user: &mut User,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_user_name")?;
        user.set_user_name(user_name);
        Ok(())
    }

    async fn get_normalized_user_name(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_normalized_user_name")?;
        Ok(user.user_name().to_uppercase())
    }

    /// There is no separate normalized column: this overwrites the user name
    async fn set_normalized_user_name(
        &self,
        user: &mut User,
        normalized_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_normalized_user_name")?;
        user.set_user_name(normalized_name);
        Ok(())
    }
}

#[async_trait]
impl<R, H> UserPasswordStore for CredentialStore<R, H>
where
    R: UserRepository + ?Sized,
    H: PasswordHasher + ?Sized,
{
    async fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_password_hash")?;

        let hashed = self.hasher.hash(user, password_hash)?;
        if hashed.is_empty() {
            return Err(DomainError::hashing("Hasher produced an empty hash"));
        }

        user.assign_password_hash(hashed);
        Ok(())
    }

    async fn get_password_hash(
        &self,
        user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_password_hash")?;
        Ok(user.password_hash().to_string())
    }

    async fn has_password(&self, user: &User, cancel: &CancellationToken) -> Result<bool, DomainError> {
        ensure_not_cancelled(cancel, "has_password")?;
        Ok(!user.password_hash().is_empty())
    }
}

// The User table carries no email column; every method below is inert.
#[async_trait]
impl<R, H> UserEmailStore for CredentialStore<R, H>
where
    R: UserRepository + ?Sized,
    H: PasswordHasher + ?Sized,
{
    async fn set_email(
        &self,
        _user: &mut User,
        _email: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_email")
    }

    async fn get_email(&self, _user: &User, cancel: &CancellationToken) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_email")?;
        Ok(String::new())
    }

    async fn get_email_confirmed(
        &self,
        _user: &User,
        cancel: &CancellationToken,
    ) -> Result<bool, DomainError> {
        ensure_not_cancelled(cancel, "get_email_confirmed")?;
        Ok(true)
    }

    async fn set_email_confirmed(
        &self,
        _user: &mut User,
        _confirmed: bool,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_email_confirmed")
    }

    async fn find_by_email(
        &self,
        _normalized_email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>, DomainError> {
        ensure_not_cancelled(cancel, "find_by_email")?;
        Ok(None)
    }

    async fn get_normalized_email(
        &self,
        _user: &User,
        cancel: &CancellationToken,
    ) -> Result<String, DomainError> {
        ensure_not_cancelled(cancel, "get_normalized_email")?;
        Ok(String::new())
    }

    async fn set_normalized_email(
        &self,
        _user: &mut User,
        _normalized_email: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        ensure_not_cancelled(cancel, "set_normalized_email")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::MockUserRepository;
    use crate::infrastructure::user::password::{MockPasswordHasher, PasswordVerification};
    use crate::infrastructure::user::repository::InMemoryUserRepository;
    use std::time::Duration;

    /// Deterministic hasher so tests can predict `Hash(record, p)`
    #[derive(Debug, Default)]
    struct PrefixHasher;

    impl PasswordHasher for PrefixHasher {
        fn hash(&self, _user: &User, password: &str) -> Result<String, DomainError> {
            Ok(format!("hash:{}", password))
        }

        fn verify(&self, _user: &User, hash: &str, provided: &str) -> PasswordVerification {
            if hash == format!("hash:{}", provided) {
                PasswordVerification::Success
            } else {
                PasswordVerification::Failed
            }
        }

        fn is_hashed(&self, value: &str) -> bool {
            value.starts_with("hash:")
        }
    }

    /// Repository whose round trips never complete
    struct StalledRepository;

    #[async_trait]
    impl UserRepository for StalledRepository {
        async fn insert(&self, _user: &User) -> Result<UserId, DomainError> {
            std::future::pending().await
        }

        async fn update(&self, _user: &User) -> Result<(), DomainError> {
            std::future::pending().await
        }

        async fn delete(&self, _user: &User) -> Result<(), DomainError> {
            std::future::pending().await
        }

        async fn get_by_id(&self, _id: UserId) -> Result<Option<User>, DomainError> {
            std::future::pending().await
        }

        async fn get_by_user_name(&self, _user_name: &str) -> Result<Option<User>, DomainError> {
            std::future::pending().await
        }
    }

    type TestStore = CredentialStore<InMemoryUserRepository, PrefixHasher>;

    fn create_store() -> (TestStore, Arc<InMemoryUserRepository>) {
        let repository = Arc::new(InMemoryUserRepository::new());
        let store = CredentialStore::new(Arc::clone(&repository), Arc::new(PrefixHasher));
        (store, repository)
    }

    async fn seed_legacy_user(repository: &InMemoryUserRepository, plaintext: &str) -> UserId {
        let mut legacy = User::new("legacy", 2);
        legacy.assign_password_hash(plaintext);
        repository.insert(&legacy).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_store_id() {
        let (store, repository) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        let result = store.create(&mut user, &cancel).await.unwrap();

        assert!(result.succeeded());
        let id = user.id().unwrap();
        let stored = repository.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();

        let mut user = User::new("alice", 1);
        store.create(&mut user, &cancel).await.unwrap();
        let id = store.get_user_id(&user, &cancel).await.unwrap();

        store.set_password_hash(&mut user, "secret", &cancel).await.unwrap();
        let hash = store.get_password_hash(&user, &cancel).await.unwrap();
        assert_eq!(hash, "hash:secret");
        assert_ne!(hash, "secret");

        assert!(store.update(&user, &cancel).await.unwrap().succeeded());

        let stored = store.find_by_id(&id, &cancel).await.unwrap().unwrap();
        assert_eq!(stored.password_hash(), "hash:secret");
        assert_eq!(stored.user_name(), "alice");
        assert_eq!(stored.role_id(), 1);
        assert!(stored.is_active());
    }

    #[tokio::test]
    async fn test_set_password_hash_always_hashes_input() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        store.set_password_hash(&mut user, "hash:already", &cancel).await.unwrap();

        assert_eq!(
            store.get_password_hash(&user, &cancel).await.unwrap(),
            "hash:hash:already"
        );
    }

    #[tokio::test]
    async fn test_set_password_hash_passes_record_to_hasher() {
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_hash()
            .withf(|user, password| user.user_name() == "alice" && password == "secret")
            .times(1)
            .returning(|_, _| Ok("$argon2id$opaque".to_string()));

        let store = CredentialStore::new(Arc::new(InMemoryUserRepository::new()), Arc::new(hasher));
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        store.set_password_hash(&mut user, "secret", &cancel).await.unwrap();
        assert_eq!(user.password_hash(), "$argon2id$opaque");
    }

    #[tokio::test]
    async fn test_set_password_hash_rejects_empty_hash() {
        let mut hasher = MockPasswordHasher::new();
        hasher.expect_hash().returning(|_, _| Ok(String::new()));

        let store = CredentialStore::new(Arc::new(InMemoryUserRepository::new()), Arc::new(hasher));
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        let result = store.set_password_hash(&mut user, "secret", &cancel).await;
        assert!(matches!(result, Err(DomainError::Hashing { .. })));
        assert!(!store.has_password(&user, &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_password_hash_propagates_hasher_failure() {
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_hash()
            .returning(|_, _| Err(DomainError::hashing("out of memory")));

        let store = CredentialStore::new(Arc::new(InMemoryUserRepository::new()), Arc::new(hasher));
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        let result = store.set_password_hash(&mut user, "secret", &cancel).await;
        assert!(matches!(result, Err(DomainError::Hashing { .. })));
        assert_eq!(user.password_hash(), "");
    }

    #[tokio::test]
    async fn test_has_password() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);

        assert!(!store.has_password(&user, &cancel).await.unwrap());

        store.set_password_hash(&mut user, "secret", &cancel).await.unwrap();
        assert!(store.has_password(&user, &cancel).await.unwrap());

        let blank = User::restore(UserId::new(1), "blank", "", 1, true);
        assert!(!store.has_password(&blank, &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_name_is_exact() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("Alice", 1);
        store.create(&mut user, &cancel).await.unwrap();

        let found = store.find_by_name("Alice", &cancel).await.unwrap().unwrap();
        assert_eq!(found.user_name(), "Alice");

        assert!(store.find_by_name("ALICE", &cancel).await.unwrap().is_none());
        assert!(store.find_by_name("never-inserted", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_id_rejects_non_numeric() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();

        let result = store.find_by_id("abc", &cancel).await;
        assert!(matches!(result, Err(DomainError::InvalidId { .. })));
    }

    #[tokio::test]
    async fn test_find_by_id_unknown_is_none() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();

        assert!(store.find_by_id("999999", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, repository) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);
        store.create(&mut user, &cancel).await.unwrap();

        assert!(store.delete(&user, &cancel).await.unwrap().succeeded());
        assert!(repository.is_empty().await);

        let again = store.delete(&user, &cancel).await;
        assert!(again.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_user_name_accessors() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("Alice", 1);

        assert_eq!(store.get_user_name(&user, &cancel).await.unwrap(), "Alice");
        assert_eq!(
            store.get_normalized_user_name(&user, &cancel).await.unwrap(),
            "ALICE"
        );

        store.set_user_name(&mut user, "bob", &cancel).await.unwrap();
        assert_eq!(user.user_name(), "bob");

        store.set_normalized_user_name(&mut user, "BOB", &cancel).await.unwrap();
        assert_eq!(store.get_user_name(&user, &cancel).await.unwrap(), "BOB");
    }

    #[tokio::test]
    async fn test_get_user_id_of_transient_user_fails() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();

        let result = store.get_user_id(&User::new("alice", 1), &cancel).await;
        assert!(matches!(result, Err(DomainError::NotPersisted { .. })));
    }

    #[tokio::test]
    async fn test_email_capability_is_inert() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();
        let mut user = User::new("alice", 1);
        store.create(&mut user, &cancel).await.unwrap();
        let before = user.clone();

        store.set_email(&mut user, "alice@example.com", &cancel).await.unwrap();
        store.set_email_confirmed(&mut user, false, &cancel).await.unwrap();
        store
            .set_normalized_email(&mut user, "ALICE@EXAMPLE.COM", &cancel)
            .await
            .unwrap();

        assert_eq!(user, before);
        assert_eq!(store.get_email(&user, &cancel).await.unwrap(), "");
        assert!(store.get_email_confirmed(&user, &cancel).await.unwrap());
        assert_eq!(store.get_normalized_email(&user, &cancel).await.unwrap(), "");
        assert!(store
            .find_by_email("ALICE@EXAMPLE.COM", &cancel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_hash_and_save_password_unknown_user() {
        let (store, _) = create_store();
        let cancel = CancellationToken::new();

        let result = store
            .hash_and_save_password(UserId::new(4242), &cancel)
            .await
            .unwrap();

        assert!(!result.succeeded());
        assert_eq!(result.errors()[0].code, IdentityErrorCode::UserNotFound);
        assert!(result.errors()[0].description.contains("4242"));
    }

    #[tokio::test]
    async fn test_hash_and_save_password_rehashes_every_time() {
        let (store, repository) = create_store();
        let cancel = CancellationToken::new();
        let id = seed_legacy_user(&repository, "plain").await;

        let first = store.hash_and_save_password(id, &cancel).await.unwrap();
        assert!(first.succeeded());
        let stored = repository.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash(), "hash:plain");

        store.hash_and_save_password(id, &cancel).await.unwrap();
        let stored = repository.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash(), "hash:hash:plain");
    }

    #[tokio::test]
    async fn test_migrate_legacy_password_runs_once() {
        let (store, repository) = create_store();
        let cancel = CancellationToken::new();
        let id = seed_legacy_user(&repository, "plain").await;

        assert!(store.migrate_legacy_password(id, &cancel).await.unwrap().succeeded());

        let second = store.migrate_legacy_password(id, &cancel).await.unwrap();
        assert_eq!(second.errors()[0].code, IdentityErrorCode::PasswordAlreadyHashed);

        let stored = repository.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash(), "hash:plain");
        assert_eq!(
            store.hasher().verify(&stored, stored.password_hash(), "plain"),
            PasswordVerification::Success
        );
    }

    #[tokio::test]
    async fn test_migrate_legacy_password_hashes_dollar_prefixed_plaintext() {
        use crate::infrastructure::user::password::Argon2Hasher;

        let repository = Arc::new(InMemoryUserRepository::new());
        let store = CredentialStore::new(Arc::clone(&repository), Arc::new(Argon2Hasher::new()));
        let cancel = CancellationToken::new();
        let id = seed_legacy_user(&repository, "$secret").await;

        let result = store.migrate_legacy_password(id, &cancel).await.unwrap();
        assert!(result.succeeded(), "{}", result);

        let stored = repository.get_by_id(id).await.unwrap().unwrap();
        assert!(stored.password_hash().starts_with("$argon2"));
        assert_eq!(
            store.hasher().verify(&stored, stored.password_hash(), "$secret"),
            PasswordVerification::Success
        );

        let again = store.migrate_legacy_password(id, &cancel).await.unwrap();
        assert_eq!(again.errors()[0].code, IdentityErrorCode::PasswordAlreadyHashed);
    }

    #[tokio::test]
    async fn test_migrate_legacy_password_refuses_empty_password() {
        let (store, repository) = create_store();
        let cancel = CancellationToken::new();
        let id = repository.insert(&User::new("nopass", 1)).await.unwrap();

        let result = store.migrate_legacy_password(id, &cancel).await.unwrap();
        assert_eq!(result.errors()[0].code, IdentityErrorCode::PasswordMissing);

        let missing = store
            .migrate_legacy_password(UserId::new(999), &cancel)
            .await
            .unwrap();
        assert_eq!(missing.errors()[0].code, IdentityErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn test_storage_errors_propagate_unchanged() {
        let mut repository = MockUserRepository::new();
        repository
            .expect_get_by_id()
            .returning(|_| Err(DomainError::storage("connection reset by peer")));
        repository
            .expect_update()
            .returning(|_| Err(DomainError::storage("deadlock detected")));

        let store = CredentialStore::new(Arc::new(repository), Arc::new(PrefixHasher));
        let cancel = CancellationToken::new();

        let err = store.find_by_id("1", &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "Storage error: connection reset by peer");

        let err = store
            .hash_and_save_password(UserId::new(1), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Storage error: connection reset by peer");

        let user = User::restore(UserId::new(1), "alice", "", 1, true);
        let err = store.update(&user, &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "Storage error: deadlock detected");
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_repository() {
        // No expectations: any repository call would panic
        let store = CredentialStore::new(Arc::new(MockUserRepository::new()), Arc::new(PrefixHasher));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut user = User::new("alice", 1);
        assert!(matches!(
            store.create(&mut user, &cancel).await,
            Err(DomainError::Cancelled { .. })
        ));
        assert!(matches!(
            store.find_by_name("alice", &cancel).await,
            Err(DomainError::Cancelled { .. })
        ));
        assert!(matches!(
            store.set_password_hash(&mut user, "secret", &cancel).await,
            Err(DomainError::Cancelled { .. })
        ));
        assert_eq!(user.password_hash(), "");
        assert!(user.id().is_none());
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_round_trip() {
        let store = CredentialStore::new(Arc::new(StalledRepository), Arc::new(PrefixHasher));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), store.find_by_id("1", &cancel))
            .await
            .expect("cancellation should end the round trip");

        assert!(matches!(result, Err(DomainError::Cancelled { operation }) if operation == "find_by_id"));
    }

    #[tokio::test]
    async fn test_store_works_behind_trait_objects() {
        let repository: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new());
        let hasher: Arc<dyn PasswordHasher> = Arc::new(PrefixHasher);
        let store: Arc<dyn UserPasswordStore> = Arc::new(CredentialStore::new(repository, hasher));
        let cancel = CancellationToken::new();

        let mut user = User::new("dyn", 1);
        store.set_password_hash(&mut user, "pw", &cancel).await.unwrap();
        store.create(&mut user, &cancel).await.unwrap();

        let found = store.find_by_name("dyn", &cancel).await.unwrap().unwrap();
        assert_eq!(found.password_hash(), "hash:pw");
    }
}
