//! In-memory user repository implementation

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::user::{User, UserId, UserRepository};
use crate::domain::DomainError;

/// In-memory implementation of UserRepository
///
/// Ids come from a counter and are never handed out twice, even after the
/// record holding one is deleted.
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<BTreeMap<UserId, User>>>,
    next_id: AtomicI32,
}

impl InMemoryUserRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicI32::new(1),
        }
    }

    /// Create a repository seeded with already persisted users
    pub fn with_users(users: Vec<User>) -> Result<Self, DomainError> {
        let mut users_map = BTreeMap::new();

        for user in users {
            users_map.insert(user.persisted_id()?, user);
        }

        let next = users_map.keys().next_back().map_or(1, |id| id.value() + 1);

        Ok(Self {
            users: Arc::new(RwLock::new(users_map)),
            next_id: AtomicI32::new(next),
        })
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Whether no record is stored
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: &User) -> Result<UserId, DomainError> {
        let mut users = self.users.write().await;

        let id = UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = user.clone();
        stored.assign_id(id);
        users.insert(id, stored);

        Ok(id)
    }

    async fn update(&self, user: &User) -> Result<(), DomainError> {
        let id = user.persisted_id()?;
        let mut users = self.users.write().await;

        match users.get_mut(&id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(DomainError::storage(format!(
                "Update affected no rows for user {}",
                id
            ))),
        }
    }

    async fn delete(&self, user: &User) -> Result<(), DomainError> {
        let id = user.persisted_id()?;
        let mut users = self.users.write().await;

        users.remove(&id).map(|_| ()).ok_or_else(|| {
            DomainError::storage(format!("Delete affected no rows for user {}", id))
        })
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn get_by_user_name(&self, user_name: &str) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.user_name() == user_name).cloned())
    }
}
