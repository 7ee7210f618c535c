//! User directory trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{NewUser, User, UserKey};

use crate::error::IdentityError;

/// Backing store the registry resolves users against.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up an existing user. `Ok(None)` means the user does not exist.
    async fn lookup(&self, key: &UserKey) -> Result<Option<User>, IdentityError>;

    /// Creates a user from seed attributes.
    ///
    /// Implementations should tolerate being asked to create a key that
    /// already exists and return the existing user in that case.
    async fn create(&self, seed: NewUser) -> Result<User, IdentityError>;
}

#[async_trait]
impl<D: UserDirectory + ?Sized> UserDirectory for Arc<D> {
    async fn lookup(&self, key: &UserKey) -> Result<Option<User>, IdentityError> {
        (**self).lookup(key).await
    }

    async fn create(&self, seed: NewUser) -> Result<User, IdentityError> {
        (**self).create(seed).await
    }
}

#[derive(Debug, Default)]
struct InMemoryDirectoryState {
    users: HashMap<UserKey, User>,
    lookup_calls: usize,
    create_calls: usize,
    fail_on_lookup: bool,
    fail_on_create: bool,
    latency: Option<Duration>,
}

/// In-memory user directory for testing and demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    state: Arc<RwLock<InMemoryDirectoryState>>,
}

impl InMemoryUserDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user directly, bypassing the create path.
    pub fn insert(&self, user: User) {
        self.state
            .write()
            .unwrap()
            .users
            .insert(user.key.clone(), user);
    }

    /// Configures lookups to fail.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.state.write().unwrap().fail_on_lookup = fail;
    }

    /// Configures creations to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Delays every call by the given duration.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Returns how many times `lookup` has been called.
    pub fn lookup_calls(&self) -> usize {
        self.state.read().unwrap().lookup_calls
    }

    /// Returns how many times `create` has been called.
    pub fn create_calls(&self) -> usize {
        self.state.read().unwrap().create_calls
    }

    /// Returns the number of stored users.
    pub fn user_count(&self) -> usize {
        self.state.read().unwrap().users.len()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.read().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn lookup(&self, key: &UserKey) -> Result<Option<User>, IdentityError> {
        self.simulate_latency().await;

        let mut state = self.state.write().unwrap();
        state.lookup_calls += 1;

        if state.fail_on_lookup {
            return Err(IdentityError::Lookup {
                key: key.clone(),
                reason: "Directory unavailable".to_string(),
            });
        }

        Ok(state.users.get(key).cloned())
    }

    async fn create(&self, seed: NewUser) -> Result<User, IdentityError> {
        self.simulate_latency().await;

        let mut state = self.state.write().unwrap();
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(IdentityError::Create {
                key: seed.key,
                reason: "Directory rejected the user".to_string(),
            });
        }

        let user = state
            .users
            .entry(seed.key.clone())
            .or_insert_with(|| User::from_seed(seed))
            .clone();
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_missing_then_create() {
        let directory = InMemoryUserDirectory::new();
        let key = UserKey::new("Fuller Gonzalez");

        assert!(directory.lookup(&key).await.unwrap().is_none());

        let user = directory.create(NewUser::from_key(&key)).await.unwrap();
        assert_eq!(user.key, key);

        let found = directory.lookup(&key).await.unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(directory.lookup_calls(), 2);
        assert_eq!(directory.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_returns_existing_user() {
        let directory = InMemoryUserDirectory::new();
        let key = UserKey::new("alice");

        let first = directory.create(NewUser::from_key(&key)).await.unwrap();
        let second = directory.create(NewUser::from_key(&key)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(directory.user_count(), 1);
        assert_eq!(directory.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_lookup() {
        let directory = InMemoryUserDirectory::new();
        directory.set_fail_on_lookup(true);

        let result = directory.lookup(&UserKey::new("alice")).await;
        assert!(matches!(result, Err(IdentityError::Lookup { .. })));
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let directory = InMemoryUserDirectory::new();
        directory.set_fail_on_create(true);

        let result = directory
            .create(NewUser::from_key(&UserKey::new("alice")))
            .await;
        assert!(matches!(result, Err(IdentityError::Create { .. })));
        assert_eq!(directory.user_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_bypasses_create() {
        let directory = InMemoryUserDirectory::new();
        let user = User::from_seed(NewUser::from_key(&UserKey::new("carol")));
        directory.insert(user.clone());

        let found = directory.lookup(&user.key).await.unwrap();
        assert_eq!(found, Some(user));
        assert_eq!(directory.create_calls(), 0);
    }
}
