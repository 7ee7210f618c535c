//! Keyed get-or-create registry for users.
//!
//! Many checkouts resolve the same key at once. Only the first resolver of a
//! key starts a creation; everyone else subscribes to that creation's result.
//!
//! ```text
//! resolve("A") ─┐
//!               │                      settle task
//! resolve("A") ─┼──► IdentityRegistry ──────────────► UserDirectory
//!               │        │                              lookup / create
//! resolve("A") ─┘        │                                   │
//!                        ▼                                   ▼
//!                  [all three receive                  [one creation]
//!                   the same Arc<User>]◄─────────────────────┘
//! ```
//!
//! # Implementation
//!
//! Each key maps to a [`Slot`] that is either a settled user or a pending
//! creation. Check, mark, and publish all go through the `DashMap` entry API,
//! so there is no window between "is it there?" and "insert it". The shard
//! lock is never held across a directory call.
//!
//! The creation itself runs on a spawned task. A resolver that gives up
//! (timeout, cancelled checkout) does not abandon the creation the other
//! resolvers are waiting on.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::{NewUser, User, UserKey};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::directory::UserDirectory;
use crate::error::IdentityError;

type Settlement = Result<Arc<User>, IdentityError>;

enum Slot {
    /// The user exists; resolves return it without waiting.
    Settled(Arc<User>),
    /// A creation is in flight; resolvers wait on its result.
    Pending(watch::Receiver<Option<Settlement>>),
}

/// Statistics for monitoring registry behavior.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total resolve calls.
    pub resolves: u64,
    /// Resolves answered from a settled slot.
    pub hits: u64,
    /// Resolves that waited on another caller's creation.
    pub coalesced: u64,
    /// Calls made to the directory's create path.
    pub creations: u64,
    /// Settle attempts that ended in an error.
    pub failures: u64,
}

impl RegistryStats {
    /// Returns the fraction of resolves that joined an in-flight creation.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.resolves == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.resolves as f64
        }
    }
}

/// Thread-safe get-or-create store mapping user keys to users.
///
/// Cloning the registry yields another handle to the same slots.
pub struct IdentityRegistry<D> {
    inner: Arc<RegistryInner<D>>,
}

impl<D> Clone for IdentityRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RegistryInner<D> {
    directory: D,
    slots: DashMap<UserKey, Slot>,
    call_timeout: Option<Duration>,
    resolves: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
    creations: AtomicU64,
    failures: AtomicU64,
}

impl<D: UserDirectory + 'static> IdentityRegistry<D> {
    /// Creates a registry with unbounded directory calls.
    pub fn new(directory: D) -> Self {
        Self::with_call_timeout(directory, None)
    }

    /// Creates a registry whose directory calls are each bounded by `call_timeout`.
    pub fn with_call_timeout(directory: D, call_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                directory,
                slots: DashMap::new(),
                call_timeout,
                resolves: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                creations: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Resolves a key to its user, creating the user if needed.
    ///
    /// Settled keys return immediately. If a creation for `key` is already in
    /// flight, this call waits for it and returns the same user (or the same
    /// error). Otherwise this call marks the key as pending and starts the
    /// creation. A failed creation clears the marker so a later resolve can
    /// retry.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, key: &UserKey) -> Result<Arc<User>, IdentityError> {
        self.inner.resolves.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("identity_resolves_total").increment(1);

        let (mut rx, leader) = match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Settled(user) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(user));
                }
                Slot::Pending(rx) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("identity_coalesced_total").increment(1);
                    debug!("joining in-flight creation");
                    (rx.clone(), None)
                }
            },
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(Slot::Pending(rx.clone()));
                (rx, Some(tx))
            }
        };

        // Spawned only after the shard lock above has been released.
        if let Some(tx) = leader {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            tokio::spawn(async move { inner.settle(key, tx).await });
        }

        // Bound to a local so the `watch::Ref` is released before `rx`.
        let settlement = match rx.wait_for(Option::is_some).await {
            Ok(settled) => (*settled)
                .clone()
                .unwrap_or_else(|| Err(IdentityError::Abandoned { key: key.clone() })),
            Err(_) => Err(IdentityError::Abandoned { key: key.clone() }),
        };
        settlement
    }
}

impl<D> IdentityRegistry<D> {
    /// Returns the settled user for `key` without waiting or creating.
    pub fn peek(&self, key: &UserKey) -> Option<Arc<User>> {
        self.inner
            .slots
            .get(key)
            .and_then(|slot| match slot.value() {
                Slot::Settled(user) => Some(Arc::clone(user)),
                Slot::Pending(_) => None,
            })
    }

    /// Returns true if a creation for `key` is currently in flight.
    pub fn is_pending(&self, key: &UserKey) -> bool {
        self.inner
            .slots
            .get(key)
            .is_some_and(|slot| matches!(slot.value(), Slot::Pending(_)))
    }

    /// Returns the number of settled users.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Settled(_)))
            .count()
    }

    /// Returns true if no user has been settled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the backing directory.
    pub fn directory(&self) -> &D {
        &self.inner.directory
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            resolves: self.inner.resolves.load(Ordering::Relaxed),
            hits: self.inner.hits.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            creations: self.inner.creations.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}

impl<D: UserDirectory> RegistryInner<D> {
    /// Runs the single creation for `key` and publishes its outcome.
    ///
    /// The slot is updated before waiters are woken, so a resolver arriving
    /// after the wake-up sees the settled slot rather than a stale marker.
    async fn settle(self: Arc<Self>, key: UserKey, tx: watch::Sender<Option<Settlement>>) {
        let mut guard = PendingGuard {
            slots: &self.slots,
            key: &key,
            armed: true,
        };

        let outcome = self.fetch_or_create(&key).await;
        match &outcome {
            Ok(user) => {
                self.slots
                    .insert(key.clone(), Slot::Settled(Arc::clone(user)));
            }
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("identity_failures_total").increment(1);
                warn!(%key, %error, "user resolution failed");
                self.slots
                    .remove_if(&key, |_, slot| matches!(slot, Slot::Pending(_)));
            }
        }
        guard.armed = false;

        tx.send_replace(Some(outcome));
    }

    async fn fetch_or_create(&self, key: &UserKey) -> Settlement {
        if let Some(user) = self.bounded(key, self.directory.lookup(key)).await? {
            debug!(%key, user_id = %user.id, "user found in directory");
            return Ok(Arc::new(user));
        }

        self.creations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("identity_creations_total").increment(1);
        let user = self
            .bounded(key, self.directory.create(NewUser::from_key(key)))
            .await?;
        info!(%key, user_id = %user.id, "user created");
        Ok(Arc::new(user))
    }

    async fn bounded<T>(
        &self,
        key: &UserKey,
        call: impl Future<Output = Result<T, IdentityError>>,
    ) -> Result<T, IdentityError> {
        match self.call_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| IdentityError::Timeout {
                    key: key.clone(),
                    after,
                })?,
            None => call.await,
        }
    }
}

/// Clears a pending marker if the settle task unwinds before publishing.
///
/// Dropping the watch sender afterwards wakes every waiter with
/// [`IdentityError::Abandoned`].
struct PendingGuard<'a> {
    slots: &'a DashMap<UserKey, Slot>,
    key: &'a UserKey,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slots
                .remove_if(self.key, |_, slot| matches!(slot, Slot::Pending(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryUserDirectory;
    use async_trait::async_trait;

    fn key(name: &str) -> UserKey {
        UserKey::new(name)
    }

    #[tokio::test]
    async fn test_resolve_creates_missing_user() {
        let directory = InMemoryUserDirectory::new();
        let registry = IdentityRegistry::new(directory.clone());

        let user = registry.resolve(&key("alice")).await.unwrap();

        assert_eq!(user.key, key("alice"));
        assert_eq!(directory.create_calls(), 1);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.peek(&key("alice")).unwrap(), &user));
    }

    #[tokio::test]
    async fn test_resolve_uses_existing_directory_user() {
        let directory = InMemoryUserDirectory::new();
        let existing = User::from_seed(NewUser::from_key(&key("bob")));
        directory.insert(existing.clone());
        let registry = IdentityRegistry::new(directory.clone());

        let user = registry.resolve(&key("bob")).await.unwrap();

        assert_eq!(*user, existing);
        assert_eq!(directory.create_calls(), 0);
        assert_eq!(registry.stats().creations, 0);
    }

    #[tokio::test]
    async fn test_settled_key_never_calls_directory_again() {
        let directory = InMemoryUserDirectory::new();
        let registry = IdentityRegistry::new(directory.clone());

        let first = registry.resolve(&key("alice")).await.unwrap();
        directory.set_latency(Some(Duration::from_secs(5)));

        let second = tokio::time::timeout(
            Duration::from_millis(100),
            registry.resolve(&key("alice")),
        )
        .await
        .expect("settled resolve must not wait on the directory")
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.lookup_calls(), 1);
        assert_eq!(registry.stats().hits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolvers_share_failure_and_marker_clears() {
        let directory = InMemoryUserDirectory::new();
        directory.set_latency(Some(Duration::from_millis(50)));
        directory.set_fail_on_create(true);
        let registry = IdentityRegistry::new(directory.clone());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(
                async move { registry.resolve(&key("dave")).await },
            ));
        }

        let mut errors = Vec::new();
        for handle in handles {
            errors.push(handle.await.unwrap().unwrap_err());
        }
        assert_eq!(directory.create_calls(), 1);
        assert!(errors.iter().all(|e| *e == errors[0]));
        assert!(matches!(errors[0], IdentityError::Create { .. }));
        assert!(!registry.is_pending(&key("dave")));

        // The key is not stuck: a later resolve retries the creation.
        directory.set_fail_on_create(false);
        let user = registry.resolve(&key("dave")).await.unwrap();
        assert_eq!(user.key, key("dave"));
        assert_eq!(directory.create_calls(), 2);
        assert_eq!(registry.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported() {
        let directory = InMemoryUserDirectory::new();
        directory.set_fail_on_lookup(true);
        let registry = IdentityRegistry::new(directory.clone());

        let result = registry.resolve(&key("erin")).await;

        assert!(matches!(result, Err(IdentityError::Lookup { .. })));
        assert_eq!(directory.create_calls(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_directory_timeout_fails_resolve() {
        let directory = InMemoryUserDirectory::new();
        directory.set_latency(Some(Duration::from_millis(500)));
        let registry =
            IdentityRegistry::with_call_timeout(directory, Some(Duration::from_millis(20)));

        let result = registry.resolve(&key("frank")).await;

        assert!(matches!(result, Err(IdentityError::Timeout { .. })));
        assert!(!registry.is_pending(&key("frank")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_resolver_does_not_abandon_creation() {
        let directory = InMemoryUserDirectory::new();
        directory.set_latency(Some(Duration::from_millis(100)));
        let registry = IdentityRegistry::new(directory.clone());

        let gave_up =
            tokio::time::timeout(Duration::from_millis(10), registry.resolve(&key("gina"))).await;
        assert!(gave_up.is_err());
        assert!(registry.is_pending(&key("gina")));

        let user = registry.resolve(&key("gina")).await.unwrap();
        assert_eq!(user.key, key("gina"));
        assert_eq!(directory.create_calls(), 1);
    }

    struct PanickingDirectory;

    #[async_trait]
    impl UserDirectory for PanickingDirectory {
        async fn lookup(&self, _key: &UserKey) -> Result<Option<User>, IdentityError> {
            Ok(None)
        }

        async fn create(&self, _seed: NewUser) -> Result<User, IdentityError> {
            panic!("directory crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_creation_is_reported_as_abandoned() {
        let registry = IdentityRegistry::new(PanickingDirectory);

        let result = registry.resolve(&key("hank")).await;

        assert_eq!(
            result.unwrap_err(),
            IdentityError::Abandoned { key: key("hank") }
        );
        assert!(!registry.is_pending(&key("hank")));
    }

    #[test]
    fn test_coalescing_ratio() {
        let stats = RegistryStats {
            resolves: 10,
            coalesced: 4,
            ..Default::default()
        };
        assert!((stats.coalescing_ratio() - 0.4).abs() < f64::EPSILON);
        assert_eq!(RegistryStats::default().coalescing_ratio(), 0.0);
    }
}
