use crate::error::{RegistryError, Result};
use crate::store::{KeyValue, KvStore, LeaseId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// In-process [`KvStore`] for local runs and tests.
///
/// Leases are stored as deadlines on tokio's clock. Expired entries are hidden
/// from every read and physically removed by [`MemoryStore::sweep`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Instant>,
    next_lease: LeaseId,
}

struct Entry {
    value: Vec<u8>,
    lease: Option<LeaseId>,
}

impl Inner {
    fn is_live(&self, entry: &Entry, now: Instant) -> bool {
        match entry.lease {
            None => true,
            Some(id) => self
                .leases
                .get(&id)
                .is_some_and(|deadline| now < *deadline),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired leases and every entry attached to them. Returns the
    /// number of entries removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        inner.leases.retain(|_, deadline| now < *deadline);

        let Inner {
            entries, leases, ..
        } = &mut *inner;
        let before = entries.len();
        entries.retain(|_, entry| entry.lease.is_none_or(|id| leases.contains_key(&id)));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Swept {} expired entries", removed);
        }

        removed
    }

    /// Run [`MemoryStore::sweep`] every `period` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                self.sweep().await;
            }
        })
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn stored_len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or(RegistryError::InvalidLeaseTtl(ttl))?;

        let mut inner = self.inner.write().await;
        inner.next_lease += 1;
        let id = inner.next_lease;
        inner.leases.insert(id, deadline);
        Ok(id)
    }

    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(id) = lease {
            let live = inner
                .leases
                .get(&id)
                .is_some_and(|deadline| Instant::now() < *deadline);
            if !live {
                return Err(RegistryError::Unavailable(format!(
                    "requested lease not found: {}",
                    id
                )));
            }
        }

        inner.entries.insert(key.to_string(), Entry { value, lease });
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let now = Instant::now();
        let inner = self.inner.read().await;

        let pairs = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| inner.is_live(entry, now))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect();

        Ok(pairs)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.write().await.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_scan_is_bounded() {
        let store = MemoryStore::new();
        store.put("/services/movies/a:1", b"1".to_vec(), None).await.unwrap();
        store.put("/services/movies2/a:1", b"2".to_vec(), None).await.unwrap();
        store.put("/services/users/a:1", b"3".to_vec(), None).await.unwrap();

        let movies = store.get_prefix("/services/movies/").await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].value, b"1");

        let all = store.get_prefix("/services/").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("/services/nope/x:1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_entry_expires() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(Duration::from_secs(10)).await.unwrap();
        store.put("/k", b"v".to_vec(), Some(lease)).await.unwrap();
        store.put("/forever", b"v".to_vec(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get_prefix("/").await.unwrap().len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let live = store.get_prefix("/").await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, "/forever");

        // Hidden but still stored until swept.
        assert_eq!(store.stored_len().await, 2);
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.stored_len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_with_expired_lease_fails() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let err = store.put("/k", b"v".to_vec(), Some(lease)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unrepresentable_lease_ttl_is_rejected() {
        let store = MemoryStore::new();
        let err = store.grant_lease(Duration::from_secs(u64::MAX)).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidLeaseTtl(_)));

        // The failed grant leaves the counter usable.
        assert!(store.grant_lease(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_removes_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        let lease = store.grant_lease(Duration::from_secs(5)).await.unwrap();
        store.put("/k", b"v".to_vec(), Some(lease)).await.unwrap();

        let sweeper = store.clone().spawn_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(store.stored_len().await, 0);
        sweeper.abort();
    }
}
