use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub type LeaseId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// The slice of a strongly-consistent key-value store the registry relies on.
///
/// Implementations must be safe to share across concurrent request handlers.
/// Any failure to reach the store or commit an operation is reported as
/// [`RegistryError::Unavailable`](crate::RegistryError::Unavailable).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Grant a lease that expires after `ttl` unless refreshed.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId>;

    /// Write `value` under `key`, replacing any previous value and lease.
    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()>;

    /// All live pairs whose key starts with `prefix`, in no particular order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
