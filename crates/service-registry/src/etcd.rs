use crate::error::{RegistryError, Result};
use crate::store::{KeyValue, KvStore, LeaseId};
use async_trait::async_trait;
use etcd_client::{Client, GetOptions, PutOptions};
use std::time::Duration;
use tracing::{debug, info};

/// [`KvStore`] backed by an etcd cluster. Expiry is left to etcd leases.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to etcd
    ///
    /// # Arguments
    /// * `endpoints` - List of etcd endpoints (e.g., ["localhost:2379"])
    pub async fn connect(endpoints: Vec<String>) -> Result<Self> {
        info!("Connecting to etcd at endpoints: {:?}", endpoints);

        let client = Client::connect(endpoints, None).await?;

        Ok(Self { client })
    }
}

// etcd_client::Client is a cheap handle over a shared channel; each call works
// on its own clone so the store can be used through `&self`.
#[async_trait]
impl KvStore for EtcdStore {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let mut client = self.client.clone();
        let ttl = i64::try_from(ttl.as_secs().max(1))
            .map_err(|_| RegistryError::InvalidLeaseTtl(ttl))?;

        let lease = client.lease_grant(ttl, None).await?;
        debug!("Granted lease {} with TTL {} seconds", lease.id(), ttl);

        Ok(lease.id())
    }

    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> Result<()> {
        let mut client = self.client.clone();
        let options = lease.map(|id| PutOptions::new().with_lease(id));

        client.put(key, value, options).await?;

        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let mut client = self.client.clone();

        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        resp.kvs()
            .iter()
            .map(|kv| {
                Ok(KeyValue {
                    key: kv.key_str()?.to_string(),
                    value: kv.value().to_vec(),
                })
            })
            .collect()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();

        client.delete(key, None).await?;

        Ok(())
    }
}
