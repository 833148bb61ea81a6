use crate::error::{RegistryError, Result};
use crate::etcd::EtcdStore;
use crate::service::{instance_key, service_prefix, Metadata, ServiceInstance, SERVICES_PREFIX};
use crate::store::KvStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);

/// ServiceRegistry maps logical service names to their live instances on top
/// of a [`KvStore`].
///
/// It keeps no state of its own: every call goes to the store, so cloning the
/// registry and sharing it across request handlers is cheap and safe.
#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn KvStore>,
    lease_ttl: Duration,
}

impl ServiceRegistry {
    /// Create a registry over an existing store
    ///
    /// # Arguments
    /// * `store` - Backing key-value store
    /// * `lease_ttl` - Time-to-live for registrations (default: 60 seconds)
    pub fn new(store: Arc<dyn KvStore>, lease_ttl: Option<Duration>) -> Self {
        Self {
            store,
            lease_ttl: lease_ttl.unwrap_or(DEFAULT_LEASE_TTL),
        }
    }

    /// Create a registry backed by etcd
    pub async fn connect(endpoints: Vec<String>, lease_ttl: Option<Duration>) -> Result<Self> {
        let store = EtcdStore::connect(endpoints).await?;
        Ok(Self::new(Arc::new(store), lease_ttl))
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Register an instance under a fresh lease
    ///
    /// Registering the same `(name, host, port)` again replaces the record and
    /// its lease, so this doubles as the refresh operation.
    pub async fn register(
        &self,
        name: &str,
        host: &str,
        port: u16,
        metadata: Metadata,
    ) -> Result<ServiceInstance> {
        validate_identity(name, host)?;

        let lease_id = self.store.grant_lease(self.lease_ttl).await?;
        let mut instance = ServiceInstance::new(name, host, port).with_lease(lease_id);
        instance.metadata = metadata;

        let key = instance.service_key();
        let value = serde_json::to_vec(&instance)?;

        debug!("Registering service at key: {} with lease {}", key, lease_id);

        self.store.put(&key, value, Some(lease_id)).await?;

        info!("Registered service: {} at {}:{}", name, host, port);

        Ok(instance)
    }

    /// Get all live instances of a service by name
    ///
    /// An empty result means no instance is currently registered; store
    /// failures are reported as errors instead.
    pub async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let services: Vec<ServiceInstance> = self
            .scan(&service_prefix(name))
            .await?
            .into_iter()
            .map(|(_, instance)| instance)
            .collect();

        if services.is_empty() {
            warn!("No instances found for service: {}", name);
        } else {
            debug!("Found {} instances of service {}", services.len(), name);
        }

        Ok(services)
    }

    /// Remove an instance. Removing an unknown instance is not an error.
    pub async fn deregister(&self, name: &str, host: &str, port: u16) -> Result<()> {
        let key = instance_key(name, host, port);

        debug!("Deregistering service at key: {}", key);

        self.store.delete(&key).await?;

        info!("Deregistered service: {} at {}:{}", name, host, port);

        Ok(())
    }

    /// Every registered instance, keyed by its registry key
    pub async fn list_all(&self) -> Result<BTreeMap<String, ServiceInstance>> {
        let services: BTreeMap<_, _> = self.scan(SERVICES_PREFIX).await?.into_iter().collect();

        info!("Found {} total registered services", services.len());

        Ok(services)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, ServiceInstance)>> {
        let pairs = self.store.get_prefix(prefix).await?;

        let mut services = Vec::with_capacity(pairs.len());
        for kv in pairs {
            match serde_json::from_slice(&kv.value) {
                Ok(service) => services.push((kv.key, service)),
                Err(e) => {
                    warn!("Failed to deserialize service at {}: {}", kv.key, e);
                    continue;
                }
            }
        }

        Ok(services)
    }
}

fn validate_identity(name: &str, host: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(RegistryError::InvalidServiceData(format!(
            "service name must be a non-empty path segment: {:?}",
            name
        )));
    }
    if host.is_empty() || host.contains('/') {
        return Err(RegistryError::InvalidServiceData(format!(
            "host must be non-empty and contain no '/': {:?}",
            host
        )));
    }
    Ok(())
}
