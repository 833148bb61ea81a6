pub mod api;
pub mod error;
pub mod etcd;
pub mod memory;
pub mod registrar;
pub mod registry;
pub mod service;
pub mod store;

pub use error::{RegistryError, Result};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use registrar::Registrar;
pub use registry::{ServiceRegistry, DEFAULT_LEASE_TTL};
pub use service::{Metadata, MetadataValue, ServiceInstance};
pub use store::{KeyValue, KvStore, LeaseId};
