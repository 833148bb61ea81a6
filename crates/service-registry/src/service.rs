use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Root of the registry key space.
pub const SERVICES_PREFIX: &str = "/services/";

/// A caller-supplied metadata value. The registry stores these verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value.into())
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Number(value.into())
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// One registered backend endpoint, as stored under its instance key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: Metadata,
    /// Seconds since the Unix epoch at which the record was written.
    #[serde(default)]
    pub last_heartbeat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<i64>,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            metadata: Metadata::new(),
            last_heartbeat: unix_now(),
            lease_id: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_lease(mut self, lease_id: i64) -> Self {
        self.lease_id = Some(lease_id);
        self
    }

    pub fn service_key(&self) -> String {
        instance_key(&self.name, &self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// `/services/{name}/{host}:{port}`
pub fn instance_key(name: &str, host: &str, port: u16) -> String {
    format!("{}{}/{}:{}", SERVICES_PREFIX, name, host, port)
}

/// Prefix covering every instance of `name` and nothing else.
pub fn service_prefix(name: &str) -> String {
    format!("{}{}/", SERVICES_PREFIX, name)
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_key_layout() {
        let instance = ServiceInstance::new("movies", "10.0.0.7", 5001);
        assert_eq!(instance.service_key(), "/services/movies/10.0.0.7:5001");
        assert_eq!(instance.base_url(), "http://10.0.0.7:5001");
        assert!(instance.service_key().starts_with(&service_prefix("movies")));
    }

    #[test]
    fn test_wire_format() {
        let instance = ServiceInstance::new("users", "localhost", 5000)
            .with_metadata("zone", "eu-west")
            .with_metadata("weight", 3i64)
            .with_metadata("canary", false);

        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["name"], "users");
        assert_eq!(value["host"], "localhost");
        assert_eq!(value["port"], 5000);
        assert_eq!(value["metadata"]["zone"], "eu-west");
        assert_eq!(value["metadata"]["weight"], 3);
        assert_eq!(value["metadata"]["canary"], false);
        assert!(value["last_heartbeat"].as_f64().unwrap() > 0.0);
        assert!(value.get("lease_id").is_none());
    }

    #[test]
    fn test_decodes_record_without_optional_fields() {
        let json = r#"{"name":"bookings","host":"bookings","port":5003,"last_heartbeat":1700000000.5}"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.name, "bookings");
        assert!(instance.metadata.is_empty());
        assert_eq!(instance.lease_id, None);
    }

    #[test]
    fn test_rejects_nested_metadata() {
        let json = r#"{"name":"a","host":"h","port":1,"metadata":{"nested":{"x":1}}}"#;
        assert!(serde_json::from_str::<ServiceInstance>(json).is_err());
    }
}
