use crate::forward::DEFAULT_ATTEMPT_TIMEOUT;
use crate::proxy::{DEFAULT_ATTEMPTS, DEFAULT_MAX_BODY_BYTES};
use crate::selection::SelectionKind;
use clap::{Parser, ValueEnum};
use service_registry::DEFAULT_LEASE_TTL;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Paths owned by the registration API; a service cannot use them as a prefix.
const RESERVED_PREFIXES: [&str; 4] = ["register", "unregister", "services", "health"];

/// One year; longer leases are indistinguishable from permanent keys.
const MAX_LEASE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// etcd cluster given by --etcd-endpoints
    Etcd,
    /// In-process store, lost on restart
    Memory,
}

/// A registration made at startup, written as `name=host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl FromStr for Seed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, address) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=host:port, got {:?}", s))?;
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {:?}", address))?;
        let port = port
            .parse()
            .map_err(|e| format!("invalid port {:?}: {}", port, e))?;

        Ok(Seed {
            name: name.trim().to_string(),
            host: host.trim().to_string(),
            port,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no services configured")]
    NoServices,

    #[error("invalid service name: {0:?}")]
    InvalidServiceName(String),

    #[error("service name {0:?} collides with a registration API path")]
    ReservedServiceName(String),

    #[error("service {0:?} configured more than once")]
    DuplicateService(String),
}

#[derive(Debug, Clone, Parser)]
#[command(name = "gateway")]
#[command(about = "API gateway with etcd-backed service discovery", long_about = None)]
pub struct GatewayConfig {
    /// Address to listen on
    #[arg(long, env = "API_GATEWAY_ADDR", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Registry backend
    #[arg(long, env = "REGISTRY_STORE", value_enum, default_value = "etcd")]
    pub store: StoreKind,

    /// etcd endpoints
    #[arg(long, env = "ETCD_ENDPOINTS", value_delimiter = ',', default_value = "localhost:2379")]
    pub etcd_endpoints: Vec<String>,

    /// Logical services, each proxied under /{name}/
    #[arg(
        long,
        env = "GATEWAY_SERVICES",
        value_delimiter = ',',
        default_value = "users,movies,showtimes,bookings"
    )]
    pub services: Vec<String>,

    /// Lease TTL for registrations, in seconds
    #[arg(
        long,
        env = "LEASE_TTL_SECS",
        default_value_t = DEFAULT_LEASE_TTL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..=MAX_LEASE_TTL_SECS)
    )]
    pub lease_ttl_secs: u64,

    /// Forwarding attempts per request
    #[arg(
        long,
        env = "FORWARD_ATTEMPTS",
        default_value_t = DEFAULT_ATTEMPTS,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub attempts: u16,

    /// Per-attempt timeout, in seconds
    #[arg(long, env = "FORWARD_TIMEOUT_SECS", default_value_t = DEFAULT_ATTEMPT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Largest request body accepted for forwarding, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Instance selection strategy
    #[arg(long, env = "SELECTION_STRATEGY", value_enum, default_value = "round-robin")]
    pub selection: SelectionKind,

    /// Instances to register at startup (name=host:port)
    #[arg(long = "seed", env = "GATEWAY_SEEDS", value_delimiter = ',')]
    pub seeds: Vec<Seed>,
}

impl GatewayConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs.max(1))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.is_empty() || service.contains('/') || service.contains('{') {
                return Err(ConfigError::InvalidServiceName(service.clone()));
            }
            if RESERVED_PREFIXES.contains(&service.as_str()) {
                return Err(ConfigError::ReservedServiceName(service.clone()));
            }
            if !seen.insert(service.as_str()) {
                return Err(ConfigError::DuplicateService(service.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GatewayConfig {
        GatewayConfig::try_parse_from(std::iter::once("gateway").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.services, vec!["users", "movies", "showtimes", "bookings"]);
        assert_eq!(config.lease_ttl(), Duration::from_secs(60));
        assert_eq!(config.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.attempts, 3);
        assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.selection, SelectionKind::RoundRobin);
        assert_eq!(config.store, StoreKind::Etcd);
        assert!(config.seeds.is_empty());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_lists_and_seeds() {
        let config = parse(&[
            "--services",
            "movies,showtimes",
            "--etcd-endpoints",
            "etcd-1:2379,etcd-2:2379",
            "--seed",
            "movies=localhost:5001,showtimes=showtime:5002",
            "--selection",
            "random",
            "--store",
            "memory",
        ]);

        assert_eq!(config.services, vec!["movies", "showtimes"]);
        assert_eq!(config.etcd_endpoints.len(), 2);
        assert_eq!(
            config.seeds,
            vec![
                Seed { name: "movies".into(), host: "localhost".into(), port: 5001 },
                Seed { name: "showtimes".into(), host: "showtime".into(), port: 5002 },
            ]
        );
        assert_eq!(config.selection, SelectionKind::Random);
        assert_eq!(config.store, StoreKind::Memory);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(GatewayConfig::try_parse_from(["gateway", "--attempts", "0"]).is_err());
    }

    #[test]
    fn test_lease_ttl_bounds() {
        assert!(GatewayConfig::try_parse_from(["gateway", "--lease-ttl-secs", "0"]).is_err());
        assert!(GatewayConfig::try_parse_from([
            "gateway",
            "--lease-ttl-secs",
            "18446744073709551615"
        ])
        .is_err());

        let config = parse(&["--lease-ttl-secs", "31536000"]);
        assert_eq!(config.lease_ttl(), Duration::from_secs(31_536_000));
    }

    #[test]
    fn test_max_body_bytes_override() {
        let config = parse(&["--max-body-bytes", "1024"]);
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_seed_parsing_errors() {
        assert!("movies".parse::<Seed>().is_err());
        assert!("movies=localhost".parse::<Seed>().is_err());
        assert!("movies=localhost:http".parse::<Seed>().is_err());
    }

    #[test]
    fn test_validate_rejects_conflicting_services() {
        let config = parse(&["--services", "movies,services"]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReservedServiceName("services".into()))
        );

        let config = parse(&["--services", "movies,movies"]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateService("movies".into()))
        );

        let config = parse(&["--services", "a/b"]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidServiceName("a/b".into()))
        );
    }
}
