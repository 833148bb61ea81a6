use crate::api::{RegisterRequest, UnregisterRequest};
use crate::{Metadata, MetadataValue};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Client-side helper that keeps one instance registered with a gateway.
///
/// The registry never refreshes leases on its own; whoever runs the backend
/// calls [`Registrar::register`] once and then [`Registrar::spawn_refresh`]
/// with an interval shorter than the registry's lease TTL.
#[derive(Debug, Clone)]
pub struct Registrar {
    gateway_url: Url,
    request: RegisterRequest,
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Registrar {
    pub fn new(gateway_url: &str, request: RegisterRequest) -> Result<Self> {
        let gateway_url = Url::parse(gateway_url)
            .with_context(|| format!("Invalid gateway URL: {}", gateway_url))?;

        Ok(Self {
            gateway_url,
            request,
            client: reqwest::Client::new(),
            max_attempts: 30,
            retry_delay: Duration::from_secs(2),
        })
    }

    /// Registrar for `name` on this machine's hostname.
    pub fn for_local_host(gateway_url: &str, name: impl Into<String>, port: u16) -> Result<Self> {
        let host = hostname::get()
            .unwrap_or_else(|_| std::ffi::OsString::from("localhost"))
            .to_string_lossy()
            .to_string();

        Self::new(
            gateway_url,
            RegisterRequest {
                name: name.into(),
                host,
                port,
                metadata: Metadata::new(),
            },
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.request.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn request(&self) -> &RegisterRequest {
        &self.request
    }

    /// Register, retrying with a fixed delay until an attempt succeeds or
    /// `max_attempts` is reached.
    pub async fn register(&self) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;

            match self.register_once().await {
                Ok(()) => {
                    tracing::info!(
                        "Service {} registered at {}:{}",
                        self.request.name,
                        self.request.host,
                        self.request.port
                    );
                    return Ok(());
                }
                Err(e) if attempts >= self.max_attempts => {
                    return Err(e.context(format!(
                        "Failed to register service after {} attempts",
                        attempts
                    )));
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to register service (attempt {}/{}): {:#}",
                        attempts,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    pub async fn unregister(&self) -> Result<()> {
        let request = UnregisterRequest {
            name: self.request.name.clone(),
            host: self.request.host.clone(),
            port: self.request.port,
        };

        let response = self
            .client
            .post(self.endpoint("unregister")?)
            .json(&request)
            .send()
            .await
            .context("Failed to send unregister request")?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Failed to unregister service: {}", error_text);
        }

        Ok(())
    }

    /// Re-register every `interval` until the returned task is aborted.
    pub fn spawn_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let registrar = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = registrar.register_once().await {
                    tracing::error!(
                        "Failed to refresh registration of {}: {:#}",
                        registrar.request.name,
                        e
                    );
                }
            }
        })
    }

    async fn register_once(&self) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("register")?)
            .json(&self.request)
            .send()
            .await
            .context("Failed to send register request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Gateway rejected registration ({}): {}", status, error_text);
        }

        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.gateway_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }
}
