use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Metadata, RegistryError, ServiceInstance, ServiceRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Registration API routes, ready to be merged into a larger router.
pub fn router(registry: ServiceRegistry) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/services", get(list_services))
        .route("/services/{name}", get(get_services_by_name))
        .route("/health", get(|| async { "OK" }))
        .with_state(registry)
}

pub async fn register(
    State(registry): State<ServiceRegistry>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), RegistryError> {
    match registry
        .register(&req.name, &req.host, req.port, req.metadata)
        .await
    {
        Ok(_) => Ok((
            StatusCode::CREATED,
            StatusResponse::new("Service registered successfully"),
        )),
        Err(e) => {
            tracing::error!("Failed to register service {}: {}", req.name, e);
            Err(e)
        }
    }
}

pub async fn unregister(
    State(registry): State<ServiceRegistry>,
    Json(req): Json<UnregisterRequest>,
) -> Result<Json<StatusResponse>, RegistryError> {
    match registry.deregister(&req.name, &req.host, req.port).await {
        Ok(()) => Ok(StatusResponse::new("Service unregistered successfully")),
        Err(e) => {
            tracing::error!("Failed to deregister service {}: {}", req.name, e);
            Err(e)
        }
    }
}

pub async fn list_services(
    State(registry): State<ServiceRegistry>,
) -> Result<Json<BTreeMap<String, ServiceInstance>>, RegistryError> {
    match registry.list_all().await {
        Ok(services) => Ok(Json(services)),
        Err(e) => {
            tracing::error!("Failed to list services: {}", e);
            Err(e)
        }
    }
}

pub async fn get_services_by_name(
    State(registry): State<ServiceRegistry>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ServiceInstance>>, RegistryError> {
    match registry.discover(&name).await {
        Ok(services) => Ok(Json(services)),
        Err(e) => {
            tracing::error!("Failed to get services by name {}: {}", name, e);
            Err(e)
        }
    }
}
