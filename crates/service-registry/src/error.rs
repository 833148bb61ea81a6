use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid service data: {0}")]
    InvalidServiceData(String),

    #[error("lease TTL out of range: {0:?}")]
    InvalidLeaseTtl(Duration),
}

impl From<etcd_client::Error> for RegistryError {
    fn from(err: etcd_client::Error) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

impl RegistryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::InvalidServiceData(_) => StatusCode::BAD_REQUEST,
            RegistryError::InvalidLeaseTtl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
