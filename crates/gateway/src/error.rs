use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures visible to proxy clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No {service} services available")]
    NoInstancesAvailable { service: String },

    #[error("All {service} service instances are unavailable")]
    AllInstancesExhausted {
        service: String,
        available_services: Vec<String>,
    },

    /// The inbound body could not be buffered, including when it exceeds the
    /// configured limit.
    #[error("{0}")]
    InvalidBody(#[from] BytesRejection),
}

/// JSON body of every gateway-generated failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
    pub available_services: Vec<String>,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoInstancesAvailable { .. }
            | GatewayError::AllInstancesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidBody(rejection) => rejection.status(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let available_services = match self {
            GatewayError::AllInstancesExhausted {
                available_services, ..
            } => available_services.clone(),
            _ => Vec::new(),
        };

        ErrorEnvelope {
            status: "error".to_string(),
            message: self.to_string(),
            available_services,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_instances_envelope() {
        let err = GatewayError::NoInstancesAvailable {
            service: "movies".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            serde_json::to_value(err.envelope()).unwrap(),
            serde_json::json!({
                "status": "error",
                "message": "No movies services available",
                "available_services": []
            })
        );
    }

    #[test]
    fn test_exhausted_envelope_lists_keys() {
        let err = GatewayError::AllInstancesExhausted {
            service: "users".to_string(),
            available_services: vec!["/services/users/a:1".to_string()],
        };
        let envelope = err.envelope();
        assert_eq!(envelope.message, "All users service instances are unavailable");
        assert_eq!(envelope.available_services, vec!["/services/users/a:1"]);
    }
}
