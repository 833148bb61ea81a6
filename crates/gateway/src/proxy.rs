use crate::error::GatewayError;
use crate::forward::{ForwardRequest, Forwarder};
use crate::selection::SelectionStrategy;
use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use service_registry::{ServiceInstance, ServiceRegistry};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_ATTEMPTS: u16 = 3;

/// Largest request body buffered for forwarding; matches axum's default limit.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Everything a proxied request needs. Cloned into every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: ServiceRegistry,
    pub forwarder: Forwarder,
    pub selector: Arc<dyn SelectionStrategy>,
    pub attempts: usize,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(
        registry: ServiceRegistry,
        forwarder: Forwarder,
        selector: Arc<dyn SelectionStrategy>,
        attempts: usize,
    ) -> Self {
        Self {
            registry,
            forwarder,
            selector,
            attempts: attempts.max(1),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Route request to an available instance of `service`
    ///
    /// Discovery happens on every call. Attempts walk the strategy's order,
    /// wrapping around when there are more attempts than instances. Only
    /// transport failures move on to the next attempt.
    pub async fn route(
        &self,
        service: &str,
        request: ForwardRequest,
    ) -> Result<Response<Body>, GatewayError> {
        let instances = match self.registry.discover(service).await {
            Ok(instances) => instances,
            Err(e) => {
                error!(service, error = %e, "Service discovery failed");
                Vec::new()
            }
        };

        if instances.is_empty() {
            warn!("No services available for {}", service);
            return Err(GatewayError::NoInstancesAvailable {
                service: service.to_string(),
            });
        }

        let order = self.selector.order(service, &instances);
        let candidates = order
            .iter()
            .filter_map(|index| instances.get(*index))
            .cycle()
            .take(self.attempts);

        for (attempt, instance) in candidates.enumerate() {
            info!(
                service,
                attempt = attempt + 1,
                target = %instance.base_url(),
                "Routing request to {}/{}",
                instance.base_url(),
                request.path
            );

            match self.forwarder.forward(instance, &request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(service, attempt = attempt + 1, error = %e, "Service request failed");
                }
            }
        }

        error!(service, attempts = self.attempts, "All service instances failed");

        Err(GatewayError::AllInstancesExhausted {
            service: service.to_string(),
            available_services: instances.iter().map(ServiceInstance::service_key).collect(),
        })
    }
}

/// Axum entry point for every proxied route of `service`.
pub async fn handle(state: GatewayState, service: &str, request: ForwardRequest) -> Response<Body> {
    match state.route(service, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
