use crate::error::GatewayError;
use crate::forward::ForwardRequest;
use crate::proxy::{self, GatewayState};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const PROXIED_METHODS: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE)
    .or(MethodFilter::PATCH);

/// Build the gateway: one proxied prefix per service plus the registration API.
///
/// `/{svc}`, `/{svc}/` and `/{svc}/{*rest}` all reach the same handler. Request
/// bodies larger than the state's `max_body_bytes` are answered with 413.
pub fn app(state: GatewayState, services: &[String]) -> Router {
    let registration = service_registry::api::router(state.registry.clone());
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    let mut router = Router::new();
    for service in services {
        let name: Arc<str> = Arc::from(service.as_str());
        let handler = move |State(state): State<GatewayState>,
                            method: Method,
                            uri: Uri,
                            headers: HeaderMap,
                            body: Result<Bytes, BytesRejection>| {
            let name = name.clone();
            async move {
                let body = match body {
                    Ok(body) => body,
                    Err(rejection) => return GatewayError::from(rejection).into_response(),
                };
                let request = ForwardRequest::new(&name, method, &uri, headers, body);
                proxy::handle(state, &name, request).await
            }
        };

        router = router
            .route(&format!("/{}", service), on(PROXIED_METHODS, handler.clone()))
            .route(&format!("/{}/", service), on(PROXIED_METHODS, handler.clone()))
            .route(&format!("/{}/{{*rest}}", service), on(PROXIED_METHODS, handler));
    }

    router
        .layer(body_limit)
        .with_state(state)
        .merge(registration)
        .layer(TraceLayer::new_for_http())
}
