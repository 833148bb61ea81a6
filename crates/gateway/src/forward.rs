use crate::path::{strip_service_prefix, target_url};
use axum::body::{Body, Bytes};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, Method, Response, Uri};
use service_registry::ServiceInstance;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// A request as the gateway forwards it, independent of any backend schema.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Backend path, without the leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    /// Bundle an inbound request addressed to `service`.
    pub fn new(service: &str, method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path: strip_service_prefix(uri.path(), service).to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body,
        }
    }
}

/// Transport-level failure of a single attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// HTTP client for forwarding requests to service instances
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // Redirects belong to the caller, so they are passed back untouched.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, timeout })
    }

    /// Send `request` to `instance` and buffer the reply.
    ///
    /// Any response the backend produces is a success here, whatever its
    /// status. Only connection errors and the per-attempt timeout fail.
    pub async fn forward(
        &self,
        instance: &ServiceInstance,
        request: &ForwardRequest,
    ) -> Result<Response<Body>, ForwardError> {
        let url = target_url(&instance.base_url(), &request.path, request.query.as_deref());

        debug!("Forwarding {} {}", request.method, url);

        let outbound = self
            .client
            .request(request.method.clone(), &url)
            .headers(outbound_headers(&request.headers))
            .body(request.body.clone());

        let attempt = async {
            let response = outbound.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, headers, body) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(source)) => return Err(ForwardError::Transport { url, source }),
            Err(_) => {
                return Err(ForwardError::Timeout {
                    url,
                    timeout: self.timeout,
                })
            }
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        let response_headers = response.headers_mut();
        for (name, value) in headers.iter() {
            if !is_connection_header(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        Ok(response)
    }
}

// The body is re-framed for the client connection.
fn is_connection_header(name: &HeaderName) -> bool {
    *name == TRANSFER_ENCODING || *name == CONNECTION
}

const HOP_BY_HOP: [&str; 5] = ["keep-alive", "proxy-connection", "te", "trailer", "upgrade"];

/// Inbound headers minus `Host`, `Content-Length`, hop-by-hop headers and any
/// header the client listed in `Connection`. The client sets its own.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = inbound
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    inbound
        .iter()
        .filter(|(name, _)| {
            **name != HOST
                && **name != CONTENT_LENGTH
                && !is_connection_header(name)
                && !HOP_BY_HOP.contains(&name.as_str())
                && !listed.iter().any(|token| token == name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
