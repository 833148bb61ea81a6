pub mod app;
pub mod config;
pub mod error;
pub mod forward;
pub mod path;
pub mod proxy;
pub mod selection;

pub use app::app;
pub use config::GatewayConfig;
pub use error::{ErrorEnvelope, GatewayError};
pub use forward::{ForwardError, ForwardRequest, Forwarder};
pub use proxy::GatewayState;
pub use selection::{RandomOrder, RoundRobin, SelectionKind, SelectionStrategy};
