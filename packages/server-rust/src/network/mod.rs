//! Server configuration, transport middleware, and the HTTP server.

pub mod config;
pub mod middleware;
pub mod module;

pub use config::{NetworkConfig, TenancyConfig};
pub use middleware::with_http_layers;
pub use module::TenantServer;
