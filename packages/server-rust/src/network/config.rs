//! Server configuration types.

use std::time::Duration;

use crate::identification::DEFAULT_TENANT_PARAMETER;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// How requests are mapped to tenants.
#[derive(Debug, Clone)]
pub struct TenancyConfig {
    /// Query-string parameter carrying the tenant id.
    pub query_parameter: String,
    /// When set, the tenant is read from this header instead of the query.
    pub header: Option<String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            query_parameter: DEFAULT_TENANT_PARAMETER.to_string(),
            header: None,
        }
    }
}
