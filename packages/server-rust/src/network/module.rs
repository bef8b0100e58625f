//! HTTP server with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections. Between `start()` and `serve()` the host
//! installs the multitenant container into the shared slot; requests
//! arriving while the slot is empty are answered `500`.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tenantscope_core::{Container, MultitenantContainerSlot};
use tokio::net::TcpListener;
use tracing::info;

use super::config::{NetworkConfig, TenancyConfig};
use super::middleware::with_http_layers;
use crate::app;

/// Serves the multitenant application.
pub struct TenantServer {
    config: NetworkConfig,
    tenancy: TenancyConfig,
    root: Arc<Container>,
    slot: Arc<MultitenantContainerSlot>,
    listener: Option<TcpListener>,
}

impl TenantServer {
    /// Creates the server without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, root: Arc<Container>) -> Self {
        Self {
            config,
            tenancy: TenancyConfig::default(),
            root,
            slot: Arc::new(MultitenantContainerSlot::new()),
            listener: None,
        }
    }

    /// Tenancy settings the transport layers must know about, such as the
    /// tenant header browsers are allowed to send.
    #[must_use]
    pub fn with_tenancy(mut self, tenancy: TenancyConfig) -> Self {
        self.tenancy = tenancy;
        self
    }

    /// Slot the multitenant container is read from on every request.
    #[must_use]
    pub fn multitenant_slot(&self) -> Arc<MultitenantContainerSlot> {
        Arc::clone(&self.slot)
    }

    /// Application routes wrapped in the transport middleware.
    pub fn build_router(&self) -> Router {
        with_http_layers(
            app::router(Arc::clone(&self.root), &self.slot),
            &self.config,
            &self.tenancy,
        )
    }

    /// Binds the TCP listener and returns the bound port, which differs from
    /// the configured one when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then lets in-flight requests finish
    /// and empties the multitenant slot.
    ///
    /// # Errors
    ///
    /// Fails when `start()` was not called first, or on a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        info!(
            multitenant_ready = self.slot.get().is_some(),
            "serving HTTP connections"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.slot.clear();
        info!("server stopped");
        Ok(())
    }
}
