//! Runs the sample multitenant application.

use std::time::Duration;

use clap::Parser;
use tenantscope_server::app::{build_multitenant_container, build_root_container};
use tenantscope_server::{NetworkConfig, TenancyConfig, TenantServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Multitenant request-services demo server.
#[derive(Parser)]
#[command(name = "tenant-server")]
#[command(version)]
struct Cli {
    /// Bind address
    #[arg(long, env = "TENANTSCOPE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port; 0 picks a free port
    #[arg(short, long, env = "TENANTSCOPE_PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origin, repeatable
    #[arg(
        long = "cors-origin",
        env = "TENANTSCOPE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    cors_origins: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, env = "TENANTSCOPE_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Query-string parameter naming the tenant
    #[arg(long, env = "TENANTSCOPE_TENANT_PARAMETER", default_value = "tenant")]
    tenant_parameter: String,

    /// Read the tenant from this header instead of the query string
    #[arg(long, env = "TENANTSCOPE_TENANT_HEADER")]
    tenant_header: Option<String>,

    /// Log level when `RUST_LOG` is unset
    #[arg(long, env = "TENANTSCOPE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "TENANTSCOPE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let network = NetworkConfig {
        host: cli.host,
        port: cli.port,
        cors_origins: cli.cors_origins,
        request_timeout: Duration::from_secs(cli.request_timeout),
    };
    let tenancy = TenancyConfig {
        query_parameter: cli.tenant_parameter,
        header: cli.tenant_header,
    };

    let root = build_root_container();
    let mut server = TenantServer::new(network, root.clone()).with_tenancy(tenancy.clone());
    let port = server.start().await?;

    server
        .multitenant_slot()
        .install(build_multitenant_container(&root, &tenancy)?);
    info!(port, "tenant server ready");

    server
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await
}
