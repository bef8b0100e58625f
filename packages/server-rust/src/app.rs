//! Sample multitenant application: a root container with a base
//! dependency and two tenants overriding it.

use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tenantscope_core::{
    Container, ContainerError, MultitenantContainer, MultitenantContainerSlot, ServiceScope,
    TenantId, TenantIdentificationStrategy,
};
use tower::ServiceBuilder;
use tracing::info;

use crate::context::TaskLocalContextAccessor;
use crate::extract::RequestServices;
use crate::identification::{HeaderStrategy, QueryStringStrategy};
use crate::lifecycle::RequestLifecycleLayer;
use crate::middleware::{handle_request_services_error, MultitenantRequestServicesLayer};
use crate::network::TenancyConfig;

/// Tenants configured by [`build_multitenant_container`].
pub const TENANTS: [&str; 2] = ["a", "b"];

/// Answers the endpoints: `"base"` from the root, the tenant id otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
}

/// Only registered in tenant containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantMarker;

#[must_use]
pub fn build_root_container() -> Arc<Container> {
    let mut builder = Container::builder();
    builder.register_scoped(|_| {
        Ok(Dependency {
            name: "base".to_string(),
        })
    });
    builder.build()
}

/// # Errors
///
/// Propagates [`ContainerError::TenantAlreadyConfigured`].
pub fn build_multitenant_container(
    root: &Arc<Container>,
    config: &TenancyConfig,
) -> Result<Arc<MultitenantContainer>, ContainerError> {
    let strategy: Arc<dyn TenantIdentificationStrategy> = match &config.header {
        Some(header) => Arc::new(HeaderStrategy::new(TaskLocalContextAccessor, header.clone())),
        None => Arc::new(QueryStringStrategy::with_parameter(
            TaskLocalContextAccessor,
            config.query_parameter.clone(),
        )),
    };

    let multitenant = MultitenantContainer::new(strategy, Arc::clone(root));
    for tenant in TENANTS {
        multitenant.configure_tenant(TenantId::new(tenant), |builder| {
            builder.register_scoped(move |_| {
                Ok(Dependency {
                    name: tenant.to_string(),
                })
            });
            builder.register_instance(TenantMarker);
        })?;
    }
    info!(tenants = ?multitenant.tenant_ids(), "multitenant container configured");
    Ok(Arc::new(multitenant))
}

/// The application router with the request-services stack applied.
///
/// Requests start with root services installed; the multitenant layer then
/// replaces them with the identified tenant's services.
pub fn router(root: Arc<Container>, slot: &Arc<MultitenantContainerSlot>) -> Router {
    let services = ServiceBuilder::new()
        .layer(RequestLifecycleLayer::new().with_default_services(Arc::clone(&root)))
        .layer(HandleErrorLayer::new(handle_request_services_error))
        .layer(MultitenantRequestServicesLayer::from_slot(root, slot));

    Router::new()
        .route("/root-endpoint", get(dependency_name))
        .route("/tenant-endpoint", get(tenant_dependency_name))
        .route("/supports-with-and-without-tenant", get(dependency_name))
        .layer(services)
}

async fn dependency_name(RequestServices(scope): RequestServices) -> Response {
    resolve_name(&scope)
}

async fn tenant_dependency_name(RequestServices(scope): RequestServices) -> Response {
    if scope.try_resolve::<TenantMarker>().is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    resolve_name(&scope)
}

fn resolve_name(scope: &ServiceScope) -> Response {
    match scope.resolve::<Dependency>() {
        Ok(dependency) => dependency.name.clone().into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let root = build_root_container();
        let slot = Arc::new(MultitenantContainerSlot::new());
        slot.install(build_multitenant_container(&root, &TenancyConfig::default()).unwrap());
        router(root, &slot)
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_endpoint_answers_base() {
        assert_eq!(
            call(app(), "/root-endpoint").await,
            (StatusCode::OK, "base".to_string())
        );
    }

    #[tokio::test]
    async fn tenant_endpoint_answers_each_tenant() {
        for tenant in TENANTS {
            let (status, body) = call(app(), &format!("/tenant-endpoint?tenant={tenant}")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, tenant);
        }
    }

    #[tokio::test]
    async fn tenant_endpoint_rejects_unknown_tenant() {
        let (status, _) = call(app(), "/tenant-endpoint?tenant=tenant-does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generic_endpoint_falls_back_to_base() {
        for (tenant, expected) in [("", "base"), ("wrong-tenant", "base"), ("a", "a"), ("b", "b")] {
            let (status, body) =
                call(app(), &format!("/supports-with-and-without-tenant?tenant={tenant}")).await;
            assert_eq!(status, StatusCode::OK, "tenant {tenant:?}");
            assert_eq!(body, expected, "tenant {tenant:?}");
        }
    }

    #[tokio::test]
    async fn header_strategy_selects_tenant() {
        let root = build_root_container();
        let config = TenancyConfig {
            header: Some("x-tenant-id".to_string()),
            ..TenancyConfig::default()
        };
        let slot = Arc::new(MultitenantContainerSlot::new());
        slot.install(build_multitenant_container(&root, &config).unwrap());

        let response = router(root, &slot)
            .oneshot(
                Request::get("/tenant-endpoint?tenant=a")
                    .header("x-tenant-id", "b")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"b");
    }

    #[tokio::test]
    async fn empty_slot_answers_500() {
        let root = build_root_container();
        let slot = Arc::new(MultitenantContainerSlot::new());
        let (status, body) = call(router(root, &slot), "/root-endpoint").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("no multitenant container"));
    }

    #[test]
    fn duplicate_tenants_are_rejected() {
        let root = build_root_container();
        let multitenant = build_multitenant_container(&root, &TenancyConfig::default()).unwrap();
        let err = multitenant
            .configure_tenant(TenantId::new("a"), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            ContainerError::TenantAlreadyConfigured {
                tenant: TenantId::new("a")
            }
        );
    }
}
