//! `tenantscope` server: axum/tower middleware that gives every request a
//! service scope from the tenant it belongs to.
//!
//! Layer order, outermost first:
//! 1. [`RequestLifecycleLayer`] owns per-request features and disposal
//! 2. `HandleErrorLayer` with [`handle_request_services_error`]
//! 3. [`MultitenantRequestServicesLayer`] installs the tenant's services

pub mod app;
pub mod context;
pub mod extract;
pub mod feature;
pub mod identification;
pub mod lifecycle;
pub mod middleware;
pub mod network;

pub use context::{AmbientSlot, CurrentRequest, RequestContextAccessor, TaskLocalContextAccessor};
pub use extract::{RequestServices, RequestServicesRejection};
pub use feature::{
    FeatureFactory, RequestServicesFeature, RequestServicesFeatureFactory,
    ServiceProvidersFeature, SharedServiceProviders,
};
pub use identification::{HeaderStrategy, QueryStringStrategy};
pub use lifecycle::{RequestLifecycle, RequestLifecycleLayer};
pub use middleware::{
    handle_request_services_error, MultitenantRequestServicesLayer, RequestServicesError,
};
pub use network::{NetworkConfig, TenancyConfig, TenantServer};
