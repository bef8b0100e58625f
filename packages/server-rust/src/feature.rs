//! The request-services feature: how downstream code reaches the
//! per-request service scope.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tenantscope_core::{ContainerError, Disposable, ServiceScope, ServiceScopeFactory, TenantId};

use crate::lifecycle::RequestLifecycle;

/// Capability giving access to the services of the current request.
pub trait ServiceProvidersFeature: Send + Sync {
    /// The scope downstream code should resolve request services from.
    ///
    /// # Errors
    ///
    /// `ScopeDisposed` once the request has completed.
    fn request_services(&self) -> Result<Arc<ServiceScope>, ContainerError>;

    /// Tenant whose container backs this feature; `None` for the root.
    fn tenant_id(&self) -> Option<&TenantId> {
        None
    }

    /// The feature as a disposable resource, when it owns one.
    fn as_disposable(self: Arc<Self>) -> Option<Arc<dyn Disposable>> {
        None
    }
}

/// Feature-set entry type for the installed [`ServiceProvidersFeature`].
pub type SharedServiceProviders = Arc<dyn ServiceProvidersFeature>;

// ---------------------------------------------------------------------------
// RequestServicesFeature
// ---------------------------------------------------------------------------

/// Default feature: creates its scope lazily from a scope factory on first
/// access and disposes it with the request.
///
/// Creation and disposal are serialized, so a scope is never created after
/// the feature has been disposed.
pub struct RequestServicesFeature {
    factory: ServiceScopeFactory,
    state: Mutex<ScopeState>,
}

enum ScopeState {
    Pending,
    Created(Arc<ServiceScope>),
    Disposed { created: bool },
}

impl RequestServicesFeature {
    #[must_use]
    pub fn new(factory: ServiceScopeFactory) -> Self {
        Self {
            factory,
            state: Mutex::new(ScopeState::Pending),
        }
    }

    /// Whether the scope has been created yet.
    #[must_use]
    pub fn is_scope_created(&self) -> bool {
        matches!(
            *self.state.lock(),
            ScopeState::Created(_) | ScopeState::Disposed { created: true }
        )
    }

    fn is_disposed(&self) -> bool {
        matches!(*self.state.lock(), ScopeState::Disposed { .. })
    }
}

impl ServiceProvidersFeature for RequestServicesFeature {
    fn request_services(&self) -> Result<Arc<ServiceScope>, ContainerError> {
        let mut state = self.state.lock();
        match &*state {
            ScopeState::Created(scope) => return Ok(Arc::clone(scope)),
            ScopeState::Disposed { .. } => return Err(ContainerError::ScopeDisposed),
            ScopeState::Pending => {}
        }
        let scope = Arc::new(self.factory.create_scope());
        *state = ScopeState::Created(Arc::clone(&scope));
        Ok(scope)
    }

    fn tenant_id(&self) -> Option<&TenantId> {
        self.factory.tenant_id()
    }

    fn as_disposable(self: Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(self)
    }
}

impl Disposable for RequestServicesFeature {
    fn dispose(&self) {
        let scope = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ScopeState::Disposed { created: false }) {
                ScopeState::Pending => None,
                ScopeState::Created(scope) => {
                    *state = ScopeState::Disposed { created: true };
                    Some(scope)
                }
                disposed @ ScopeState::Disposed { .. } => {
                    *state = disposed;
                    None
                }
            }
        };
        // Released outside the lock.
        if let Some(scope) = scope {
            scope.dispose();
        }
    }
}

impl fmt::Debug for RequestServicesFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestServicesFeature")
            .field("tenant", &self.factory.tenant_id())
            .field("scope_created", &self.is_scope_created())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FeatureFactory
// ---------------------------------------------------------------------------

/// Builds the request-services feature for one request.
///
/// Receives a scope factory that is already bound to the request's tenant;
/// implementations must not identify the tenant themselves.
pub trait FeatureFactory: Send + Sync {
    fn create_feature(
        &self,
        lifecycle: &RequestLifecycle,
        scope_factory: ServiceScopeFactory,
    ) -> SharedServiceProviders;
}

/// Produces [`RequestServicesFeature`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestServicesFeatureFactory;

impl FeatureFactory for RequestServicesFeatureFactory {
    fn create_feature(
        &self,
        _lifecycle: &RequestLifecycle,
        scope_factory: ServiceScopeFactory,
    ) -> SharedServiceProviders {
        Arc::new(RequestServicesFeature::new(scope_factory))
    }
}

#[cfg(test)]
mod tests {
    use tenantscope_core::Container;

    use super::*;

    fn factory() -> ServiceScopeFactory {
        let mut builder = Container::builder();
        builder.register_scoped(|_| Ok(String::from("scoped")));
        ServiceScopeFactory::new(builder.build(), Some(TenantId::new("a")))
    }

    #[test]
    fn scope_is_created_lazily_and_reused() {
        let feature = RequestServicesFeature::new(factory());
        assert!(!feature.is_scope_created());

        let first = feature.request_services().unwrap();
        let second = feature.request_services().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first.resolve::<String>().unwrap(), "scoped");
        assert_eq!(feature.tenant_id().map(TenantId::as_str), Some("a"));
    }

    #[test]
    fn dispose_closes_the_scope() {
        let feature = Arc::new(RequestServicesFeature::new(factory()));
        let scope = feature.request_services().unwrap();

        let disposable = Arc::clone(&feature).as_disposable().unwrap();
        disposable.dispose();

        assert!(scope.is_disposed());
        assert_eq!(
            feature.request_services().unwrap_err(),
            ContainerError::ScopeDisposed
        );
    }

    #[test]
    fn disposing_before_first_access_creates_nothing() {
        let feature = RequestServicesFeature::new(factory());
        feature.dispose();
        assert!(!feature.is_scope_created());
        assert!(feature.request_services().is_err());
    }

    #[test]
    fn concurrent_access_never_leaves_a_live_scope_after_dispose() {
        for _ in 0..64 {
            let feature = Arc::new(RequestServicesFeature::new(factory()));
            let scopes = std::thread::scope(|s| {
                let readers: Vec<_> = (0..4)
                    .map(|_| s.spawn(|| feature.request_services().ok()))
                    .collect();
                s.spawn(|| feature.dispose());
                readers
                    .into_iter()
                    .filter_map(|r| r.join().unwrap())
                    .collect::<Vec<_>>()
            });

            for scope in &scopes {
                assert!(scope.is_disposed());
            }
            assert!(feature.request_services().is_err());
            assert_eq!(feature.is_scope_created(), !scopes.is_empty());
        }
    }

    #[test]
    fn default_factory_builds_request_services_feature() {
        let lifecycle = RequestLifecycle::new();
        let feature = RequestServicesFeatureFactory.create_feature(&lifecycle, factory());
        assert_eq!(feature.tenant_id().map(TenantId::as_str), Some("a"));
        assert!(feature.as_disposable().is_some());
    }
}
