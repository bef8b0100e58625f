//! Multitenant request-services middleware.
//!
//! Makes every request resolve its services from a scope created by the
//! multitenant container, so tenant identification always goes through the
//! multitenant container rather than whichever scope an earlier layer
//! happened to install.
//!
//! Per request, in order:
//! 1. publish the request in the ambient context unless an outer layer did
//! 2. obtain the multitenant container (missing container is fatal)
//! 3. build the services feature from the tenant's scope factory
//! 4. hand the feature to the request's disposal registry
//! 5. swap it into the feature set, remembering the previous entry
//! 6. run the downstream service
//! 7. put the previous entry back, on every outcome

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use http::{Request, Response};
use tenantscope_core::{Container, MultitenantContainer, MultitenantContainerSlot, TenantId};
use tower::{BoxError, Layer, Service};
use tracing::{debug, error, trace};

use super::error::RequestServicesError;
use crate::context::{AmbientSlot, CurrentRequest, RequestContextAccessor, TaskLocalContextAccessor};
use crate::feature::{FeatureFactory, RequestServicesFeatureFactory, SharedServiceProviders};
use crate::lifecycle::{DisposeOnDrop, DisposingBody, RequestLifecycle};

/// Translates the root container into the active multitenant container.
/// Returning `None` means multitenancy is misconfigured.
pub type MultitenantContainerAccessor =
    Arc<dyn Fn(&Arc<Container>) -> Option<Arc<MultitenantContainer>> + Send + Sync>;

// ---------------------------------------------------------------------------
// MultitenantRequestServicesLayer
// ---------------------------------------------------------------------------

/// Tower layer installing tenant-scoped request services.
///
/// Errors from the wrapped service pass through unchanged as [`BoxError`];
/// the layer's own failure is [`RequestServicesError`].
#[derive(Clone)]
pub struct MultitenantRequestServicesLayer {
    container: Arc<Container>,
    multitenant_accessor: MultitenantContainerAccessor,
    context_accessor: Arc<dyn RequestContextAccessor>,
    feature_factory: Arc<dyn FeatureFactory>,
}

impl MultitenantRequestServicesLayer {
    #[must_use]
    pub fn new<F>(container: Arc<Container>, multitenant_accessor: F) -> Self
    where
        F: Fn(&Arc<Container>) -> Option<Arc<MultitenantContainer>> + Send + Sync + 'static,
    {
        Self {
            container,
            multitenant_accessor: Arc::new(multitenant_accessor),
            context_accessor: Arc::new(TaskLocalContextAccessor),
            feature_factory: Arc::new(RequestServicesFeatureFactory),
        }
    }

    /// Layer reading the multitenant container from a host-owned slot.
    #[must_use]
    pub fn from_slot(container: Arc<Container>, slot: &Arc<MultitenantContainerSlot>) -> Self {
        Self::new(container, slot.accessor())
    }

    #[must_use]
    pub fn with_context_accessor(mut self, accessor: Arc<dyn RequestContextAccessor>) -> Self {
        self.context_accessor = accessor;
        self
    }

    #[must_use]
    pub fn with_feature_factory(mut self, factory: Arc<dyn FeatureFactory>) -> Self {
        self.feature_factory = factory;
        self
    }
}

impl fmt::Debug for MultitenantRequestServicesLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultitenantRequestServicesLayer")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for MultitenantRequestServicesLayer {
    type Service = MultitenantRequestServicesService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MultitenantRequestServicesService {
            inner,
            shared: Arc::new(Shared {
                container: Arc::clone(&self.container),
                multitenant_accessor: Arc::clone(&self.multitenant_accessor),
                context_accessor: Arc::clone(&self.context_accessor),
                feature_factory: Arc::clone(&self.feature_factory),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MultitenantRequestServicesService
// ---------------------------------------------------------------------------

struct Shared {
    container: Arc<Container>,
    multitenant_accessor: MultitenantContainerAccessor,
    context_accessor: Arc<dyn RequestContextAccessor>,
    feature_factory: Arc<dyn FeatureFactory>,
}

/// Work started synchronously in `call`, finished in the response future.
struct Prepared<F> {
    fut: F,
    restore: FeatureRestoreGuard,
    /// Present when no outer layer owns the request lifecycle.
    end_of_request: Option<DisposeOnDrop>,
}

impl Shared {
    fn prepare<S>(
        &self,
        mut req: Request<Body>,
        inner: &mut S,
    ) -> Result<Prepared<S::Future>, RequestServicesError>
    where
        S: Service<Request<Body>>,
    {
        self.context_accessor
            .set_if_absent(Arc::new(CurrentRequest::from_request(&req)));

        let Some(multitenant) = (self.multitenant_accessor)(&self.container) else {
            error!(uri = %req.uri(), "multitenant container accessor returned no container");
            return Err(RequestServicesError::NoMultitenantContainer);
        };

        let (lifecycle, created) = RequestLifecycle::ensure(&mut req);
        let feature = self
            .feature_factory
            .create_feature(&lifecycle, multitenant.scope_factory());

        if let Some(disposable) = Arc::clone(&feature).as_disposable() {
            lifecycle.register_for_dispose(disposable);
        }

        debug!(
            tenant = feature.tenant_id().map_or("<root>", TenantId::as_str),
            "installing tenant request services"
        );
        let end_of_request = created.then(|| lifecycle.dispose_guard());
        let restore = FeatureRestoreGuard::install(lifecycle, feature);

        let fut = inner.call(req);
        Ok(Prepared {
            fut,
            restore,
            end_of_request,
        })
    }
}

/// Service produced by [`MultitenantRequestServicesLayer`].
#[derive(Clone)]
pub struct MultitenantRequestServicesService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S: fmt::Debug> fmt::Debug for MultitenantRequestServicesService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultitenantRequestServicesService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request<Body>> for MultitenantRequestServicesService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + 'static,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Reuse the slot of an enclosing layer so its value wins.
        let slot = AmbientSlot::inherit_or_new();
        let shared = Arc::clone(&self.shared);
        let inner = &mut self.inner;

        let prepared = match slot.clone().sync_scope(|| shared.prepare(req, inner)) {
            Ok(prepared) => prepared,
            Err(err) => return Box::pin(std::future::ready(Err(err.into()))),
        };

        Box::pin(slot.scope(async move {
            let Prepared {
                fut,
                restore,
                end_of_request,
            } = prepared;

            let result = fut.await;
            drop(restore);

            let response = result.map_err(Into::into)?;
            Ok(match end_of_request {
                Some(guard) => response.map(|body| Body::new(DisposingBody::new(body, guard))),
                None => response,
            })
        }))
    }
}

// ---------------------------------------------------------------------------
// FeatureRestoreGuard
// ---------------------------------------------------------------------------

/// Installs a services feature and puts the previous entry back on drop,
/// including when the previous state was "no feature at all".
///
/// Drop runs on normal completion, on downstream failure, and when the
/// response future is dropped mid-flight.
struct FeatureRestoreGuard {
    lifecycle: RequestLifecycle,
    previous: Option<SharedServiceProviders>,
}

impl FeatureRestoreGuard {
    fn install(lifecycle: RequestLifecycle, feature: SharedServiceProviders) -> Self {
        let previous = lifecycle.features().set(Some(feature));
        Self {
            lifecycle,
            previous,
        }
    }
}

impl Drop for FeatureRestoreGuard {
    fn drop(&mut self) {
        let had_previous = self.previous.is_some();
        self.lifecycle
            .features()
            .set::<SharedServiceProviders>(self.previous.take());
        trace!(had_previous, "request services feature restored");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
