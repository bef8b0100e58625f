//! Per-request state shared by every layer: the feature set and the
//! disposal registry, plus the layer that opens and closes it.

pub mod body;
pub mod disposal;
pub mod features;
pub mod layer;

pub use body::DisposingBody;
pub use disposal::{DisposalRegistry, DisposeOnDrop};
pub use features::FeatureCollection;
pub use layer::{RequestLifecycleLayer, RequestLifecycleService};

use std::sync::Arc;

use axum::body::Body;
use http::{Extensions, Request, Response};
use tenantscope_core::Disposable;

use crate::feature::SharedServiceProviders;

/// Handle to the state owned by one request.
///
/// Stored in the request's extensions; clones share the same feature set
/// and disposal registry, so layers that hold a clone observe changes made
/// downstream after the request itself has been moved on.
#[derive(Debug, Clone, Default)]
pub struct RequestLifecycle {
    features: Arc<FeatureCollection>,
    disposals: Arc<DisposalRegistry>,
}

impl RequestLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_extensions(extensions: &Extensions) -> Option<Self> {
        extensions.get::<Self>().cloned()
    }

    #[must_use]
    pub fn from_request<B>(request: &Request<B>) -> Option<Self> {
        Self::from_extensions(request.extensions())
    }

    /// The lifecycle attached to `request`, attaching a new one if none is
    /// present. The flag is `true` when this call created it, meaning the
    /// caller is responsible for ending it.
    pub fn ensure<B>(request: &mut Request<B>) -> (Self, bool) {
        if let Some(existing) = Self::from_request(request) {
            return (existing, false);
        }
        let created = Self::new();
        request.extensions_mut().insert(created.clone());
        (created, true)
    }

    #[must_use]
    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    #[must_use]
    pub fn disposals(&self) -> &Arc<DisposalRegistry> {
        &self.disposals
    }

    /// See [`DisposalRegistry::register_for_dispose`].
    pub fn register_for_dispose(&self, resource: Arc<dyn Disposable>) -> bool {
        self.disposals.register_for_dispose(resource)
    }

    /// The service-providers feature currently installed, if any.
    #[must_use]
    pub fn request_services(&self) -> Option<SharedServiceProviders> {
        self.features.get::<SharedServiceProviders>()
    }

    #[must_use]
    pub fn dispose_guard(&self) -> DisposeOnDrop {
        DisposeOnDrop::new(Arc::clone(&self.disposals))
    }

    /// Tie the end of this lifecycle to `response`'s body.
    #[must_use]
    pub fn attach_to_response(&self, response: Response<Body>) -> Response<Body> {
        let guard = self.dispose_guard();
        response.map(|body| Body::new(DisposingBody::new(body, guard)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_reuses_an_existing_lifecycle() {
        let mut request = Request::new(());
        let (first, created) = RequestLifecycle::ensure(&mut request);
        assert!(created);

        let (second, created_again) = RequestLifecycle::ensure(&mut request);
        assert!(!created_again);
        assert!(Arc::ptr_eq(&first.features, &second.features));
    }

    #[test]
    fn attach_to_response_defers_disposal_to_the_body() {
        let lifecycle = RequestLifecycle::new();
        let response = lifecycle.attach_to_response(Response::new(Body::empty()));
        assert!(!lifecycle.disposals().is_drained());
        drop(response);
        assert!(lifecycle.disposals().is_drained());
    }
}
