//! Outermost layer: opens the request lifecycle and closes it when the
//! response body completes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use http::{Request, Response};
use tenantscope_core::{Container, ServiceScopeFactory};
use tower::{Layer, Service};

use super::{DisposingBody, RequestLifecycle};
use crate::feature::{RequestServicesFeature, SharedServiceProviders};

// ---------------------------------------------------------------------------
// RequestLifecycleLayer
// ---------------------------------------------------------------------------

/// Tower layer attaching a [`RequestLifecycle`] to every request.
///
/// With [`with_default_services`](Self::with_default_services) each request
/// also starts out with a root-container services feature installed, the
/// way a host that is not multitenant-aware would serve it.
#[derive(Debug, Clone, Default)]
pub struct RequestLifecycleLayer {
    default_services: Option<Arc<Container>>,
}

impl RequestLifecycleLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_services(mut self, root: Arc<Container>) -> Self {
        self.default_services = Some(root);
        self
    }
}

impl<S> Layer<S> for RequestLifecycleLayer {
    type Service = RequestLifecycleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLifecycleService {
            inner,
            default_services: self.default_services.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestLifecycleService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RequestLifecycleService<S> {
    inner: S,
    default_services: Option<Arc<Container>>,
}

impl<S> Service<Request<Body>> for RequestLifecycleService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let lifecycle = RequestLifecycle::new();
        if let Some(root) = &self.default_services {
            let feature = Arc::new(RequestServicesFeature::new(ServiceScopeFactory::new(
                Arc::clone(root),
                None,
            )));
            lifecycle.register_for_dispose(feature.clone());
            lifecycle
                .features()
                .insert::<SharedServiceProviders>(feature);
        }
        req.extensions_mut().insert(lifecycle.clone());

        // Dropping the guard (inner failure, or this future being dropped)
        // ends the lifecycle; on success it moves into the response body.
        let guard = lifecycle.dispose_guard();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let response = fut.await?;
            Ok(response.map(|body| Body::new(DisposingBody::new(body, guard))))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
