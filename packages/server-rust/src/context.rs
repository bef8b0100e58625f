//! Ambient request context.
//!
//! The current request is carried in a tokio task-local [`AmbientSlot`] so
//! code deep in a request's call chain (tenant identification in particular)
//! can see it without threading it through every signature. A slot holds at
//! most one request and is never overwritten: when layers nest, the inner
//! layer inherits the outer slot and its value.
//!
//! Task-locals do not follow `tokio::spawn`; work spawned from a handler
//! must enter the slot itself via [`AmbientSlot::scope`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use http::{HeaderMap, Method, Request, Uri, Version};

tokio::task_local! {
    static CURRENT_REQUEST: AmbientSlot;
}

// ---------------------------------------------------------------------------
// CurrentRequest
// ---------------------------------------------------------------------------

/// Read-only snapshot of the request head, published through the ambient slot.
#[derive(Debug, Clone)]
pub struct CurrentRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl CurrentRequest {
    #[must_use]
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    /// Decoded query-string parameters. Malformed query strings yield an
    /// empty map; repeated keys keep the last value.
    #[must_use]
    pub fn query_params(&self) -> HashMap<String, String> {
        self.uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params().remove(name)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ---------------------------------------------------------------------------
// AmbientSlot
// ---------------------------------------------------------------------------

/// Write-once cell shared by every layer handling the same request.
#[derive(Debug, Clone, Default)]
pub struct AmbientSlot(Arc<OnceLock<Arc<CurrentRequest>>>);

impl AmbientSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot entered by the calling task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT_REQUEST.try_with(Clone::clone).ok()
    }

    /// The slot entered by the calling task, or a fresh empty one.
    #[must_use]
    pub fn inherit_or_new() -> Self {
        Self::current().unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<CurrentRequest>> {
        self.0.get().cloned()
    }

    /// Store `request` unless the slot already holds one. Returns whether
    /// the value was stored.
    pub fn set_if_absent(&self, request: Arc<CurrentRequest>) -> bool {
        self.0.set(request).is_ok()
    }

    /// Run `fut` with this slot as the task's ambient context.
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT_REQUEST.scope(self, fut)
    }

    /// Run `f` synchronously with this slot as the ambient context.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT_REQUEST.sync_scope(self, f)
    }
}

// ---------------------------------------------------------------------------
// RequestContextAccessor
// ---------------------------------------------------------------------------

/// Access to "the request currently being handled".
///
/// The middleware only ever calls [`set_if_absent`](Self::set_if_absent);
/// clearing is the business of whoever owns the context.
pub trait RequestContextAccessor: Send + Sync {
    fn current_request(&self) -> Option<Arc<CurrentRequest>>;

    fn set_current_request(&self, request: Arc<CurrentRequest>);

    /// Publish `request` only when nothing is published yet.
    fn set_if_absent(&self, request: Arc<CurrentRequest>) -> bool {
        if self.current_request().is_some() {
            return false;
        }
        self.set_current_request(request);
        true
    }
}

/// Accessor backed by the task-local [`AmbientSlot`].
///
/// Outside an entered slot both reads and writes are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalContextAccessor;

impl RequestContextAccessor for TaskLocalContextAccessor {
    fn current_request(&self) -> Option<Arc<CurrentRequest>> {
        AmbientSlot::current().and_then(|slot| slot.get())
    }

    fn set_current_request(&self, request: Arc<CurrentRequest>) {
        if let Some(slot) = AmbientSlot::current() {
            slot.set_if_absent(request);
        }
    }

    fn set_if_absent(&self, request: Arc<CurrentRequest>) -> bool {
        AmbientSlot::current().is_some_and(|slot| slot.set_if_absent(request))
    }
}
