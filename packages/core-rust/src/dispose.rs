//! Explicit release of resources whose lifetime is bound to a scope or request.

/// A resource that is released by an owner at a well-defined point in time.
///
/// Implementations must tolerate repeated calls; only the first one releases.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}
