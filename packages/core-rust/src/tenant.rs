//! Tenant identifiers and the identification seam.

use std::fmt;
use std::sync::Arc;

/// Identifier of a configured tenant.
///
/// Cheap to clone: the backing string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(Arc<str>);

impl TenantId {
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// Determines which tenant the currently executing work belongs to.
///
/// Strategies typically read ambient request state, so they are consulted
/// each time a tenant-bound service or scope factory is requested rather
/// than once at startup. Returning `None` selects the root container.
pub trait TenantIdentificationStrategy: Send + Sync {
    fn identify_tenant(&self) -> Option<TenantId>;
}

/// Strategy that always answers with the same tenant. Useful for hosts
/// that pin a process to one tenant and for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedTenantStrategy(pub Option<TenantId>);

impl TenantIdentificationStrategy for FixedTenantStrategy {
    fn identify_tenant(&self) -> Option<TenantId> {
        self.0.clone()
    }
}

impl<F> TenantIdentificationStrategy for F
where
    F: Fn() -> Option<TenantId> + Send + Sync,
{
    fn identify_tenant(&self) -> Option<TenantId> {
        self()
    }
}
