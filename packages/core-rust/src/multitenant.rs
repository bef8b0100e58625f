//! Multitenant container: a root container plus per-tenant overrides.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::container::{Container, ContainerBuilder};
use crate::error::ContainerError;
use crate::scope::ServiceScopeFactory;
use crate::tenant::{TenantId, TenantIdentificationStrategy};

// ---------------------------------------------------------------------------
// MultitenantContainer
// ---------------------------------------------------------------------------

/// Routes resolution to the container of the tenant currently identified by
/// the configured [`TenantIdentificationStrategy`].
///
/// Tenant containers are children of the root container, so anything a
/// tenant does not override comes from the root. Requests for tenants that
/// were never configured, or for no tenant at all, are served by the root.
///
/// Lookups are safe under concurrent readers; tenants may be added or
/// removed at runtime without blocking in-flight resolutions.
pub struct MultitenantContainer {
    root: Arc<Container>,
    strategy: Arc<dyn TenantIdentificationStrategy>,
    tenants: DashMap<TenantId, Arc<Container>>,
}

impl MultitenantContainer {
    #[must_use]
    pub fn new(strategy: Arc<dyn TenantIdentificationStrategy>, root: Arc<Container>) -> Self {
        Self {
            root,
            strategy,
            tenants: DashMap::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Arc<Container> {
        &self.root
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn TenantIdentificationStrategy> {
        &self.strategy
    }

    /// Register the overrides for `tenant`.
    ///
    /// # Errors
    ///
    /// `TenantAlreadyConfigured` if `tenant` already has a container.
    pub fn configure_tenant<F>(&self, tenant: TenantId, configure: F) -> Result<(), ContainerError>
    where
        F: FnOnce(&mut ContainerBuilder),
    {
        match self.tenants.entry(tenant) {
            Entry::Occupied(entry) => Err(ContainerError::TenantAlreadyConfigured {
                tenant: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let mut builder = self.root.child();
                configure(&mut builder);
                debug!(tenant = %entry.key(), "tenant configured");
                entry.insert(builder.build());
                Ok(())
            }
        }
    }

    /// Remove a tenant's overrides. Scopes already created from it keep
    /// working until they are disposed.
    pub fn remove_tenant(&self, tenant: &TenantId) -> bool {
        let removed = self.tenants.remove(tenant).is_some();
        if removed {
            debug!(tenant = %tenant, "tenant removed");
        }
        removed
    }

    #[must_use]
    pub fn is_configured(&self, tenant: &TenantId) -> bool {
        self.tenants.contains_key(tenant)
    }

    /// Identifiers of all configured tenants, sorted.
    #[must_use]
    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self.tenants.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The container serving `tenant`, falling back to the root.
    #[must_use]
    pub fn tenant_container(&self, tenant: Option<&TenantId>) -> Arc<Container> {
        tenant
            .and_then(|id| self.tenants.get(id).map(|e| Arc::clone(e.value())))
            .unwrap_or_else(|| Arc::clone(&self.root))
    }

    /// Run the identification strategy for the current context.
    #[must_use]
    pub fn current_tenant_id(&self) -> Option<TenantId> {
        self.strategy.identify_tenant()
    }

    /// Resolve a singleton from the current tenant's container.
    ///
    /// # Errors
    ///
    /// See [`Container::resolve`].
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        let tenant = self.current_tenant_id();
        self.tenant_container(tenant.as_ref()).resolve::<T>()
    }

    /// Scope factory bound to the tenant identified right now.
    ///
    /// The returned factory reports the identified tenant only when that
    /// tenant is configured; otherwise it is a root-container factory.
    #[must_use]
    pub fn scope_factory(&self) -> ServiceScopeFactory {
        let identified = self.current_tenant_id();
        match identified {
            Some(id) => match self.tenants.get(&id) {
                Some(entry) => ServiceScopeFactory::new(Arc::clone(entry.value()), Some(id)),
                None => {
                    debug!(tenant = %id, "tenant not configured, using root container");
                    ServiceScopeFactory::new(Arc::clone(&self.root), None)
                }
            },
            None => ServiceScopeFactory::new(Arc::clone(&self.root), None),
        }
    }
}

impl fmt::Debug for MultitenantContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultitenantContainer")
            .field("tenants", &self.tenant_ids())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MultitenantContainerSlot
// ---------------------------------------------------------------------------

/// Host-owned cell holding the active multitenant container.
///
/// Bootstrap code fills the slot once the tenant containers are configured;
/// request handling only reads it. An empty slot means multitenancy has not
/// been wired up.
#[derive(Debug, Default)]
pub struct MultitenantContainerSlot {
    current: ArcSwapOption<MultitenantContainer>,
}

impl MultitenantContainerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, container: Arc<MultitenantContainer>) {
        self.current.store(Some(container));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<MultitenantContainer>> {
        self.current.load_full()
    }

    /// A resolver function reading this slot, ignoring the root container.
    #[must_use]
    pub fn accessor(
        self: &Arc<Self>,
    ) -> impl Fn(&Arc<Container>) -> Option<Arc<MultitenantContainer>> + Send + Sync + 'static
    {
        let slot = Arc::clone(self);
        move |_root: &Arc<Container>| slot.get()
    }
}
