//! Service scopes: the unit of per-request (or per-unit-of-work) resolution.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::{downcast, Container, Instance, Registration};
use crate::dispose::Disposable;
use crate::error::ContainerError;
use crate::tenant::TenantId;

// ---------------------------------------------------------------------------
// ServiceScope
// ---------------------------------------------------------------------------

/// A resolution scope created from a [`Container`].
///
/// Scoped services are built at most once per scope and cached. Instances
/// registered as disposable are released by [`Disposable::dispose`] in
/// reverse creation order, exactly once. Dropping the scope disposes it.
pub struct ServiceScope {
    container: Arc<Container>,
    instances: Mutex<HashMap<TypeId, Instance>>,
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
    disposed: AtomicBool,
}

impl ServiceScope {
    pub(crate) fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            instances: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// The container this scope resolves through.
    #[must_use]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Resolve `T` according to its registered lifetime.
    ///
    /// # Errors
    ///
    /// `ScopeDisposed` after [`Disposable::dispose`], `NotRegistered` when no
    /// container in the chain knows `T`, or whatever the factory returns.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        if self.is_disposed() {
            return Err(ContainerError::ScopeDisposed);
        }
        let id = TypeId::of::<T>();
        let registered = self
            .container
            .lookup(id)
            .ok_or(ContainerError::NotRegistered {
                type_name: std::any::type_name::<T>(),
            })?;

        match &registered.registration {
            Registration::Instance(instance) => downcast::<T>(Arc::clone(instance)),
            Registration::Transient(activator) => {
                let activation = activator(self)?;
                if let Some(disposer) = activation.disposer {
                    self.track(disposer);
                }
                downcast::<T>(activation.instance)
            }
            Registration::Scoped(activator) => {
                if let Some(existing) = self.instances.lock().get(&id) {
                    return downcast::<T>(Arc::clone(existing));
                }
                // The factory runs unlocked so it can resolve its own
                // dependencies from this scope.
                let activation = activator(self)?;
                let instance = {
                    let mut instances = self.instances.lock();
                    if let Some(winner) = instances.get(&id) {
                        // Another caller finished first; keep its instance.
                        if let Some(disposer) = activation.disposer {
                            disposer.dispose();
                        }
                        Arc::clone(winner)
                    } else {
                        instances.insert(id, Arc::clone(&activation.instance));
                        if let Some(disposer) = activation.disposer {
                            self.track(disposer);
                        }
                        activation.instance
                    }
                };
                downcast::<T>(instance)
            }
        }
    }

    /// Resolve `T`, mapping every failure to `None`.
    #[must_use]
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve::<T>().ok()
    }

    fn track(&self, disposer: Arc<dyn Disposable>) {
        if self.is_disposed() {
            disposer.dispose();
            return;
        }
        self.disposables.lock().push(disposer);
    }
}

impl Disposable for ServiceScope {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let tracked = std::mem::take(&mut *self.disposables.lock());
        for disposer in tracked.iter().rev() {
            disposer.dispose();
        }
        self.instances.lock().clear();
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope")
            .field("disposed", &self.is_disposed())
            .field("cached", &self.instances.lock().len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ServiceScopeFactory
// ---------------------------------------------------------------------------

/// Creates scopes from one specific container.
///
/// A factory obtained from a multitenant container is already bound to the
/// tenant identified at the time it was requested; creating scopes from it
/// never re-runs identification.
#[derive(Debug, Clone)]
pub struct ServiceScopeFactory {
    container: Arc<Container>,
    tenant: Option<TenantId>,
}

impl ServiceScopeFactory {
    #[must_use]
    pub fn new(container: Arc<Container>, tenant: Option<TenantId>) -> Self {
        Self { container, tenant }
    }

    /// Tenant this factory was identified for; `None` for the root container.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    #[must_use]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    #[must_use]
    pub fn create_scope(&self) -> ServiceScope {
        self.container.begin_scope()
    }
}
