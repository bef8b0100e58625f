//! Immutable service containers and their builder.
//!
//! A [`Container`] is a `TypeId`-keyed table of registrations. Containers can
//! be chained: a tenant container carries only its overrides and falls back
//! to its parent (normally the root container) for everything else.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dispose::Disposable;
use crate::error::ContainerError;
use crate::scope::ServiceScope;

pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// Result of running a registration's factory: the value plus, when the
/// value owns resources, a handle the owning scope disposes later.
pub(crate) struct Activation {
    pub(crate) instance: Instance,
    pub(crate) disposer: Option<Arc<dyn Disposable>>,
}

type Activator =
    Arc<dyn Fn(&ServiceScope) -> Result<Activation, ContainerError> + Send + Sync>;

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One pre-built instance shared by every scope.
    Singleton,
    /// One instance per [`ServiceScope`].
    Scoped,
    /// A new instance on every resolution.
    Transient,
}

#[derive(Clone)]
pub(crate) enum Registration {
    Instance(Instance),
    Scoped(Activator),
    Transient(Activator),
}

#[derive(Clone)]
pub(crate) struct Registered {
    pub(crate) type_name: &'static str,
    pub(crate) registration: Registration,
}

impl Registered {
    fn lifetime(&self) -> Lifetime {
        match self.registration {
            Registration::Instance(_) => Lifetime::Singleton,
            Registration::Scoped(_) => Lifetime::Scoped,
            Registration::Transient(_) => Lifetime::Transient,
        }
    }
}

// ---------------------------------------------------------------------------
// ContainerBuilder
// ---------------------------------------------------------------------------

/// Collects registrations and produces an immutable [`Container`].
///
/// Registering the same type twice keeps the last registration.
#[derive(Default)]
pub struct ContainerBuilder {
    registrations: HashMap<TypeId, Registered>,
    parent: Option<Arc<Container>>,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a container whose lookups fall back to `parent`.
    #[must_use]
    pub fn with_parent(parent: Arc<Container>) -> Self {
        Self {
            registrations: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Register a pre-built value shared by every scope.
    pub fn register_instance<T>(&mut self, value: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.insert::<T>(Registration::Instance(Arc::new(value)));
        self
    }

    /// Register a factory invoked at most once per scope.
    pub fn register_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Registration::Scoped(plain_activator(factory)));
        self
    }

    /// Register a per-scope factory whose instances are disposed together
    /// with the scope that created them.
    pub fn register_scoped_disposable<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Disposable + Any,
        F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Registration::Scoped(disposable_activator(factory)));
        self
    }

    /// Register a factory invoked on every resolution.
    pub fn register_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Registration::Transient(plain_activator(factory)));
        self
    }

    /// Register a factory invoked on every resolution; each instance is
    /// tracked and disposed by the scope that resolved it.
    pub fn register_transient_disposable<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Disposable + Any,
        F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert::<T>(Registration::Transient(disposable_activator(factory)));
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Container> {
        Arc::new(Container {
            registrations: self.registrations,
            parent: self.parent,
        })
    }

    fn insert<T: Any>(&mut self, registration: Registration) {
        self.registrations.insert(
            TypeId::of::<T>(),
            Registered {
                type_name: type_name::<T>(),
                registration,
            },
        );
    }
}

fn plain_activator<T, F>(factory: F) -> Activator
where
    T: Any + Send + Sync,
    F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
{
    Arc::new(move |scope: &ServiceScope| {
        let value = factory(scope)?;
        Ok(Activation {
            instance: Arc::new(value),
            disposer: None,
        })
    })
}

fn disposable_activator<T, F>(factory: F) -> Activator
where
    T: Disposable + Any,
    F: Fn(&ServiceScope) -> Result<T, ContainerError> + Send + Sync + 'static,
{
    Arc::new(move |scope: &ServiceScope| {
        let value = Arc::new(factory(scope)?);
        let disposer: Arc<dyn Disposable> = value.clone();
        Ok(Activation {
            instance: value,
            disposer: Some(disposer),
        })
    })
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Immutable registration table, optionally chained to a parent container.
pub struct Container {
    registrations: HashMap<TypeId, Registered>,
    parent: Option<Arc<Container>>,
}

impl Container {
    #[must_use]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Builder for a child container layered over `self`.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> ContainerBuilder {
        ContainerBuilder::with_parent(Arc::clone(self))
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Container>> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn is_registered<T: Any>(&self) -> bool {
        self.lookup(TypeId::of::<T>()).is_some()
    }

    /// Lifetime of the registration `T` resolves to, searching parents.
    #[must_use]
    pub fn lifetime_of<T: Any>(&self) -> Option<Lifetime> {
        self.lookup(TypeId::of::<T>()).map(Registered::lifetime)
    }

    /// Resolve a singleton instance directly from the container.
    ///
    /// # Errors
    ///
    /// `NotRegistered` when no container in the chain knows `T`, and
    /// `ScopeRequired` when `T` is scoped or transient.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        let registered = self
            .lookup(TypeId::of::<T>())
            .ok_or(ContainerError::NotRegistered {
                type_name: type_name::<T>(),
            })?;
        match &registered.registration {
            Registration::Instance(instance) => downcast::<T>(Arc::clone(instance)),
            Registration::Scoped(_) | Registration::Transient(_) => {
                Err(ContainerError::ScopeRequired {
                    type_name: registered.type_name,
                })
            }
        }
    }

    /// Start a new service scope whose lookups go through this container.
    #[must_use]
    pub fn begin_scope(self: &Arc<Self>) -> ServiceScope {
        ServiceScope::new(Arc::clone(self))
    }

    pub(crate) fn lookup(&self, id: TypeId) -> Option<&Registered> {
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(registered) = container.registrations.get(&id) {
                return Some(registered);
            }
            current = container.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registrations.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

pub(crate) fn downcast<T>(instance: Instance) -> Result<Arc<T>, ContainerError>
where
    T: Any + Send + Sync,
{
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            type_name: type_name::<T>(),
        })
}
