use crate::tenant::TenantId;

/// Errors raised while registering or resolving services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("no registration for service `{type_name}`")]
    NotRegistered { type_name: &'static str },
    #[error("service `{type_name}` is scoped and must be resolved from a service scope")]
    ScopeRequired { type_name: &'static str },
    #[error("service scope has already been disposed")]
    ScopeDisposed,
    #[error("registration for `{type_name}` produced a value of another type")]
    TypeMismatch { type_name: &'static str },
    #[error("tenant `{tenant}` has already been configured")]
    TenantAlreadyConfigured { tenant: TenantId },
}
