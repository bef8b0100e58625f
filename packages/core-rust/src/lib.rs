//! `tenantscope` core — service containers, scopes, and multitenant resolution.

pub mod container;
pub mod dispose;
pub mod error;
pub mod multitenant;
pub mod scope;
pub mod tenant;

pub use container::{Container, ContainerBuilder, Lifetime};
pub use dispose::Disposable;
pub use error::ContainerError;
pub use multitenant::{MultitenantContainer, MultitenantContainerSlot};
pub use scope::{ServiceScope, ServiceScopeFactory};
pub use tenant::{FixedTenantStrategy, TenantId, TenantIdentificationStrategy};
