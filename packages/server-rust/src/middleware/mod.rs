//! The multitenant request-services middleware and its error handling.

pub mod error;
pub mod request_services;

pub use error::{handle_request_services_error, RequestServicesError};
pub use request_services::{
    MultitenantContainerAccessor, MultitenantRequestServicesLayer,
    MultitenantRequestServicesService,
};
