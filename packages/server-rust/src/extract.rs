//! Handler access to the request's service scope.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tenantscope_core::{ContainerError, ServiceScope};

use crate::lifecycle::RequestLifecycle;

/// Extracts the scope of the services feature currently installed on the
/// request.
///
/// ```ignore
/// async fn handler(RequestServices(scope): RequestServices) -> String {
///     scope.resolve::<Greeting>().map(|g| g.0.clone()).unwrap_or_default()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestServices(pub Arc<ServiceScope>);

/// Why [`RequestServices`] could not be extracted. Always a server-side
/// misconfiguration, so every variant answers `500`.
#[derive(Debug, thiserror::Error)]
pub enum RequestServicesRejection {
    #[error("request has no lifecycle; is RequestLifecycleLayer installed?")]
    MissingLifecycle,
    #[error("no request services feature is installed")]
    MissingFeature,
    #[error("request services unavailable: {0}")]
    Unavailable(#[from] ContainerError),
}

impl IntoResponse for RequestServicesRejection {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request services extraction failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestServices {
    type Rejection = RequestServicesRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let lifecycle = RequestLifecycle::from_extensions(&parts.extensions)
            .ok_or(RequestServicesRejection::MissingLifecycle)?;
        let feature = lifecycle
            .request_services()
            .ok_or(RequestServicesRejection::MissingFeature)?;
        Ok(Self(feature.request_services()?))
    }
}
