use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower::BoxError;
use tracing::error;

/// Failures raised by the multitenant request-services middleware itself.
///
/// Downstream failures are never wrapped in this type; they reach the
/// caller unchanged as a [`BoxError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestServicesError {
    #[error(
        "no multitenant container is available; the multitenant container accessor \
         returned nothing for the root container"
    )]
    NoMultitenantContainer,
}

impl IntoResponse for RequestServicesError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Error handler for `axum::error_handling::HandleErrorLayer` placed above
/// the middleware: configuration errors and unhandled downstream failures
/// both become `500 Internal Server Error`.
pub async fn handle_request_services_error(err: BoxError) -> Response {
    match err.downcast::<RequestServicesError>() {
        Ok(config) => {
            error!(error = %config, "request rejected by multitenant middleware");
            (*config).into_response()
        }
        Err(other) => {
            error!(error = %other, "unhandled error in request pipeline");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}
