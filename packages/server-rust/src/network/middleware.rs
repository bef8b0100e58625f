//! Transport layers wrapped around the application router.
//!
//! These run before the request-services stack: a request first gets an id
//! and a trace span carrying that id, browsers get their CORS answers
//! (including for the tenant header), and a deadline is armed. The id is
//! echoed on the response so tenant-specific failures can be traced back.

use axum::body::Body;
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::config::{NetworkConfig, TenancyConfig};
use crate::identification::DEFAULT_TENANT_HEADER;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the transport stack, outermost first:
/// request id, trace span, CORS, timeout (`408`), id propagation.
#[must_use]
pub fn with_http_layers(router: Router, network: &NetworkConfig, tenancy: &TenancyConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(build_cors_layer(&network.cors_origins, tenancy))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                network.request_timeout,
            ))
            .layer(PropagateRequestIdLayer::new(request_id)),
    )
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}

/// `"*"` anywhere in `origins` allows every origin; otherwise unparsable
/// entries are skipped. Browsers may send the tenant header cross-origin
/// and read the request id back.
fn build_cors_layer(origins: &[String], tenancy: &TenancyConfig) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    let tenant_header = tenancy
        .header
        .as_deref()
        .and_then(|h| HeaderName::try_from(h).ok())
        .unwrap_or_else(|| HeaderName::from_static(DEFAULT_TENANT_HEADER));
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers([CONTENT_TYPE, request_id.clone(), tenant_header])
        .expose_headers([request_id])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
        ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
    };
    use axum::response::Response;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    fn router(network: &NetworkConfig, tenancy: &TenancyConfig) -> Router {
        let routes = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            );
        with_http_layers(routes, network, tenancy)
    }

    fn default_router() -> Router {
        router(&NetworkConfig::default(), &TenancyConfig::default())
    }

    async fn preflight(router: Router, origin: &str, header: &str) -> Response {
        router
            .oneshot(
                Request::options("/ok")
                    .header(ORIGIN, origin)
                    .header(ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .header(ACCESS_CONTROL_REQUEST_HEADERS, header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    fn allowed_headers(response: &Response) -> String {
        response
            .headers()
            .get(ACCESS_CONTROL_ALLOW_HEADERS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    #[tokio::test]
    async fn assigns_and_echoes_request_id() {
        let response = default_router()
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn keeps_client_request_id() {
        let response = default_router()
            .oneshot(
                Request::get("/ok")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_requests_time_out() {
        let network = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let response = router(&network, &TenancyConfig::default())
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn wildcard_preflight_allows_any_origin_and_tenant_header() {
        let response = preflight(default_router(), "http://app.example", DEFAULT_TENANT_HEADER).await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(allowed_headers(&response).contains(DEFAULT_TENANT_HEADER));
    }

    #[tokio::test]
    async fn listed_origins_are_echoed_and_others_refused() {
        let network = NetworkConfig {
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "not a valid origin\n".to_string(),
            ],
            ..NetworkConfig::default()
        };
        let tenancy = TenancyConfig {
            header: Some("x-org".to_string()),
            ..TenancyConfig::default()
        };

        let allowed = preflight(router(&network, &tenancy), "http://localhost:3000", "x-org").await;
        assert_eq!(
            allowed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert!(allowed_headers(&allowed).contains("x-org"));

        let refused = preflight(router(&network, &tenancy), "http://evil.example", "x-org").await;
        assert!(!refused.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
