//! Liveness and version endpoints.
//!
//! - `/health` – liveness probe, always `200 OK`.
//! - `/version` – returns cargo package name and version.
//!
//! The version endpoint includes a `Cache-Control: no-cache` header to
//! prevent caching of responses.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// Create a router containing the info endpoints.
pub(crate) fn routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
}

/// Responds with `200 OK` while the service is able to serve requests.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Responds with cargo package name and cargo package version.
///
/// Returns `200 OK` with a string response.
async fn version() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
    )
}
