use axum::http::header;
use tower_http::cors::{Any, CorsLayer};

/// Any origin may call the API; browsers can read the export file name.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}
