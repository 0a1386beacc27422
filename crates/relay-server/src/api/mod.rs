mod relay;

use crate::error::AppError;
use crate::state::AppState;
use axum::{http::Uri, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Relay control
        .route(
            "/rest/api/v1/transform_stream",
            get(relay::start_stream).post(relay::start_stream),
        )
        .route("/rest/api/v1/stop", get(relay::stop_stream).post(relay::stop_stream))
        .route("/rest/api/v1/sessions", get(relay::list_sessions))
        .fallback(unknown_uri)
        .method_not_allowed_fallback(unsupported_method)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn unknown_uri(uri: Uri) -> AppError {
    tracing::warn!("Request for unknown uri {}", uri);
    AppError::UnknownUri(uri.path().to_string())
}

async fn unsupported_method() -> AppError {
    AppError::UnsupportedMethod
}
