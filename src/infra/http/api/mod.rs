pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();
    let rate_state = state.clone();

    Router::new()
        .route(
            "/api/bookmarks",
            get(handlers::list_bookmarks).post(handlers::save_bookmark),
        )
        .route("/api/bookmarks/tags", get(handlers::list_tags))
        .route("/api/bookmarks/export", get(handlers::export_bookmarks))
        .route(
            "/api/bookmarks/{id}",
            patch(handlers::update_bookmark).delete(handlers::delete_bookmark),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::attach_identity,
        ))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
