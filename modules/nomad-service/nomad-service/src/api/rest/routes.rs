use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Extension, Router};

use super::error::not_found;
use super::handlers::{autoscaling, deploy, health, reload};
use super::middleware::{HEALTH_PATH, access_log};
use crate::module::AppState;

/// Mount every endpoint on `router`. Anything that does not match a route
/// and method answers 404, never 405.
#[must_use]
pub fn register_routes(router: Router, state: AppState) -> Router {
    let gateway = state.gateway.clone();

    router
        .route(HEALTH_PATH, get(health::healthz))
        .route(
            "/autoscaling/{service}/{key}",
            post(autoscaling::autoscaling),
        )
        .route("/deploy/{service}/{key}", post(deploy::deploy))
        .route("/reload/{service}/{key}", post(reload::reload))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(gateway.max_body_size_bytes))
        .layer(Extension(state))
        .layer(from_fn_with_state(gateway, access_log))
}

#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn test_router(state: AppState) -> Router {
    register_routes(Router::new(), state)
}
