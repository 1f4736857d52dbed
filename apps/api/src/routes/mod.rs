//! API route definitions

mod health;
pub mod skills;

use axum::Router;

use crate::state::AppState;

/// Build the API router with all routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/api/v1", api_v1_routes(state))
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router {
    Router::new().nest("/skills", skills::routes(state))
}
