//! Axon API - HTTP handlers and routing
//!
//! This crate provides the Axum-based HTTP edge for the skill platform:
//! skill install / list / uninstall / execute, plus health.

pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use utoipa::OpenApi;

/// OpenAPI document for the skill platform API
#[derive(OpenApi)]
#[openapi(
    info(title = "Axon Skill Platform API", version = "0.1.0"),
    paths(
        routes::skills::install_skill,
        routes::skills::list_installed_skills,
        routes::skills::uninstall_skill,
        routes::skills::execute_skill,
    )
)]
pub struct ApiDoc;
