//! Axon Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use axon_adapters::{AdapterFactory, AdapterManager};
use axon_api::{routes, ApiDoc, AppState};
use axon_db::{
    AdapterConfigRepository, ExecutionRepository, InstallationRepository,
    PgAdapterConfigRepository, PgExecutionRepository, PgInstallationRepository,
    PgWorkflowRepository, WorkflowRepository,
};
use axon_skills::{BuiltinSkillLoader, SkillInstaller, SkillRuntime};
use axon_workflow_engine::{WorkflowAdapter, WorkflowEngine, WorkflowService};

#[tokio::main]
async fn main() -> Result<()> {
    axon_common::init_tracing();
    dotenvy::dotenv().ok();

    // Database pool; every repository call and background task draws its own
    // connection from it.
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = axon_db::connect(&database_url)
        .await
        .context("failed to connect to database")?;
    axon_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    // Repositories
    let adapter_configs: Arc<dyn AdapterConfigRepository> =
        Arc::new(PgAdapterConfigRepository::new(pool.clone()));
    let workflows: Arc<dyn WorkflowRepository> = Arc::new(PgWorkflowRepository::new(pool.clone()));
    let executions: Arc<dyn ExecutionRepository> =
        Arc::new(PgExecutionRepository::new(pool.clone()));
    let installations: Arc<dyn InstallationRepository> =
        Arc::new(PgInstallationRepository::new(pool.clone()));

    // Adapter runtime: factory table, manager, workflow engine + service.
    let factory = Arc::new(AdapterFactory::with_builtins());
    let adapter_manager = Arc::new(AdapterManager::new(
        Arc::clone(&factory),
        Arc::clone(&adapter_configs),
    ));

    let workflow_service = Arc::new(WorkflowService::new(
        workflows,
        executions,
        Arc::new(WorkflowEngine::new()),
        Arc::clone(&adapter_manager),
    ));

    // The workflow adapter class closes over the service, so it joins the
    // factory table after service construction and before any restore.
    WorkflowAdapter::register_class(&factory, Arc::clone(&workflow_service));

    // Restore persisted configurations; adapters start lazily on first use.
    adapter_manager
        .initialize()
        .await
        .context("failed to restore adapter configurations")?;
    adapter_manager.start();

    let installer = Arc::new(SkillInstaller::new(
        Arc::clone(&installations),
        Arc::clone(&workflow_service),
        Arc::clone(&adapter_manager),
    ));

    let runtime = Arc::new(SkillRuntime::new(
        installations,
        Arc::clone(&installer),
        Arc::new(BuiltinSkillLoader::from_env()),
        Arc::clone(&workflow_service),
        Arc::clone(&adapter_manager),
    ));

    let state = AppState {
        adapter_manager: Arc::clone(&adapter_manager),
        workflow_service,
        installer,
        runtime,
    };

    let app = Router::new()
        .merge(routes::api_routes(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port = std::env::var("AXON_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting Axon server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(adapter_manager))
        .await?;

    Ok(())
}

async fn shutdown_signal(adapter_manager: Arc<AdapterManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down, stopping adapters");
    adapter_manager.stop().await;
}
