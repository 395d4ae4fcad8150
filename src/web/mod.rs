mod analytics;
mod approvals;
pub mod auth;
pub mod error;
mod images;
mod posts;
mod replies;
mod routes;
mod usage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::service::ContentService;
use auth::RequireApiKey;
use routes::{parse_status, DecisionRequest, PublishRequest, ReviewStarted};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub service: Arc<ContentService>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, service: ContentService) -> Self {
        Self {
            db: service.db().clone(),
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}

/// Start the web server and run until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the service cannot be built or the server fails to start.
pub async fn serve<F>(config: Config, db: Database, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.web_host, config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let service =
        ContentService::from_config(&config, db).context("Failed to build content service")?;
    let app = app(AppState::new(config, service));

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server error")?;

    Ok(())
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .nest("/posts", posts::router())
        .nest("/replies", replies::router())
        .nest("/images", images::router())
        .nest("/approvals", approvals::router())
        .nest("/analytics", analytics::router())
        .route_layer(middleware::from_extractor_with_state::<RequireApiKey, _>(
            state.clone(),
        ));

    Router::new()
        .merge(routes::router())
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            usage::record_usage,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
