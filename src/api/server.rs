use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::auth::SessionStore;
use crate::config::schema::{Config, ServerConfig};
use crate::error::{DownloaderError, Result};
use crate::models::{
    ActivationStore, CatalogStore, DownloadJobs, DownloadOrchestrator, DownloadPolicy, ModelHub,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogStore>,
    pub activation: Arc<ActivationStore>,
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<DownloadOrchestrator>,
    pub jobs: Arc<DownloadJobs>,
}

impl AppState {
    /// Open the stores under `storage.state_dir` and wire them to `hub`
    pub fn from_config(config: &Config, hub: Arc<dyn ModelHub>) -> Result<Self> {
        let storage = &config.storage;
        std::fs::create_dir_all(&storage.state_dir).map_err(|e| {
            DownloaderError::ServiceUnavailable(format!(
                "Cannot create state directory {}: {e}",
                storage.state_dir.display()
            ))
        })?;

        let catalog = Arc::new(CatalogStore::new(storage.catalog_path.clone()));
        let activation = Arc::new(ActivationStore::open(storage.active_config_path())?);
        let sessions = Arc::new(SessionStore::open(storage.session_path(), Arc::clone(&hub)));

        let orchestrator = Arc::new(DownloadOrchestrator::new(
            CatalogStore::new(storage.catalog_path.clone()),
            Arc::clone(&activation),
            Arc::clone(&sessions),
            hub,
            storage.models_root.clone(),
            DownloadPolicy::from_config(&config.downloads, &config.hub),
        ));

        tracing::info!("Catalog: {}", catalog.path().display());
        tracing::info!("Active config: {}", activation.path().display());

        Ok(Self {
            catalog,
            activation,
            sessions,
            orchestrator,
            jobs: Arc::new(DownloadJobs::with_history(config.downloads.job_history)),
        })
    }
}

/// Build the router, mounted under `base_path` unless it is empty
pub fn create_router(state: AppState, base_path: &str) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route(
            "/active",
            get(handlers::get_active).post(handlers::update_active),
        )
        .route("/download", post(handlers::download))
        .route("/download/jobs/:id", get(handlers::get_job))
        .route("/download/jobs/:id/cancel", post(handlers::cancel_job))
        .route("/check/:model_name", get(handlers::check))
        .route("/login-status", get(handlers::login_status))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout));

    let router = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(base_path, routes)
    };

    router
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// HTTP server for the downloader API
pub struct ApiServer {
    state: AppState,
    addr: String,
    base_path: String,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: AppState, config: &ServerConfig) -> Self {
        Self {
            state,
            addr: config.bind_addr(),
            base_path: config.normalized_base_path(),
            ready_tx: None,
        }
    }

    /// Set ready signal channel, receiving the bound address (for testing)
    #[must_use]
    pub fn with_ready_signal(mut self, ready_tx: oneshot::Sender<SocketAddr>) -> Self {
        self.ready_tx = Some(ready_tx);
        self
    }

    /// Override listen address (for testing)
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    #[must_use]
    pub fn router(&self) -> Router {
        create_router(self.state.clone(), &self.base_path)
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            DownloaderError::ServiceUnavailable(format!("Failed to bind {}: {e}", self.addr))
        })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            "Server listening on http://{}{}",
            local_addr,
            self.base_path
        );

        if let Some(ready_tx) = self.ready_tx.take() {
            ready_tx.send(local_addr).ok();
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}
