use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Request, Response},
    middleware,
    routing::get,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use intake_storage::DynStorage;

use crate::config::{AppConfig, StorageBackend};
use crate::middleware::RequestId;
use crate::{handlers, middleware as app_middleware, routes};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: DynStorage,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: DynStorage) -> Self {
        Self {
            storage,
            config: Arc::new(config),
        }
    }
}

/// Opens the store selected by `storage.backend`.
pub async fn create_storage(cfg: &AppConfig) -> anyhow::Result<DynStorage> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage; data is lost on restart");
            Ok(intake_db_memory::create_storage())
        }
        StorageBackend::Postgres => {
            let pg = cfg.storage.postgres.to_postgres_config();
            let storage: DynStorage = intake_db_postgres::create_storage(pg).await?;
            Ok(storage)
        }
    }
}

/// Builds the full application: store plus router.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let storage = create_storage(cfg).await?;
    Ok(build_router(AppState::new(cfg.clone(), storage)))
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(routes::application_routes())
        .merge(routes::phone_number_routes())
        .with_state(state)
        // Layers wrap inside-out: request id runs first so the trace span can see it
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(app_middleware::content_negotiation))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct IntakeServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    storage: Option<DynStorage>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            storage: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses an already opened store instead of the configured backend.
    pub fn with_storage(mut self, storage: DynStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn build(self) -> anyhow::Result<IntakeServer> {
        let storage = match self.storage {
            Some(storage) => storage,
            None => create_storage(&self.config).await?,
        };
        tracing::info!(backend = storage.backend_name(), "Storage ready");

        let app = build_router(AppState::new(self.config, storage));
        Ok(IntakeServer {
            addr: self.addr,
            app,
        })
    }
}

impl IntakeServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
