pub mod config;
pub mod confirmation;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod reconcile;
pub mod routes;
pub mod server;

pub use config::{AppConfig, PostgresStorageConfig, ServerConfig, StorageBackend};
pub use observability::init_tracing;
pub use reconcile::{ReconcileError, ReconcileResult, reconcile};
pub use server::{AppState, IntakeServer, ServerBuilder, build_app, build_router, create_storage};
