//! ClaimIt API Server

mod auth;
mod db;
mod error;
mod routes;
mod rules;

use axum::{
    routing::{get, post},
    Router,
};
use claimit_core::DocumentStore;
use sqlx::postgres::PgPoolOptions;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: AppConfig,
}

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub max_connections: u32,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using default", key);
        default.to_string()
    })
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not valid, using default", key);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "postgres://localhost/claimit"),
            jwt_secret: env_or("JWT_SECRET", "development-secret-change-in-production"),
            bind_addr: env_or("CLAIMIT_BIND_ADDR", "0.0.0.0:3000"),
            max_connections: env_parse("CLAIMIT_MAX_CONNECTIONS", 10),
        }
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(routes::health_check))

        // Identity
        .route("/api/auth/me", get(routes::auth::me))

        // Documents
        .route(
            "/api/documents/*path",
            get(routes::documents::get_document)
                .post(routes::documents::add_document)
                .patch(routes::documents::update_document)
                .delete(routes::documents::delete_document),
        )
        .route("/api/query", post(routes::documents::run_query))
        .route("/api/batch", post(routes::documents::commit_batch))

        // CORS
        .layer(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any))

        // Tracing
        .layer(TraceLayer::new_for_http())

        // State
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "claimit_api=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ClaimIt API Server");

    let config = AppConfig::from_env();

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    info!("Database migrations complete");

    let store: Arc<dyn DocumentStore> = Arc::new(db::PgDocumentStore::new(pool));
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState { store, config });
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_numbers_fall_back() {
        std::env::set_var("CLAIMIT_TEST_MAX_CONNECTIONS", "many");
        assert_eq!(env_parse("CLAIMIT_TEST_MAX_CONNECTIONS", 10u32), 10);

        std::env::set_var("CLAIMIT_TEST_MAX_CONNECTIONS", "4");
        assert_eq!(env_parse("CLAIMIT_TEST_MAX_CONNECTIONS", 10u32), 4);
    }
}
