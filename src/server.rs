//! Server module for Scrawl
//!
//! Contains configuration loading and the main server runtime.

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Json, Router};
use config::{Config, Environment, File, FileFormat};
use scrawl_hub::{HmacTokenVerifier, HubConfig, HubState, SqliteRoomStore};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub hub: HubSettings,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How many successive ports to try when the configured one is taken
    #[serde(default = "default_port_fallback_attempts")]
    pub port_fallback_attempts: u16,
}

fn default_port_fallback_attempts() -> u16 {
    3
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the token-issuing service
    pub secret: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Hub tuning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            store_timeout_secs: default_store_timeout(),
            ping_interval_secs: default_ping_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

fn default_store_timeout() -> u64 {
    scrawl_hub::websocket::STORE_TIMEOUT_SECS
}

fn default_ping_interval() -> u64 {
    scrawl_hub::websocket::PING_INTERVAL_SECS
}

fn default_heartbeat_timeout() -> u64 {
    scrawl_hub::websocket::HEARTBEAT_TIMEOUT_SECS
}

impl HubSettings {
    fn to_hub_config(&self) -> HubConfig {
        HubConfig {
            store_timeout: Duration::from_secs(self.store_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        }
    }
}

/// Embedded default configuration (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load configuration from files and environment
pub(crate) fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority), e.g. SCRAWL_SERVER__PORT
        .add_source(
            Environment::with_prefix("SCRAWL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Warn about configurations that are unsafe outside local development
fn validate_config(config: &AppConfig) {
    let exposed = config.server.host != "127.0.0.1" && config.server.host != "localhost";

    if exposed && config.auth.secret == "dev-secret-change-me" {
        warn!(
            "SECURITY WARNING: the development auth secret is in use while the server \
             is exposed externally. Set SCRAWL_AUTH__SECRET before going further."
        );
    }

    if config.server.host == "0.0.0.0" {
        warn!(
            "Server is binding to all interfaces (0.0.0.0). Consider binding to \
             127.0.0.1 and using a reverse proxy."
        );
    }
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Detailed health check response
#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    database: ComponentHealth,
    active_connections: usize,
    active_rooms: usize,
}

/// Component health status
#[derive(Debug, Serialize)]
struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Simple health check endpoint (for load balancers)
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Detailed health check with store connectivity and hub counters
async fn detailed_health_check(
    Extension(pool): Extension<SqlitePool>,
    Extension(state): Extension<Arc<HubState>>,
) -> Json<DetailedHealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => ComponentHealth {
            status: "healthy",
            error: None,
        },
        Err(e) => ComponentHealth {
            status: "unhealthy",
            error: Some(e.to_string()),
        },
    };

    let status = if database.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database,
        active_connections: state.registry.connection_count(),
        active_rooms: state.registry.room_count(),
    })
}

/// Bind the listener, walking forward through ports when the configured one
/// is already taken
async fn bind_with_fallback(server: &ServerConfig) -> Result<tokio::net::TcpListener> {
    let mut port = server.port;
    let mut attempts_left = server.port_fallback_attempts;

    loop {
        let addr: SocketAddr = format!("{}:{}", server.host, port)
            .parse()
            .context("Invalid server address")?;

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempts_left > 0 => {
                warn!(port, "port in use, trying {}", port + 1);
                port += 1;
                attempts_left -= 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to bind to {}:{}", server.host, port))
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}

/// Run the server
pub async fn run(host_override: Option<String>, port_override: Option<u16>) -> Result<()> {
    info!("Starting Scrawl v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config().context("Failed to load configuration")?;
    if let Some(host) = host_override {
        config.server.host = host;
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }
    info!("Configuration loaded");

    validate_config(&config);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await
        .with_context(|| format!("Failed to connect to database at {}", config.database.url))?;

    let store = SqliteRoomStore::new(pool.clone());
    store.init().await.context("Failed to initialize database schema")?;
    store.ping().await.context("Database did not answer startup check")?;
    info!(url = %config.database.url, "Room store initialized");

    let verifier = Arc::new(HmacTokenVerifier::new(config.auth.secret.as_bytes().to_vec()));

    let state = Arc::new(
        HubState::new(verifier, Arc::new(store)).with_config(config.hub.to_hub_config()),
    );

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .route("/", get(|| async { "Scrawl collaboration hub" }))
        .merge(crate::websocket::websocket_router(Arc::clone(&state)))
        .layer(Extension(pool))
        .layer(Extension(state));

    let listener = bind_with_fallback(&config.server).await?;
    let addr = listener.local_addr().context("Failed to read local address")?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Scrawl shutdown complete");
    Ok(())
}
