//! HTTP surface of the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware (trace, optional CORS)
//! - **Domain services** (`PortService`, `InboundGateway`) and the storage
//!   backend shared through `ApiState`
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/devices/:id/ports` - Port list of a device
//! - `POST /api/devices/:id/ports/scan` - Probe the known-port catalog
//! - `POST /api/devices/:id/ports/scan-custom` - Probe one arbitrary port
//! - `PATCH /api/devices/:id/ports/:port` - Toggle monitoring of a port
//! - `DELETE /api/devices/:id/ports/:port` - Remove a custom port
//! - `GET /api/devices/:id/history` - Availability history
//! - `POST /api/inbound/messages` - Queue an external message
//! - `GET /api/logs` - Recent delivery jobs and operational log entries

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, patch, post},
};
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8000")
    pub bind_addr: SocketAddr,

    /// Enable CORS for the dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: true,
        }
    }
}

impl From<crate::config::ApiSettings> for ApiConfig {
    fn from(settings: crate::config::ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind_addr,
            enable_cors: settings.enable_cors,
        }
    }
}

/// Build the router with every route and layer
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/devices/:id/ports", get(routes::ports::list_ports))
        .route(
            "/api/devices/:id/ports/scan",
            post(routes::ports::scan_known_ports),
        )
        .route(
            "/api/devices/:id/ports/scan-custom",
            post(routes::ports::scan_custom_port),
        )
        .route(
            "/api/devices/:id/ports/:port",
            patch(routes::ports::set_port_monitoring).delete(routes::ports::delete_port),
        )
        .route(
            "/api/devices/:id/history",
            get(routes::history::get_device_history),
        )
        .route(
            "/api/inbound/messages",
            post(routes::inbound::submit_message),
        )
        .route("/api/logs", get(routes::logs::get_logs))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
