//! REST front end
//!
//! Serves collector metadata and dump lookups over HTTP. With a cache store
//! attached, `/data` reads the store first and falls back to a live find
//! whose results are written back.

pub mod api;

pub use api::{create_router, parse_data_request, DataRequest, ErrorResponse, HealthResponse};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::finder::Finder;
use crate::storage::DumpStore;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub finder: Arc<dyn Finder>,

    /// Cache store; `None` means every request goes to the archives
    pub store: Option<Arc<dyn DumpStore>>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(finder: Arc<dyn Finder>, store: Option<Arc<dyn DumpStore>>) -> Self {
        Self {
            finder,
            store,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// API Server
// ============================================================================

pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves, then drain in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.bind_address()?;

        tracing::info!(
            %addr,
            cache = self.state.store.is_some(),
            "Starting bgpfinder server"
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::MultiFinder;

    fn server(host: &str) -> ApiServer {
        let config = ServerConfig {
            host: host.to_string(),
            ..Default::default()
        };
        ApiServer::new(config, AppState::new(Arc::new(MultiFinder::new(Vec::new())), None))
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(server("127.0.0.1").bind_address().unwrap().port(), 8080);
        assert!(matches!(
            server("not a host").bind_address(),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_state_without_store() {
        assert!(server("0.0.0.0").state().store.is_none());
    }
}
