//! HTTP server for the metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::registry::Registry;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
}

/// Create the HTTP router.
pub fn create_router(registry: Arc<Registry>, metrics_path: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/", get(index_handler))
        .route(metrics_path, get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Informational landing page.
async fn index_handler() -> Html<&'static str> {
    Html(r#"PDU metrics are at <a href="/metrics">/metrics</a>"#)
}

/// Handler for the metrics endpoint.
///
/// Devices are selected with repeatable `endpoint=` (or `endpoint[]=`)
/// query parameters; omitting them, or passing the literal `all`, scrapes
/// every registered device. A selector that matches nothing is reported as
/// a client error rather than an empty success.
async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let selectors: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "endpoint" || key == "endpoint[]")
        .map(|(_, value)| value)
        .collect();

    debug!(?selectors, "Metrics scrape");

    match state.registry.select(&selectors) {
        Ok(selected) => {
            let body = state.registry.encode(&selected);
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response(),
    }
}

/// HTTP server wrapper with graceful shutdown.
pub struct HttpServer {
    registry: Arc<Registry>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(registry: Arc<Registry>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            registry,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received. In-flight
    /// scrape responses finish; poller shutdown does not touch them.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.registry, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
