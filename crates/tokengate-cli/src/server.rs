//! Axum front end with the gate in front of the upstream

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use tokengate_core::{Gate, GateLayer};

use crate::proxy::Upstream;

/// The gate server
pub struct GateServer {
    gate: Arc<Gate>,
    upstream: Arc<Upstream>,
    bind: SocketAddr,
}

impl GateServer {
    pub fn new(bind: SocketAddr, gate: Gate, upstream: Upstream) -> Self {
        Self {
            gate: Arc::new(gate),
            upstream: Arc::new(upstream),
            bind,
        }
    }

    /// Build the Axum router.
    ///
    /// The gate is the outermost layer: request tracing only ever sees
    /// requests that were forwarded, never a redirect that still carries a
    /// query token. Spans record the path but not the query string.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.upstream.clone())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }))
            .layer(GateLayer::from_shared(self.gate.clone()))
    }

    /// Start the server (blocks until Ctrl-C)
    pub async fn run(self) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("tokengate listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("tokengate stopped");
        Ok(())
    }
}

async fn proxy_handler(State(upstream): State<Arc<Upstream>>, req: Request) -> Response {
    upstream.forward(req).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
