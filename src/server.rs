//! HTTP scrape endpoint.
//!
//! Every `GET {metric_path}?services=NS1,NS2` runs one collection cycle for
//! the listed namespaces and answers with whatever series the cycle produced
//! before it finished or timed out.

use crate::core::{BridgeError, Config, Result, Series};
use crate::exposition;
use crate::pipeline::{Collector, Sink};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Series buffered between the cycle and the response.
const SINK_CAPACITY: usize = 1024;

/// Server state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    collector: Collector,
    scrape_timeout: Duration,
}

/// Query parameters of a scrape.
#[derive(Debug, Deserialize)]
struct ScrapeQuery {
    /// Comma-separated namespaces
    services: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl AppState {
    pub fn new(collector: Collector, scrape_timeout: Duration) -> Self {
        Self {
            collector,
            scrape_timeout,
        }
    }

    /// Runs one cycle and gathers its series.
    ///
    /// The cycle is cancelled when the timeout elapses or when the returned
    /// future is dropped; series already buffered are kept.
    pub async fn scrape(&self, namespaces: Vec<String>) -> Vec<Series> {
        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();
        let (sink, mut rx) = Sink::channel(SINK_CAPACITY, token.clone());
        let sink = Arc::new(sink);

        let collector = self.collector.clone();
        let cycle = tokio::spawn(async move { collector.collect(&namespaces, sink).await });

        let deadline = tokio::time::sleep(self.scrape_timeout);
        tokio::pin!(deadline);

        let mut series = Vec::new();
        let mut timed_out = false;
        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(s) => series.push(s),
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                },
            }
        }

        if timed_out {
            token.cancel();
            while let Ok(s) = rx.try_recv() {
                series.push(s);
            }
            warn!(
                timeout = ?self.scrape_timeout,
                collected = series.len(),
                "Scrape timed out, returning partial result"
            );
        } else {
            match cycle.await {
                Ok(report) => debug!(?report, "Scrape finished"),
                Err(e) => warn!(error = %BridgeError::from(e), "Collection cycle aborted"),
            }
        }

        series
    }
}

/// Splits `services`, dropping blanks.
fn parse_services(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Routes of the exporter.
pub fn router(state: AppState, metric_path: &str) -> Router {
    Router::new()
        .route(metric_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until Ctrl-C.
pub async fn start_server(config: &Config, collector: Collector) -> Result<()> {
    let addr = config.global.socket_addr()?;
    let state = AppState::new(collector, config.global.scrape_timeout);
    let app = router(state, &config.global.metric_path);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        BridgeError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    info!(
        "Serving metrics on http://{}{}",
        addr, config.global.metric_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, stopping...");
}

/// GET {metric_path}?services=...
async fn metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<ScrapeQuery>,
) -> Response {
    let namespaces = parse_services(query.services.as_deref());
    if namespaces.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing 'services' query parameter".to_string(),
                code: 400,
            }),
        )
            .into_response();
    }

    let series = state.scrape(namespaces).await;
    match exposition::render(&series) {
        Ok(body) => ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(error = %e, category = e.category(), "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: 500,
                }),
            )
                .into_response()
        },
    }
}

/// GET /health
async fn health_handler() -> &'static str {
    "ok"
}
