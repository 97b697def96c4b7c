//! Monitoring API collaborators.
//!
//! The pipeline only depends on the two traits below; [`CesClient`] is the
//! HTTP implementation used in production.

pub mod client;
pub mod wire;

pub use client::CesClient;

use crate::core::{BridgeError, MetricIdentifier, MetricSeriesData, Result};
use std::time::Duration;

/// Enumerates every metric identifier of a namespace.
#[async_trait::async_trait]
pub trait MetricCatalog: Send + Sync {
    /// Walks all pages of the catalog for `namespace`.
    async fn list_all(&self, namespace: &str) -> Result<Vec<MetricIdentifier>>;
}

/// Queries time-series values for a batch of identifiers.
#[async_trait::async_trait]
pub trait MetricDataFetcher: Send + Sync {
    /// One request for the whole batch over `[from, to)`, in epoch milliseconds.
    async fn batch_query(
        &self,
        metrics: &[MetricIdentifier],
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricSeriesData>>;
}

/// Header carrying the pre-issued API token.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Builds the HTTP client shared by the remote API adapters.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(BridgeError::from)
}

/// Turns a non-success response into [`BridgeError::Status`].
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Attaches the token header when one is configured.
pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.header(AUTH_HEADER, token),
        None => request,
    }
}
