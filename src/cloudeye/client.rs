//! HTTP client of the monitoring API.

use super::wire::{BatchQueryRequest, BatchQueryResponse, ListMetricsResponse};
use super::{authorize, ensure_success, http_client, MetricCatalog, MetricDataFetcher};
use crate::core::config::CloudConfig;
use crate::core::{BridgeError, MetricIdentifier, MetricSeriesData, Result};
use tracing::{debug, warn};

/// Page size of catalog listings.
const LIST_PAGE_LIMIT: u32 = 1000;

/// Monitoring API client implementing both pipeline collaborators.
#[derive(Debug, Clone)]
pub struct CesClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    token: Option<String>,
}

impl CesClient {
    /// Create a client from the cloud section of the configuration.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let http = http_client(config.request_timeout)?;
        Ok(Self::with_client(
            http,
            &config.ces_endpoint,
            &config.project_id,
            config.auth_token.clone(),
        ))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        endpoint: &str,
        project_id: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/V1.0/{}/{}", self.endpoint, self.project_id, path)
    }

    async fn list_page(&self, namespace: &str, marker: Option<&str>) -> Result<ListMetricsResponse> {
        let limit = LIST_PAGE_LIMIT.to_string();
        let mut query = vec![("namespace", namespace), ("limit", limit.as_str())];
        if let Some(marker) = marker {
            query.push(("start", marker));
        }

        let request = self.http.get(self.url("metrics")).query(&query);
        let response = authorize(request, self.token.as_deref()).send().await?;
        let response = ensure_success(response).await?;
        response
            .json::<ListMetricsResponse>()
            .await
            .map_err(|e| BridgeError::decode(format!("metric list page: {}", e)))
    }
}

#[async_trait::async_trait]
impl MetricCatalog for CesClient {
    async fn list_all(&self, namespace: &str) -> Result<Vec<MetricIdentifier>> {
        let mut metrics = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self.list_page(namespace, marker.as_deref()).await?;
            if page.metrics.is_empty() {
                break;
            }
            let next = page.next_marker().map(str::to_string);
            metrics.extend(page.metrics.into_iter().map(MetricIdentifier::from));

            match next {
                None => break,
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    warn!(namespace, marker = %next, "Catalog returned the same marker twice, stopping");
                    break;
                },
                Some(next) => marker = Some(next),
            }
        }

        debug!(namespace, count = metrics.len(), "Listed metric catalog");
        Ok(metrics)
    }
}

#[async_trait::async_trait]
impl MetricDataFetcher for CesClient {
    async fn batch_query(
        &self,
        metrics: &[MetricIdentifier],
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricSeriesData>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        let body = BatchQueryRequest {
            metrics,
            from,
            to,
            period: "1",
            filter: "average",
        };
        let request = self
            .http
            .post(self.url("batch-query-metric-data"))
            .json(&body);
        let response = authorize(request, self.token.as_deref()).send().await?;
        let response = ensure_success(response).await?;
        let decoded = response
            .json::<BatchQueryResponse>()
            .await
            .map_err(|e| BridgeError::decode(format!("batch query response: {}", e)))?;

        let fallback_namespace = metrics[0].namespace.as_str();
        Ok(decoded
            .metrics
            .into_iter()
            .map(|data| data.into_series(fallback_namespace))
            .collect())
    }
}
