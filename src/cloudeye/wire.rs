//! JSON payloads of the monitoring API.

use crate::core::{Datapoint, Dimension, MetricIdentifier, MetricSeriesData};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListMetricsResponse {
    #[serde(default)]
    pub metrics: Vec<MetricInfo>,
    #[serde(default)]
    pub meta_data: Option<MetaData>,
}

#[derive(Debug, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl ListMetricsResponse {
    /// Marker of the next page, `None` when the listing is exhausted.
    pub fn next_marker(&self) -> Option<&str> {
        self.meta_data
            .as_ref()
            .and_then(|meta| meta.marker.as_deref())
            .filter(|marker| !marker.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricInfo {
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl From<MetricInfo> for MetricIdentifier {
    fn from(info: MetricInfo) -> Self {
        MetricIdentifier {
            namespace: info.namespace,
            metric_name: info.metric_name,
            dimensions: info.dimensions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchQueryRequest<'a> {
    pub metrics: &'a [MetricIdentifier],
    pub from: i64,
    pub to: i64,
    pub period: &'static str,
    pub filter: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct BatchQueryResponse {
    #[serde(default)]
    pub metrics: Vec<BatchMetricData>,
}

#[derive(Debug, Deserialize)]
pub struct BatchMetricData {
    #[serde(default)]
    pub namespace: Option<String>,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub datapoints: Vec<WireDatapoint>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireDatapoint {
    #[serde(default)]
    pub average: Option<f64>,
    pub timestamp: i64,
}

impl BatchMetricData {
    /// Converts to the domain type. Datapoints without an average are dropped.
    pub fn into_series(self, fallback_namespace: &str) -> MetricSeriesData {
        let namespace = self
            .namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| fallback_namespace.to_string());
        let datapoints = self
            .datapoints
            .into_iter()
            .filter_map(|point| {
                point.average.map(|average| Datapoint {
                    average,
                    timestamp: point.timestamp,
                })
            })
            .collect();

        MetricSeriesData {
            identifier: MetricIdentifier {
                namespace,
                metric_name: self.metric_name,
                dimensions: self.dimensions,
            },
            unit: self.unit.unwrap_or_default(),
            datapoints,
        }
    }
}
