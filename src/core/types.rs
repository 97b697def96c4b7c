//! Domain types shared by the collection pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Key of one resource inside a namespace's label cache.
pub type ResourceKey = String;

/// A named axis of a metric series, e.g. `instance_id=abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Identity of one metric series as known by the monitoring API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricIdentifier {
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl MetricIdentifier {
    pub fn new(namespace: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimensions: Vec::new(),
        }
    }

    /// Adds a dimension, keeping insertion order.
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.push(Dimension::new(name, value));
        self
    }
}

impl fmt::Display for MetricIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.metric_name)?;
        for dim in &self.dimensions {
            write!(f, ",{}={}", dim.name, dim.value)?;
        }
        Ok(())
    }
}

/// One aggregated sample returned by the monitoring API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub average: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Time-series values of one metric over the query window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeriesData {
    pub identifier: MetricIdentifier,
    pub unit: String,
    pub datapoints: Vec<Datapoint>,
}

impl MetricSeriesData {
    /// The most recent datapoint inside `[from, to)`, if any.
    ///
    /// Exported series carry the current value of a gauge, so only the
    /// latest sample matters. Points the server returns outside the
    /// queried window are ignored.
    pub fn latest_within(&self, from: i64, to: i64) -> Option<&Datapoint> {
        self.datapoints
            .iter()
            .filter(|point| point.timestamp >= from && point.timestamp < to)
            .max_by_key(|point| point.timestamp)
    }
}

/// Enrichment labels of one resource, held as parallel name/value sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLabel {
    pub names: Vec<String>,
    pub values: Vec<String>,
}

impl ResourceLabel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            names: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Builds a label set from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut label = Self::new();
        for (name, value) in pairs {
            label.push(name, value);
        }
        label
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.names.push(name.into());
        self.values.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// True when names and values line up one to one.
    pub fn is_consistent(&self) -> bool {
        self.names.len() == self.values.len()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Iterates over `(name, value)` pairs. Stops at the shorter sequence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .zip(self.values.iter())
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Everything a provider knows about the resources of one namespace.
#[derive(Debug, Clone, Default)]
pub struct ResourceInfo {
    pub labels: HashMap<ResourceKey, ResourceLabel>,
    /// Pre-filtered identifiers. Empty means "ask the metric catalog".
    pub filter_metrics: Vec<MetricIdentifier>,
}

/// A finished sample ready for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub labels: ResourceLabel,
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

/// Lowercases a namespace and replaces `.` with `_`: `SYS.ECS` -> `sys_ecs`.
pub fn normalize_namespace(namespace: &str) -> String {
    namespace.replace('.', "_").to_lowercase()
}

/// Dimension names may contain `-`, which is not valid in a label name.
pub fn normalize_label_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Joins the non-empty parts with `_`.
pub fn build_fq_name(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}
