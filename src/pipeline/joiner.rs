//! Resource key derivation and label joining.

use super::collector::QueryWindow;
use crate::core::types::{build_fq_name, normalize_label_name, normalize_namespace};
use crate::core::{
    BridgeError, Config, MetricIdentifier, MetricSeriesData, ResourceKey, ResourceLabel, Result,
    Series,
};
use std::collections::HashMap;

/// Namespaces whose resource identity is a single dimension.
const DEFAULT_KEY_OVERRIDES: &[(&str, &str)] = &[
    ("SYS.DMS", "kafka_instance_id"),
    ("AGT.ECS", "instance_id"),
    ("SYS.MRS", "cluster_id"),
];

/// Dimensions that add a resource-kind segment to the metric name.
const RESOURCE_KIND_SUFFIXES: &[(&str, &str)] = &[
    ("lbaas_listener_id", "listener"),
    ("lb_instance_id", "lb"),
    ("direct_connect_id", "direct"),
    ("history_direct_connect_id", "history"),
    ("virtual_interface_id", "virtual"),
    ("bandwidth_id", "bandwidth"),
    ("publicip_id", "eip"),
];

/// Maps a metric identifier to the key of its resource in the label cache.
#[derive(Debug, Clone)]
pub struct ResourceKeyRules {
    overrides: HashMap<String, Vec<String>>,
}

impl Default for ResourceKeyRules {
    fn default() -> Self {
        let overrides = DEFAULT_KEY_OVERRIDES
            .iter()
            .map(|(ns, dim)| (ns.to_string(), vec![dim.to_string()]))
            .collect();
        Self { overrides }
    }
}

impl ResourceKeyRules {
    /// Built-in overrides, replaced per namespace by
    /// `resource_key_dimensions` where configured.
    pub fn from_config(config: &Config) -> Self {
        let mut rules = Self::default();
        for (namespace, settings) in &config.namespaces {
            if !settings.resource_key_dimensions.is_empty() {
                rules.set_override(namespace.as_str(), settings.resource_key_dimensions.clone());
            }
        }
        rules
    }

    pub fn set_override(&mut self, namespace: impl Into<String>, dimensions: Vec<String>) {
        self.overrides.insert(namespace.into(), dimensions);
    }

    /// Key of the resource a series belongs to.
    ///
    /// By default the dimension values sorted by dimension name and joined
    /// with `.`. For namespaces with an override, the value of the first
    /// override dimension present; an empty key when none is present.
    pub fn resource_key(&self, identifier: &MetricIdentifier) -> ResourceKey {
        if let Some(preferred) = self.overrides.get(&identifier.namespace) {
            return preferred
                .iter()
                .find_map(|name| {
                    identifier
                        .dimensions
                        .iter()
                        .find(|dim| &dim.name == name)
                        .map(|dim| dim.value.clone())
                })
                .unwrap_or_default();
        }

        let mut dimensions: Vec<_> = identifier.dimensions.iter().collect();
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        dimensions
            .iter()
            .map(|dim| dim.value.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Resource-kind name segment; the last matching dimension wins.
pub fn resource_kind(identifier: &MetricIdentifier) -> Option<&'static str> {
    identifier.dimensions.iter().rev().find_map(|dim| {
        RESOURCE_KIND_SUFFIXES
            .iter()
            .find(|(name, _)| *name == dim.name)
            .map(|(_, kind)| *kind)
    })
}

/// Turns fetched series into exportable samples.
#[derive(Debug, Clone)]
pub struct LabelJoiner {
    prefix: String,
    rules: ResourceKeyRules,
    export_timestamps: bool,
}

impl LabelJoiner {
    pub fn new(prefix: impl Into<String>, rules: ResourceKeyRules) -> Self {
        Self {
            prefix: prefix.into(),
            rules,
            export_timestamps: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.global.prefix.as_str(), ResourceKeyRules::from_config(config))
            .with_timestamps(config.global.export_timestamps)
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.export_timestamps = enabled;
        self
    }

    pub fn rules(&self) -> &ResourceKeyRules {
        &self.rules
    }

    /// `prefix_<namespace>[_<kind>]_<metric>`
    pub fn metric_name(&self, identifier: &MetricIdentifier) -> String {
        let namespace = normalize_namespace(&identifier.namespace);
        build_fq_name(&[
            &self.prefix,
            &namespace,
            resource_kind(identifier).unwrap_or(""),
            &identifier.metric_name,
        ])
    }

    /// Freshness gauge of a namespace: `prefix_<namespace>_duration_seconds`,
    /// how far the newest exported datapoint lags behind the window end.
    pub fn lag_series(&self, namespace: &str, lag_ms: i64) -> Series {
        let namespace = normalize_namespace(namespace);
        Series {
            name: build_fq_name(&[&self.prefix, &namespace, "duration_seconds"]),
            labels: ResourceLabel::default(),
            value: lag_ms as f64 / 1000.0,
            timestamp_ms: None,
        }
    }

    /// Joins one series with the cached labels of its namespace.
    ///
    /// Returns `Ok(None)` when `window` holds no datapoint. A cache miss
    /// yields the intrinsic labels only. Fails with
    /// [`BridgeError::LabelMismatch`] when the joined names and values do
    /// not line up.
    pub fn join(
        &self,
        data: &MetricSeriesData,
        window: QueryWindow,
        cached: Option<&HashMap<ResourceKey, ResourceLabel>>,
    ) -> Result<Option<Series>> {
        let Some(latest) = data.latest_within(window.from, window.to) else {
            return Ok(None);
        };

        let identifier = &data.identifier;
        let name = self.metric_name(identifier);

        let mut labels = ResourceLabel::with_capacity(identifier.dimensions.len() + 1);
        for dim in &identifier.dimensions {
            labels.push(normalize_label_name(&dim.name), dim.value.as_str());
        }

        let key = self.rules.resource_key(identifier);
        if let Some(resource) = cached.and_then(|by_key| by_key.get(&key)) {
            labels.push("unit", data.unit.as_str());
            if resource.is_consistent() {
                for (label, value) in resource.iter() {
                    if !labels.contains_name(label) {
                        labels.push(label, value);
                    }
                }
            } else {
                labels.names.extend(resource.names.iter().cloned());
                labels.values.extend(resource.values.iter().cloned());
            }
        }

        if !labels.is_consistent() {
            return Err(BridgeError::LabelMismatch {
                metric: name,
                names: labels.names.len(),
                values: labels.values.len(),
            });
        }

        Ok(Some(Series {
            name,
            labels,
            value: latest.average,
            timestamp_ms: self.export_timestamps.then_some(latest.timestamp),
        }))
    }
}
