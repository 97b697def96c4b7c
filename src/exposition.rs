//! Prometheus text format (0.0.4) rendering.
//!
//! Each scrape gets a fresh [`Registry`] holding only the gauges of its
//! cycle. Series whose name or labels the registry would reject are logged
//! and left out instead of corrupting the whole response.

use crate::core::{BridgeError, Result, Series};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// The gauges of one finished cycle, grouped into families by name.
struct CycleGauges {
    descs: Vec<Desc>,
    families: Vec<MetricFamily>,
}

impl CycleGauges {
    fn from_series(series: &[Series]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<Metric>> = BTreeMap::new();
        let mut seen = HashSet::new();

        for s in series {
            if let Err(e) = validate(s) {
                warn!(metric = %s.name, error = %e, "Dropping series rejected by exposition");
                continue;
            }
            if !seen.insert(sample_key(s)) {
                debug!(metric = %s.name, "Dropping duplicate sample");
                continue;
            }
            grouped.entry(s.name.as_str()).or_default().push(to_metric(s));
        }

        let mut descs = Vec::with_capacity(grouped.len());
        let mut families = Vec::with_capacity(grouped.len());
        for (name, metrics) in grouped {
            match Desc::new(name.to_string(), name.to_string(), Vec::new(), HashMap::new()) {
                Ok(desc) => descs.push(desc),
                Err(e) => {
                    warn!(metric = %name, error = %e, "Dropping metric family");
                    continue;
                },
            }

            let mut family = MetricFamily::default();
            family.set_name(name.to_string());
            family.set_help(name.to_string());
            family.set_field_type(MetricType::GAUGE);
            for metric in metrics {
                family.mut_metric().push(metric);
            }
            families.push(family);
        }

        Self { descs, families }
    }
}

impl Collector for CycleGauges {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families.clone()
    }
}

/// Checks the metric name and label names the way the registry does.
fn validate(series: &Series) -> Result<()> {
    let names: Vec<String> = series.labels.names.clone();
    let unique: HashSet<&str> = names.iter().map(String::as_str).collect();
    if unique.len() != names.len() {
        return Err(BridgeError::Exposition(prometheus::Error::Msg(format!(
            "duplicate label name in {:?}",
            names
        ))));
    }
    Desc::new(series.name.clone(), series.name.clone(), names, HashMap::new())?;
    Ok(())
}

/// Name plus sorted label pairs; one sample per key is allowed.
fn sample_key(series: &Series) -> (String, Vec<(&str, &str)>) {
    let mut pairs: Vec<(&str, &str)> = series.labels.iter().collect();
    pairs.sort_unstable();
    (series.name.clone(), pairs)
}

fn to_metric(series: &Series) -> Metric {
    let mut metric = Metric::default();
    for (name, value) in series.labels.iter() {
        let mut pair = LabelPair::default();
        pair.set_name(name.to_string());
        pair.set_value(value.to_string());
        metric.mut_label().push(pair);
    }

    let mut gauge = Gauge::default();
    gauge.set_value(series.value);
    metric.set_gauge(gauge);
    if let Some(ts) = series.timestamp_ms {
        metric.set_timestamp_ms(ts);
    }
    metric
}

/// Renders a finished series set as gauges.
///
/// Families are sorted by name and samples by label values.
pub fn render(series: &[Series]) -> Result<String> {
    let gauges = CycleGauges::from_series(series);
    if gauges.families.is_empty() {
        return Ok(String::new());
    }

    let registry = Registry::new();
    registry.register(Box::new(gauges))?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| BridgeError::decode(e.to_string()))
}
