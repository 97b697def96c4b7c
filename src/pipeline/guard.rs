//! Per-cycle duplicate series suppression.

use crate::core::Series;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Agent namespaces that report one disk under two dimension names.
pub const DEFAULT_GUARDED_NAMESPACES: &[&str] = &["AGT.ECS", "SERVICE.BMS"];

const DEFAULT_LABEL_ALIASES: &[(&str, &str)] = &[("mount_point", "disk")];

/// Remembers the identity of every series emitted for the guarded
/// namespaces during one cycle and rejects repeats.
#[derive(Debug)]
pub struct ConflictGuard {
    guarded: HashSet<String>,
    aliases: HashMap<String, String>,
    seen: RwLock<HashSet<String>>,
    suppressed: AtomicUsize,
}

impl Default for ConflictGuard {
    fn default() -> Self {
        Self::new(DEFAULT_GUARDED_NAMESPACES.iter().copied())
    }
}

impl ConflictGuard {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            guarded: namespaces.into_iter().map(Into::into).collect(),
            aliases: DEFAULT_LABEL_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            seen: RwLock::new(HashSet::new()),
            suppressed: AtomicUsize::new(0),
        }
    }

    pub fn applies_to(&self, namespace: &str) -> bool {
        self.guarded.contains(namespace)
    }

    /// `name{label=value,...}` with labels sorted and aliases resolved.
    pub fn series_key(&self, series: &Series) -> String {
        let mut pairs: Vec<String> = series
            .labels
            .iter()
            .map(|(name, value)| {
                let name = self.aliases.get(name).map_or(name, String::as_str);
                format!("{}={}", name, value)
            })
            .collect();
        pairs.sort_unstable();
        format!("{}{{{}}}", series.name, pairs.join(","))
    }

    /// True if the series may be emitted. Always true outside the guarded
    /// namespaces; otherwise true only for the first series with its key.
    pub fn admit(&self, namespace: &str, series: &Series) -> bool {
        if !self.applies_to(namespace) {
            return true;
        }

        let key = self.series_key(series);
        if self.seen.read().contains(&key) {
            self.suppress(namespace, &key);
            return false;
        }

        if !self.seen.write().insert(key.clone()) {
            self.suppress(namespace, &key);
            return false;
        }
        true
    }

    fn suppress(&self, namespace: &str, key: &str) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        debug!(namespace, series = key, "Suppressed duplicate series");
    }

    /// Number of rejected series so far.
    pub fn suppressed(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Number of distinct keys admitted so far.
    pub fn len(&self) -> usize {
        self.seen.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.read().is_empty()
    }
}
