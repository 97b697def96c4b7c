//! Configuration management for the bridge.
//!
//! This module provides:
//! - YAML file support
//! - CLI argument overrides (applied through [`ConfigBuilder`])
//! - Validation and defaults

use crate::cache::RefreshPolicy;
use crate::core::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Largest batch the monitoring API accepts in one batch query.
pub const MAX_BATCH_SIZE: usize = 500;

/// Complete configuration for the bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scrape and pipeline settings
    pub global: GlobalConfig,
    /// Remote API endpoints and credentials
    pub cloud: CloudConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Per-namespace overrides, keyed by namespace (`SYS.ECS`)
    pub namespaces: HashMap<String, NamespaceConfig>,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Scrape and pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Listen address. A bare `:port` binds all interfaces.
    pub bind_address: String,
    /// Path of the scrape endpoint
    pub metric_path: String,
    /// Vendor prefix of every exported metric name
    pub prefix: String,
    /// Maximum number of batch queries in flight across all namespaces
    pub max_routines: usize,
    /// Number of metric identifiers per batch query
    pub scrape_batch_size: usize,
    /// Lifetime of cached resource labels
    #[serde(with = "humantime_serde")]
    pub resource_ttl: Duration,
    /// Shifts the query window into the past
    #[serde(with = "humantime_serde")]
    pub retrieve_offset: Duration,
    /// Length of the query window ending at `now - retrieve_offset`
    #[serde(with = "humantime_serde")]
    pub query_window: Duration,
    /// A scrape is cancelled after this long
    #[serde(with = "humantime_serde")]
    pub scrape_timeout: Duration,
    /// Attach datapoint timestamps to exported samples
    pub export_timestamps: bool,
}

/// Remote API endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Monitoring (CES) API base URL
    pub ces_endpoint: String,
    /// Resource management (RMS) API base URL
    pub rms_endpoint: String,
    /// Project the metrics belong to
    pub project_id: String,
    /// Account domain, required by resource enumeration
    pub domain_id: String,
    /// Region of the monitored resources
    pub region: String,
    /// Pre-issued API token
    pub auth_token: Option<String>,
    /// Timeout of a single remote call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Per-namespace settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// How the resource cache refreshes once its TTL expires
    pub refresh: RefreshPolicy,
    /// Dimensions that alone identify a resource, in priority order
    pub resource_key_dimensions: Vec<String>,
    /// Generic resource enumeration for this namespace
    pub resource: Option<RmsResourceConfig>,
}

/// Resource type enumerated through the resource management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmsResourceConfig {
    /// Cloud service provider, e.g. `ecs`
    pub provider: String,
    /// Resource type of the provider, e.g. `cloudservers`
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Dimension carrying the resource id in metric identifiers
    pub dimension: String,
    /// Metrics to query per resource. Empty defers to the metric catalog.
    #[serde(default)]
    pub metric_names: Vec<String>,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            bind_address: "0.0.0.0:8087".to_string(),
            metric_path: "/metrics".to_string(),
            prefix: "huaweicloud".to_string(),
            max_routines: 20,
            scrape_batch_size: 10,
            resource_ttl: Duration::from_secs(3 * 3600),
            retrieve_offset: Duration::ZERO,
            query_window: Duration::from_secs(5 * 60),
            scrape_timeout: Duration::from_secs(30),
            export_timestamps: false,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            ces_endpoint: "https://ces.cn-north-4.myhuaweicloud.com".to_string(),
            rms_endpoint: "https://rms.myhuaweicloud.com".to_string(),
            project_id: String::new(),
            domain_id: String::new(),
            region: "cn-north-4".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl GlobalConfig {
    /// Parses `bind_address`, accepting the `:8087` shorthand.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let raw = if self.bind_address.starts_with(':') {
            format!("0.0.0.0{}", self.bind_address)
        } else {
            self.bind_address.clone()
        };
        raw.parse()
            .map_err(|e| BridgeError::config(format!("Invalid bind address '{}': {}", raw, e)))
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let global = &self.global;

        global.socket_addr()?;

        if !global.metric_path.starts_with('/') {
            return Err(BridgeError::config(format!(
                "metric_path must start with '/', got '{}'",
                global.metric_path
            )));
        }

        if global.prefix.is_empty() {
            return Err(BridgeError::config("prefix must not be empty"));
        }

        if global.max_routines == 0 {
            return Err(BridgeError::config("max_routines must be greater than 0"));
        }

        if global.scrape_batch_size == 0 || global.scrape_batch_size > MAX_BATCH_SIZE {
            return Err(BridgeError::config(format!(
                "scrape_batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, global.scrape_batch_size
            )));
        }

        if global.query_window.is_zero() {
            return Err(BridgeError::config("query_window must be greater than 0"));
        }

        for (namespace, ns) in &self.namespaces {
            if let Some(resource) = &ns.resource {
                if resource.provider.is_empty() || resource.resource_type.is_empty() {
                    return Err(BridgeError::config(format!(
                        "Resource provider and type are required for namespace '{}'",
                        namespace
                    )));
                }
                if resource.dimension.is_empty() {
                    return Err(BridgeError::config(format!(
                        "Resource dimension is required for namespace '{}'",
                        namespace
                    )));
                }
            }
        }

        Ok(())
    }

    /// Settings of one namespace, falling back to defaults.
    pub fn namespace(&self, namespace: &str) -> NamespaceConfig {
        self.namespaces.get(namespace).cloned().unwrap_or_default()
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        let debug = self.config.debug;
        self.config = serde_yaml::from_str(yaml)?;
        self.config.debug = debug;
        Ok(self)
    }

    /// Set listen address
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.global.bind_address = address.into();
        self
    }

    /// Set metric name prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.global.prefix = prefix.into();
        self
    }

    /// Set the concurrency limit of batch queries
    pub fn max_routines(mut self, limit: usize) -> Self {
        self.config.global.max_routines = limit;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.global.scrape_batch_size = size;
        self
    }

    /// Set the resource cache TTL
    pub fn resource_ttl(mut self, ttl: Duration) -> Self {
        self.config.global.resource_ttl = ttl;
        self
    }

    /// Set the API token
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.cloud.auth_token = Some(token.into());
        self
    }

    /// Set per-namespace settings
    pub fn namespace(mut self, namespace: impl Into<String>, settings: NamespaceConfig) -> Self {
        self.config.namespaces.insert(namespace.into(), settings);
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
