//! Command-line interface for the bridge.
//!
//! Run `cloudeye-bridge --config config.yaml` and point the metrics
//! consumer at `http://host:8087/metrics?services=SYS.ECS,SYS.EVS`.

use crate::cache::NamespaceResourceCache;
use crate::cloudeye::{CesClient, MetricCatalog};
use crate::core::{BridgeError, Config, ConfigBuilder, Result};
use crate::pipeline::Collector;
use crate::{providers, server};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Republishes cloud monitoring metrics enriched with resource labels.
#[derive(Parser, Debug)]
#[command(name = "cloudeye-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/cloudeye-bridge/config.yaml)
    #[arg(short, long, env = "CLOUDEYE_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, overrides `global.bind_address`
    #[arg(long, env = "CLOUDEYE_BRIDGE_BIND")]
    pub bind: Option<String>,

    /// Pre-issued API token, overrides `cloud.auth_token`
    #[arg(long, env = "CLOUDEYE_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "CLOUDEYE_BRIDGE_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    ///
    /// Also returns the file the configuration came from, if any.
    pub async fn load_config(&self) -> Result<(Config, Option<PathBuf>)> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join("cloudeye-bridge").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        let mut source = None;
        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    source = Some(path);
                },
                Err(e) if self.config.is_some() => {
                    // User explicitly specified a config file that can't be read
                    return Err(BridgeError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(_) => {},
            }
        }

        Ok((self.build_config_from_args(builder)?, source))
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(bind) = &self.bind {
            builder = builder.bind_address(bind.as_str());
        }
        if let Some(token) = &self.auth_token {
            builder = builder.auth_token(token.as_str());
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug"
        } else {
            config.logging.level.as_str()
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| BridgeError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Wires the remote clients, the resource cache and the collector.
pub fn build_collector(config: &Config) -> Result<Collector> {
    let client = Arc::new(CesClient::new(&config.cloud)?);
    let registry = providers::build_registry(config)?;
    let cache = Arc::new(NamespaceResourceCache::new(
        registry,
        config.global.resource_ttl,
    ));
    let catalog: Arc<dyn MetricCatalog> = Arc::clone(&client) as Arc<dyn MetricCatalog>;

    Ok(Collector::new(config, cache, catalog, client))
}

/// Execute the bridge.
pub async fn execute(cli: Cli) -> Result<()> {
    let (config, source) = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Bind address: {}", config.global.bind_address);
        println!("  Metric path: {}", config.global.metric_path);
        println!("  Batch size: {}", config.global.scrape_batch_size);
        println!("  Max routines: {}", config.global.max_routines);
        println!("  Resource TTL: {:?}", config.global.resource_ttl);
        println!("  Configured namespaces: {}", config.namespaces.len());
        return Ok(());
    }

    cli.init_logging(&config)?;
    match source {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::info!("No configuration file found, using defaults"),
    }
    if config.cloud.project_id.is_empty() {
        tracing::warn!("cloud.project_id is empty, metric queries will fail");
    }
    if config.cloud.auth_token.is_none() {
        tracing::warn!("No API token configured, requests are sent unauthenticated");
    }

    let collector = build_collector(&config)?;
    server::start_server(&config, collector).await
}
