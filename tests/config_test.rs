//! Configuration system tests.

use cloudeye_bridge::cache::RefreshPolicy;
use cloudeye_bridge::cli::Cli;
use cloudeye_bridge::core::{Config, ConfigBuilder};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.global.bind_address, "0.0.0.0:8087");
    assert_eq!(config.global.metric_path, "/metrics");
    assert_eq!(config.global.prefix, "huaweicloud");
    assert_eq!(config.global.query_window, Duration::from_secs(300));
    assert!(config.namespaces.is_empty());
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .bind_address(":9100")
        .prefix("cloud")
        .max_routines(5)
        .batch_size(100)
        .resource_ttl(Duration::from_secs(600))
        .auth_token("t")
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.global.socket_addr().unwrap().port(), 9100);
    assert_eq!(config.global.prefix, "cloud");
    assert_eq!(config.global.max_routines, 5);
    assert_eq!(config.global.scrape_batch_size, 100);
    assert_eq!(config.global.resource_ttl, Duration::from_secs(600));
    assert_eq!(config.cloud.auth_token.as_deref(), Some("t"));
    assert!(config.debug);
}

#[test]
fn test_invalid_values_rejected() {
    assert!(ConfigBuilder::new().prefix("").build().is_err());
    assert!(ConfigBuilder::new()
        .from_yaml("global:\n  metric_path: metrics\n")
        .unwrap()
        .build()
        .is_err());
    assert!(ConfigBuilder::new()
        .from_yaml("global:\n  query_window: 0s\n")
        .unwrap()
        .build()
        .is_err());
    assert!(ConfigBuilder::new().from_yaml("global: [").is_err());
}

#[tokio::test]
async fn test_load_config_from_file_with_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
global:
  bind_address: "127.0.0.1:8087"
  scrape_batch_size: 20
  export_timestamps: true
cloud:
  project_id: p-1
  auth_token: from-file
logging:
  level: warn
  structured: true
namespaces:
  SYS.MRS:
    refresh: async-stale
"#
    )
    .unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        bind: Some(":9200".to_string()),
        auth_token: Some("from-cli".to_string()),
        debug: false,
        check_config: false,
    };
    let (config, source) = cli.load_config().await.unwrap();

    assert_eq!(source.as_deref(), Some(file.path()));
    assert_eq!(config.global.bind_address, ":9200");
    assert_eq!(config.global.scrape_batch_size, 20);
    assert!(config.global.export_timestamps);
    assert_eq!(config.cloud.project_id, "p-1");
    assert_eq!(config.cloud.auth_token.as_deref(), Some("from-cli"));
    assert_eq!(config.logging.level.as_str(), "warn");
    assert!(config.logging.structured);
    assert_eq!(config.namespace("SYS.MRS").refresh, RefreshPolicy::AsyncStale);
}

#[tokio::test]
async fn test_missing_explicit_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli {
        config: Some(dir.path().join("absent.yaml")),
        bind: None,
        auth_token: None,
        debug: false,
        check_config: false,
    };

    assert!(cli.load_config().await.is_err());
}
