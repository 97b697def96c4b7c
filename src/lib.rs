//! cloudeye-bridge - cloud monitoring metrics for pull-based consumers.
//!
//! The bridge polls a cloud monitoring API for the metrics of the
//! requested namespaces, enriches every series with cached resource
//! labels and serves the result in the Prometheus text format.
//!
//! # Architecture
//!
//! - `core`: Domain models, configuration and errors
//! - `cloudeye`: Monitoring API client (metric catalog and batch queries)
//! - `cache`: Per-namespace TTL cache of resource labels
//! - `providers`: Resource enumeration feeding the cache
//! - `pipeline`: Batch scheduling, label joining, duplicate suppression
//! - `exposition` / `server`: Text format rendering and the scrape endpoint
//! - `cli`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use cloudeye_bridge::cli::build_collector;
//! use cloudeye_bridge::core::Config;
//! use cloudeye_bridge::pipeline::Sink;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let collector = build_collector(&config)?;
//!     let (sink, mut rx) = Sink::channel(1024, CancellationToken::new());
//!     let namespaces = vec!["SYS.ECS".to_string()];
//!     let cycle = tokio::spawn(async move { collector.collect(&namespaces, Arc::new(sink)).await });
//!     while let Some(series) = rx.recv().await {
//!         println!("{} {}", series.name, series.value);
//!     }
//!     cycle.await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod cloudeye;
pub mod core;
pub mod exposition;
pub mod pipeline;
pub mod providers;
pub mod server;

// Re-export core types for convenience
pub use crate::core::{BridgeError, Config, Result};
