//! Core domain models, configuration and errors.
//!
//! This module contains the fundamental types shared by the collection
//! pipeline, the remote API clients and the HTTP surface.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, NamespaceConfig, RmsResourceConfig};
pub use error::{BridgeError, Result};
pub use types::{
    Datapoint, Dimension, MetricIdentifier, MetricSeriesData, ResourceInfo, ResourceKey,
    ResourceLabel, Series,
};
