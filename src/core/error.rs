use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource enumeration failed for {namespace}: {message}")]
    ResourceEnumeration { namespace: String, message: String },

    #[error("Metric discovery failed for {namespace}: {message}")]
    MetricDiscovery { namespace: String, message: String },

    #[error("Batch {batch} of {namespace} failed: {message}")]
    BatchFetch {
        namespace: String,
        batch: usize,
        message: String,
    },

    #[error("Label mismatch for {metric}: {names} names, {values} values")]
    LabelMismatch {
        metric: String,
        names: usize,
        values: usize,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Exposition error: {0}")]
    Exposition(#[from] prometheus::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Wraps any error as a resource enumeration failure of `namespace`
    pub fn resource_enumeration<S: Into<String>>(namespace: &str, msg: S) -> Self {
        Self::ResourceEnumeration {
            namespace: namespace.to_string(),
            message: msg.into(),
        }
    }

    /// Wraps any error as a metric discovery failure of `namespace`
    pub fn metric_discovery<S: Into<String>>(namespace: &str, msg: S) -> Self {
        Self::MetricDiscovery {
            namespace: namespace.to_string(),
            message: msg.into(),
        }
    }

    /// Returns true if the next collection cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::ResourceEnumeration { .. }
            | Self::MetricDiscovery { .. }
            | Self::BatchFetch { .. } => true,
            _ => false,
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ResourceEnumeration { .. } => "resource",
            Self::MetricDiscovery { .. } => "discovery",
            Self::BatchFetch { .. } => "batch",
            Self::LabelMismatch { .. } => "label",
            Self::Network(_) | Self::Http(_) | Self::Status { .. } => "network",
            Self::Decode(_) | Self::Yaml(_) => "serialization",
            Self::Io(_) => "io",
            Self::Exposition(_) => "exposition",
            Self::Join(_) => "async",
        }
    }
}
