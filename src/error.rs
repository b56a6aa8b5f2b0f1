use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Agent error types
#[derive(Debug, Error)]
pub enum AgentError {
    /// A collector factory failed while building a collector set
    #[error("failed to build collector {key}: {source}")]
    Construction {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Per-scrape configuration refresh failed
    #[error("failed to refresh config for service {service}: {source}")]
    Refresh {
        service: String,
        #[source]
        source: BoxError,
    },

    /// A filter or log pattern is not a valid regex
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Sample label values don't match the descriptor's label names
    #[error("label cardinality mismatch for {metric}: expected {expected} values, got {got}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        got: usize,
    },

    /// Log file could not be opened or read
    #[error("failed to tail {}: {source}", path.display())]
    Tail {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn construction(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Construction {
            key: key.into(),
            source: source.into(),
        }
    }

    pub fn refresh(service: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Refresh {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Short machine-friendly name of the error kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Construction { .. } => "construction",
            Self::Refresh { .. } => "refresh",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::LabelCardinality { .. } => "label_cardinality",
            Self::Tail { .. } => "tail",
            Self::Config(_) => "config",
        }
    }
}
