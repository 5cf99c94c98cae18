//! Error types for nodegroup-guard

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Remote provider rejected the request or returned an unusable answer
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Network failure, throttling or timeout talking to the remote provider
    #[error("Transient provider error: {0}")]
    TransientProviderError(String),

    #[error("Node group not found: {0}")]
    NodeGroupNotFound(String),

    /// A health decision of BLOCK aborted a mutation before it was submitted
    #[error("Health gate blocked {operation}: {reason}")]
    HealthGateBlocked { operation: String, reason: String },

    /// The monitoring session ran out of time; remote updates keep running
    #[error(
        "Monitoring timed out after {}s; still in progress: {}",
        elapsed.as_secs(),
        unresolved.join(", ")
    )]
    MonitorTimedOut {
        elapsed: Duration,
        unresolved: Vec<String>,
    },

    /// The operator interrupted the monitoring session; remote updates keep running
    #[error("Monitoring cancelled; still in progress: {}", unresolved.join(", "))]
    MonitorCancelled { unresolved: Vec<String> },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientProviderError(_) => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
            Error::KubeError(kube::Error::HyperError(_)) | Error::KubeError(kube::Error::Service(_)) => {
                true
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
