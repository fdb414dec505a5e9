//! Error types for the judge, the work queues and configuration

use thiserror::Error;

/// Failure of a single probe attempt.
///
/// Never leaves the judge: every variant is folded into a verdict.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The proxy string could not be turned into a client.
    #[error("cannot build client for proxy: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, TLS, tunnel or timeout failure.
    #[error("probe request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The probe body was not JSON.
    #[error("probe body is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),

    /// The probe body did not carry the identifier field.
    #[error("probe body has no identifier at {pointer}")]
    MissingIdentifier { pointer: String },
}

/// Work queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{queue} queue is full (capacity {capacity})")]
    Full {
        queue: &'static str,
        capacity: usize,
    },
}

/// Invalid pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroWorkers(&'static str),

    #[error("{0} queue capacity must be at least 1")]
    ZeroCapacity(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}
