use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the orchestration core.
///
/// Only `Infrastructure` aborts a scenario; everything else is either
/// captured as data (health failures, load failures) or asserted on by the
/// scenario that expects it (`PoolExhausted`).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The lifecycle backend could not perform a requested operation.
    /// Fatal to the scenario; teardown still runs.
    #[error("infrastructure operation failed for `{service}`: {reason}")]
    Infrastructure { service: String, reason: String },

    /// `wait_healthy` deadline exceeded. Marks the scenario failed without
    /// crashing the harness.
    #[error("`{service}` did not become healthy within {timeout:?}")]
    InfrastructureTimeout { service: String, timeout: Duration },

    /// A second lifecycle operation was attempted on an instance while one
    /// was in flight.
    #[error("lifecycle operation already in progress for `{service}`")]
    OperationInProgress { service: String },

    /// Every pool slot is in use. Expected and assertable in the dedicated
    /// pool-exhaustion scenario.
    #[error("connection pool exhausted ({max_size} slots in use)")]
    PoolExhausted { max_size: usize },

    /// A live connection handle was released twice. Programming error,
    /// never ignored.
    #[error("connection {id} released twice")]
    DoubleRelease { id: u64 },

    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
