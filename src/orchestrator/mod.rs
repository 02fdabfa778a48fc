// Orchestrator Module - Recovery and resilience test orchestration
//
// This module drives failure-injection experiments against a containerized
// API + database topology:
// - Container lifecycle control with per-instance operation locking
// - HTTP health probing with bounded polling streams
// - A bounded connection pool with explicit disposal on upstream failure
// - One-shot chaos injections at configured offsets
// - Recovery observation and full/partial classification against an SLA
// - A rate-limited concurrent load driver with per-second tallies
// - Named scenarios composing the above into pass/fail runs

pub mod backend;
pub mod chaos;
pub mod controller;
pub mod error;
pub mod health;
pub mod load;
pub mod logging;
pub mod pool;
pub mod scenario;
pub mod types;
pub mod validator;

// Re-export commonly used types for convenience
pub use types::{
    FailureEvent, FailureKind, HealthStatus, PoolState, RecoveryClass, RecoveryOutcome,
    ServiceState,
};

pub use backend::{DockerBackend, LifecycleBackend};
pub use chaos::{ChaosScheduler, ScheduledInjection};
pub use controller::ServiceController;
pub use error::{HarnessError, Result};
pub use health::{HealthEndpoint, HealthProbe, HttpHealthEndpoint};
pub use load::{LoadDriver, LoadPlan, LoadSummary};
pub use logging::{CorrelationId, ScenarioContext};
pub use pool::{ConnectionPoolManager, PooledConnection};
pub use scenario::{ScenarioRunner, SCENARIOS};
pub use validator::RecoveryValidator;

#[cfg(test)]
mod tests;
