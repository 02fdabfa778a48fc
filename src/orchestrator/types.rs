use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a service instance, mutated only by the controller.
///
/// Transitions are monotonic for a single operation:
/// `Running -> Stopped -> Restarting -> {Running | Unhealthy}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Running,
    Stopped,
    Restarting,
    Unhealthy,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Restarting => write!(f, "restarting"),
            ServiceState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Kind of failure injected against a target service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Abrupt termination, no graceful shutdown
    Kill,
    /// Stop followed by start
    Restart,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Kill => write!(f, "kill"),
            FailureKind::Restart => write!(f, "restart"),
        }
    }
}

/// A single injected failure. Created by the chaos scheduler with
/// `injected_at` recorded before the scheduler hands control back, and
/// consumed exactly once by the recovery validator.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub target: String,
    pub kind: FailureKind,
    pub injected_at: Instant,
}

/// One health observation of a service
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub service: String,
    pub observed_at: Instant,
    pub healthy: bool,
    pub database_reachable: bool,
    pub latency: Duration,
}

/// Recovery classification over the target's dependency closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryClass {
    /// Target and every service it depends on were healthy at recovery
    Full,
    /// Target recovered but a dependency did not within the SLA
    Partial,
}

impl std::fmt::Display for RecoveryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryClass::Full => write!(f, "full"),
            RecoveryClass::Partial => write!(f, "partial"),
        }
    }
}

/// The recorded result of observing a service's return to health after a
/// failure event. Terminal once recorded; `recovered_at` is absent when the
/// SLA expired before recovery was confirmed.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub target: String,
    pub kind: FailureKind,
    pub injected_at: Instant,
    pub detected_unhealthy_at: Option<Instant>,
    pub recovered_at: Option<Instant>,
    pub classification: Option<RecoveryClass>,
}

impl RecoveryOutcome {
    pub fn recovered(&self) -> bool {
        self.recovered_at.is_some()
    }

    /// Time from injection to confirmed recovery
    pub fn duration(&self) -> Option<Duration> {
        self.recovered_at
            .map(|at| at.saturating_duration_since(self.injected_at))
    }

    pub fn within(&self, sla: Duration) -> bool {
        self.duration().is_some_and(|d| d <= sla)
    }

    pub fn is_full(&self) -> bool {
        self.classification == Some(RecoveryClass::Full)
    }
}

/// Connection pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Healthy,
    /// All slots in use; further acquisition fails until a release
    Exhausted,
    /// Pooled state discarded after an upstream failure; cleared by the
    /// next successful acquire
    Stale,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolState::Healthy => write!(f, "healthy"),
            PoolState::Exhausted => write!(f, "exhausted"),
            PoolState::Stale => write!(f, "stale"),
        }
    }
}
