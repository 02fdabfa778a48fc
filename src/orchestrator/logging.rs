use tokio::time::Instant;
use uuid::Uuid;

/// Correlation ID for tracking one scenario execution across the
/// controller, probe, scheduler and validator log streams
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CorrelationId(Uuid);

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logging context for a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub correlation_id: CorrelationId,
    pub scenario: String,
    pub started_at: Instant,
}

impl ScenarioContext {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            scenario: scenario.into(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "scenario",
            correlation_id = %self.correlation_id,
            scenario = %self.scenario,
        )
    }
}
