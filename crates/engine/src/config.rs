use chrono::Duration;

/// Tuning knobs for the executor and the built-in activities.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of tickets issued by Authenticate.
    pub ticket_lifetime: Duration,
    /// Deepest level the executor will descend to; nodes below it fail.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticket_lifetime: Duration::days(30),
            max_depth: 64,
        }
    }
}
