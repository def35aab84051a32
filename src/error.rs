use thiserror::Error;

/// Run-level error taxonomy. Only `Navigation` aborts a run; every other
/// category is recorded in the metrics error list and surfaced back to the
/// model as corrective context.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found using any strategy: {0}")]
    Resolution(String),

    #[error("Error executing {action} on {target}: {reason}")]
    Execution {
        action: String,
        target: String,
        reason: String,
    },

    #[error("API error: {0}")]
    Model(String),

    #[error("Content generation error: {0}")]
    ContentGeneration(String),

    #[error("Reached maximum number of iterations without completing the task")]
    BudgetExhausted,
}
