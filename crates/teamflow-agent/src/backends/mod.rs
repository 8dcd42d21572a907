pub mod openai;
pub mod search;

use teamflow_core::TeamflowError;

/// Map a transport error, keeping timeouts distinguishable from other failures.
pub(crate) fn map_reqwest_error(operation: &str, budget_ms: u64, e: reqwest::Error) -> TeamflowError {
    if e.is_timeout() {
        TeamflowError::Timeout {
            operation: operation.to_string(),
            after_ms: budget_ms,
        }
    } else {
        TeamflowError::Http(e.to_string())
    }
}
