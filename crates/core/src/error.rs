//! Error types for the TaxMate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Several conditions that look like failures are *not* errors here:
//! a permission denial is a logged block, a judgment `BLOCK` is a block
//! notice, an approval requirement is a suspension. Only the cases below
//! travel as `Err`.

use thiserror::Error;

/// The top-level error type, returned by the binary and gateway entry points.
#[derive(Debug, Error)]
pub enum Error {
    // --- Agent-proposal function errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Judgment function errors ---
    #[error("Judgment error: {0}")]
    Judgment(#[from] JudgmentError),

    // --- Action argument errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Thread lifecycle errors ---
    #[error("Thread error: {0}")]
    Thread(#[from] ThreadError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- I/O (invoice files, listener) ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the agent-proposal function.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed agent response: {0}")]
    MalformedResponse(String),

    /// The agent signalled that it has recursed past its own bound.
    /// The turn engine treats this as a loop outcome, not a failure.
    #[error("Agent recursion limit reached after {turns} turns")]
    RecursionLimit { turns: u32 },
}

/// Failures of the judgment function. All of them fail the turn closed.
#[derive(Debug, Clone, Error)]
pub enum JudgmentError {
    #[error("Judgment function unavailable: {0}")]
    Unavailable(String),

    #[error("Judgment function timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Malformed judgment response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Invalid arguments for {action}: {reason}")]
    InvalidArguments { action: String, reason: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

#[derive(Debug, Clone, Error)]
pub enum ThreadError {
    #[error("Thread not found: {0}")]
    NotFound(String),

    #[error("Thread {thread_id} is {status}, not suspended_for_approval")]
    NotSuspended { thread_id: String, status: String },

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_displays_correctly() {
        let err = Error::Agent(AgentError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn not_suspended_names_the_status() {
        let err = Error::Thread(ThreadError::NotSuspended {
            thread_id: "t-1".into(),
            status: "completed".into(),
        });
        assert!(err.to_string().contains("t-1"));
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn io_errors_convert() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/definitely/not/here.txt")?)
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }

    #[test]
    fn config_error_keeps_message() {
        let err = Error::config("no API key");
        assert_eq!(err.to_string(), "Configuration error: no API key");
    }

    #[test]
    fn judgment_timeout_displays_seconds() {
        let err = JudgmentError::Timeout { timeout_secs: 30 };
        assert!(err.to_string().contains("30s"));
    }
}
