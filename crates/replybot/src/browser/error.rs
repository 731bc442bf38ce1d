//! Browser automation error types.

use thiserror::Error;

/// Result type for browser operations.
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors raised while driving the web client.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The daemon could not be started for a session.
    #[error("failed to launch browser session {session}: {message}")]
    Launch { session: String, message: String },

    /// Could not reach the session socket.
    #[error("failed to connect to browser daemon at {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The daemon reported a failed action.
    #[error("browser action '{action}' failed: {message}")]
    Action {
        action: &'static str,
        message: String,
    },

    /// A required element is not on the page.
    #[error("element not found: {selector}")]
    NotFound { selector: String },

    /// No answer within the command budget.
    #[error("browser action '{action}' timed out after {millis}ms")]
    Timeout { action: &'static str, millis: u64 },

    /// The daemon answered with something we could not decode.
    #[error("invalid daemon response to '{action}': {message}")]
    Protocol {
        action: &'static str,
        message: String,
    },

    /// The session was already closed.
    #[error("browser session is closed")]
    Closed,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform without Unix sockets.
    #[error("agent-browser sessions require unix domain sockets")]
    Unsupported,
}

impl BrowserError {
    pub fn action(action: &'static str, message: impl Into<String>) -> Self {
        BrowserError::Action {
            action,
            message: message.into(),
        }
    }
}
