//! Companion driver error types.

use thiserror::Error;

/// Result type for companion process operations.
pub type CompanionResult<T> = Result<T, CompanionError>;

/// Result type for driver installation.
pub type SetupResult<T> = Result<T, SetupError>;

/// Errors starting or talking to the companion driver.
#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("companion process has no {0}")]
    MissingPipe(&'static str),

    #[error("companion process is already running")]
    AlreadyStarted,
}

/// Errors preparing the driver directory. All of them are fatal to startup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{binary} is not available: {source}")]
    RuntimeMissing {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
