//! Generator error types.

use thiserror::Error;

/// Result type for text generation.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Why a reply could not be generated.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// No API key configured.
    #[error("no Gemini API key configured")]
    MissingApiKey,

    /// HTTP request failed (connect, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response carried no usable candidate text.
    #[error("Gemini returned no candidate text")]
    EmptyResponse,
}
