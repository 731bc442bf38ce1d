//! Reply generation.

mod error;
mod gemini;
mod prompt;

pub use error::{GeneratorError, GeneratorResult};
pub use gemini::GeminiGenerator;
pub use prompt::build_prompt;

use async_trait::async_trait;
use replybot_protocol::ChatHistory;

/// Reply sent when generation fails.
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble responding right now.";

/// Produces the reply to an incoming message.
///
/// Implementations never fail: errors are logged and a fallback string is
/// returned, which callers send like any other reply.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, history: &ChatHistory, incoming: &str) -> String;
}
