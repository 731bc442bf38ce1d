//! UI action executor.
//!
//! Everything the bot does on the messenger's web client goes through here:
//! sending a reply and scraping earlier messages. Each call runs in its own
//! browser session that is released before the call returns, and neither
//! operation ever returns an error. Failures turn into a `false` or a partial
//! history, with the cause logged.

mod fetch;
mod send;

pub use fetch::{ScrapedMessage, extraction_script};
pub use send::{SendOutcome, SendStep, StepFailure, SubmitMethod};

use async_trait::async_trait;
use std::time::Duration;

use replybot_protocol::ChatHistory;

use crate::browser::BrowserLauncher;
use crate::config::UiConfig;

/// The two UI operations the orchestrator depends on.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to `recipient_id`. `true` once a submit action went through.
    async fn send(&self, recipient_id: &str, text: &str) -> bool;

    /// Append the conversation's rendered messages to `existing`.
    async fn fetch_history(&self, target_id: &str, existing: ChatHistory) -> ChatHistory;
}

/// Browser-driven [`Messenger`].
pub struct UiExecutor<L> {
    launcher: L,
    config: UiConfig,
}

impl<L: BrowserLauncher> UiExecutor<L> {
    pub fn new(launcher: L, config: UiConfig) -> Self {
        Self { launcher, config }
    }

    /// Deep link opening the conversation with `text` prefilled.
    pub fn send_link(&self, recipient_id: &str, text: &str) -> String {
        format!(
            "{}/send?phone={}&text={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(recipient_id),
            urlencoding::encode(text)
        )
    }

    /// Deep link opening the conversation without prefilled text.
    pub fn chat_link(&self, target_id: &str) -> String {
        format!(
            "{}/send?phone={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(target_id)
        )
    }
}

#[async_trait]
impl<L: BrowserLauncher> Messenger for UiExecutor<L> {
    async fn send(&self, recipient_id: &str, text: &str) -> bool {
        self.deliver(recipient_id, text).await.is_sent()
    }

    async fn fetch_history(&self, target_id: &str, existing: ChatHistory) -> ChatHistory {
        self.collect_history(target_id, existing).await
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
