//! History scraping.
//!
//! The web client exposes no machine-readable send times for older messages,
//! so scraped records are stamped with the time they were fetched. Prompting
//! relies on order, not absolute time.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use replybot_protocol::{ChatHistory, MessageRecord, Timestamp};

use super::{UiExecutor, millis};
use crate::browser::{BrowserError, BrowserLauncher, BrowserResult, PageSession, SessionGuard};
use crate::config::Selectors;

/// One rendered bubble: `sender_id` is `"Them"` or `"Me"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedMessage {
    pub sender_id: String,
    pub text: String,
}

/// Page script returning every rendered bubble in on-screen order.
pub fn extraction_script(selectors: &Selectors) -> String {
    let quote = |s: &str| serde_json::Value::String(s.to_string()).to_string();
    format!(
        r#"(() => {{
    const containers = document.querySelectorAll({bubbles});
    const messages = [];
    containers.forEach(container => {{
        const sender = container.classList.contains({incoming}) ? 'Them' : 'Me';
        const textElement = container.querySelector({text});
        messages.push({{ sender_id: sender, text: textElement ? textElement.textContent : '' }});
    }});
    return messages;
}})()"#,
        bubbles = quote(&selectors.message_bubbles),
        incoming = quote(&selectors.incoming_class),
        text = quote(&selectors.message_text),
    )
}

impl<L: BrowserLauncher> UiExecutor<L> {
    /// Scrape the conversation with `target_id` and append it to `existing`.
    ///
    /// Returns `existing` untouched when the page never becomes interactive,
    /// and whatever was gathered so far when anything fails mid-way.
    pub async fn collect_history(&self, target_id: &str, existing: ChatHistory) -> ChatHistory {
        info!("Getting previous chats for {}", target_id);

        let mut guard = match SessionGuard::acquire(&self.launcher).await {
            Ok(guard) => guard,
            Err(e) => {
                error!(
                    "Error launching the browser for getting chat history: {}",
                    e
                );
                return existing;
            }
        };

        let history = match guard.page() {
            Ok(page) => self.page_through(page, target_id, existing).await,
            Err(e) => {
                warn!("Browser session unusable: {}", e);
                existing
            }
        };
        guard.release().await;

        info!(
            "Finished getting previous chats for {} ({} record(s))",
            target_id,
            history.len()
        );
        history
    }

    async fn page_through(
        &self,
        page: &mut dyn PageSession,
        target_id: &str,
        mut history: ChatHistory,
    ) -> ChatHistory {
        let selectors = &self.config.selectors;

        if let Err(e) = page.navigate(&self.chat_link(target_id)).await {
            error!("Could not open conversation with {}: {}", target_id, e);
            return history;
        }
        if let Err(e) = page
            .wait_for(
                &selectors.any_input,
                millis(self.config.history_input_wait_ms),
            )
            .await
        {
            error!("Conversation with {} never became interactive: {}", target_id, e);
            return history;
        }

        let limit = self.config.history_limit;
        let script = extraction_script(selectors);

        while history.len() < limit {
            let batch = match extract(page, &script).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("Error fetching messages: {}", e);
                    break;
                }
            };
            if batch.is_empty() {
                info!("No more messages in the chat history");
                break;
            }

            for message in batch {
                if history.len() >= limit {
                    break;
                }
                history.push(MessageRecord::new(
                    message.sender_id,
                    message.text,
                    Timestamp::now(),
                ));
            }
            if history.len() >= limit {
                break;
            }

            match page.count(&selectors.load_earlier).await {
                Ok(0) => {
                    info!("No more 'load earlier' control, ending fetch");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error looking for 'load earlier' control: {}", e);
                    break;
                }
            }
            if let Err(e) = page.click(&selectors.load_earlier).await {
                error!("Error loading earlier messages: {}", e);
                break;
            }
            info!("Clicked load earlier, waiting for messages to render");
            tokio::time::sleep(millis(self.config.load_more_pause_ms)).await;
        }

        history
    }
}

async fn extract(page: &mut dyn PageSession, script: &str) -> BrowserResult<Vec<ScrapedMessage>> {
    let value = page.evaluate(script).await?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|e| BrowserError::Protocol {
        action: "evaluate",
        message: format!("unexpected message list: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_quotes_selectors() {
        let selectors = Selectors {
            message_bubbles: r#"div[data-role="bubble"]"#.to_string(),
            ..Selectors::default()
        };
        let script = extraction_script(&selectors);
        assert!(script.contains(r#"document.querySelectorAll("div[data-role=\"bubble\"]")"#));
        assert!(script.contains(r#"classList.contains("message-in")"#));
        assert!(script.contains(r#"querySelector("span.selectable-text")"#));
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})()"));
    }
}
