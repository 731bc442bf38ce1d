//! Reply delivery.
//!
//! One delivery makes up to `max_retries` attempts in a single session. Each
//! attempt walks the steps of [`SendStep`] in order. A failing step ends the
//! attempt, and the next attempt starts again from navigation.

use log::{error, info};
use std::fmt;

use super::{UiExecutor, millis};
use crate::browser::{BrowserError, BrowserLauncher, PageSession, SessionGuard};

/// Steps of one delivery attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    /// Open the deep link with the text prefilled.
    Navigate,
    /// Wait for the compose box.
    AwaitInput,
    /// Wait for a message bubble, proving the conversation pane loaded.
    AwaitMessage,
    /// Hover the newest bubble so its menu renders.
    Hover,
    /// Click the bubble's reply affordance.
    Reply,
    /// Type the text into the compose box.
    Type,
    /// Click send, or press Enter when the send control is missing.
    Submit,
}

impl SendStep {
    fn next(self) -> Option<SendStep> {
        match self {
            SendStep::Navigate => Some(SendStep::AwaitInput),
            SendStep::AwaitInput => Some(SendStep::AwaitMessage),
            SendStep::AwaitMessage => Some(SendStep::Hover),
            SendStep::Hover => Some(SendStep::Reply),
            SendStep::Reply => Some(SendStep::Type),
            SendStep::Type => Some(SendStep::Submit),
            SendStep::Submit => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SendStep::Navigate => "navigate",
            SendStep::AwaitInput => "await-input",
            SendStep::AwaitMessage => "await-message",
            SendStep::Hover => "hover",
            SendStep::Reply => "reply",
            SendStep::Type => "type",
            SendStep::Submit => "submit",
        }
    }
}

impl fmt::Display for SendStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the message was finally submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    SendButton,
    EnterKey,
}

/// The step an attempt died on, and why.
#[derive(Debug)]
pub struct StepFailure {
    pub step: SendStep,
    pub error: BrowserError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step failed: {}", self.step, self.error)
    }
}

/// Result of one delivery.
#[derive(Debug)]
pub enum SendOutcome {
    Sent { attempts: u32, via: SubmitMethod },
    Exhausted { attempts: u32, last: StepFailure },
    SessionUnavailable(BrowserError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }

    /// Attempts made. Zero when no session could be opened.
    pub fn attempts(&self) -> u32 {
        match self {
            SendOutcome::Sent { attempts, .. } | SendOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
            SendOutcome::SessionUnavailable(_) => 0,
        }
    }
}

enum Advance {
    Next(SendStep),
    Submitted(SubmitMethod),
}

impl<L: BrowserLauncher> UiExecutor<L> {
    /// Send `text` to `recipient_id` and report in detail how it went.
    pub async fn deliver(&self, recipient_id: &str, text: &str) -> SendOutcome {
        info!("Sending message to {}: {}", recipient_id, text);

        let mut guard = match SessionGuard::acquire(&self.launcher).await {
            Ok(guard) => guard,
            Err(e) => {
                error!("Error sending message to {}: {}", recipient_id, e);
                return SendOutcome::SessionUnavailable(e);
            }
        };

        let outcome = match guard.page() {
            Ok(page) => self.attempt_loop(page, recipient_id, text).await,
            Err(e) => SendOutcome::SessionUnavailable(e),
        };
        guard.release().await;
        outcome
    }

    async fn attempt_loop(
        &self,
        page: &mut dyn PageSession,
        recipient_id: &str,
        text: &str,
    ) -> SendOutcome {
        let max_attempts = self.config.max_retries.max(1);
        let link = self.send_link(recipient_id, text);

        let mut attempt = 1;
        loop {
            match self.run_attempt(page, &link, text).await {
                Ok(via) => {
                    info!(
                        "Message to {} submitted via {:?} on attempt {}/{}",
                        recipient_id, via, attempt, max_attempts
                    );
                    return SendOutcome::Sent {
                        attempts: attempt,
                        via,
                    };
                }
                Err(failure) => {
                    error!(
                        "Error sending to {} on attempt {}/{}: {}",
                        recipient_id, attempt, max_attempts, failure
                    );
                    if attempt >= max_attempts {
                        error!(
                            "Failed to send message to {} after {} attempts",
                            recipient_id, max_attempts
                        );
                        return SendOutcome::Exhausted {
                            attempts: attempt,
                            last: failure,
                        };
                    }
                    info!("Retrying... {}/{}", attempt, max_attempts);
                    tokio::time::sleep(millis(self.config.retry_delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        page: &mut dyn PageSession,
        link: &str,
        text: &str,
    ) -> Result<SubmitMethod, StepFailure> {
        let mut step = SendStep::Navigate;
        loop {
            let advance = self
                .execute_step(page, step, link, text)
                .await
                .map_err(|error| StepFailure { step, error })?;
            match advance {
                Advance::Next(next) => step = next,
                Advance::Submitted(via) => return Ok(via),
            }
        }
    }

    async fn execute_step(
        &self,
        page: &mut dyn PageSession,
        step: SendStep,
        link: &str,
        text: &str,
    ) -> Result<Advance, BrowserError> {
        let selectors = &self.config.selectors;
        match step {
            SendStep::Navigate => page.navigate(link).await?,
            SendStep::AwaitInput => {
                page.wait_for(&selectors.compose_input, millis(self.config.input_wait_ms))
                    .await?
            }
            SendStep::AwaitMessage => {
                page.wait_for(&selectors.last_message, millis(self.config.message_wait_ms))
                    .await?
            }
            SendStep::Hover => {
                if page.count(&selectors.last_message).await? == 0 {
                    return Err(BrowserError::NotFound {
                        selector: selectors.last_message.clone(),
                    });
                }
                page.hover(&selectors.last_message).await?
            }
            SendStep::Reply => {
                page.wait_for(&selectors.reply_button, millis(self.config.reply_wait_ms))
                    .await?;
                page.click(&selectors.reply_button).await?;
                info!("Reply button clicked");
            }
            SendStep::Type => page.type_text(&selectors.compose_input, text).await?,
            SendStep::Submit => {}
        }

        match step.next() {
            Some(next) => Ok(Advance::Next(next)),
            None => self.submit(page).await.map(Advance::Submitted),
        }
    }

    async fn submit(&self, page: &mut dyn PageSession) -> Result<SubmitMethod, BrowserError> {
        let selectors = &self.config.selectors;
        let clicked = async {
            page.wait_for(
                &selectors.send_button,
                millis(self.config.send_button_wait_ms),
            )
            .await?;
            page.click(&selectors.send_button).await
        }
        .await;

        match clicked {
            Ok(()) => {
                info!("Send button clicked");
                Ok(SubmitMethod::SendButton)
            }
            Err(e) => {
                info!("Send button not found, trying to send with Enter: {}", e);
                page.press("Enter").await?;
                Ok(SubmitMethod::EnterKey)
            }
        }
    }
}
