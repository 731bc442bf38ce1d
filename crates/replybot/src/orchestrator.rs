//! Run-to-completion lifecycle tying the store, event source, generator and
//! messenger together.
//!
//! `Init -> Bootstrap -> SteadyLoop -> Shutdown`. Only the orchestrator
//! touches the in-memory history and the store, and it does so from a single
//! task, so the history needs no locking.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use replybot_protocol::{ChatHistory, InboundEvent, MessageRecord};

use crate::companion::{AllowList, EventSource, SourcePoll};
use crate::generator::ResponseGenerator;
use crate::history::HistoryStore;
use crate::ui::Messenger;

/// Greeting sent to the target after bootstrap.
pub const DEFAULT_GREETING: &str = "Hello! This is an automated message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Bootstrap,
    SteadyLoop,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Bootstrap => "bootstrap",
            Phase::SteadyLoop => "steady-loop",
            Phase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not from the target. History untouched.
    Ignored,
    /// Reply sent. History grew by two records.
    Replied,
    /// Reply could not be sent. History grew by the inbound record only.
    ReplyFailed,
}

pub struct Orchestrator<M, G> {
    store: HistoryStore,
    messenger: M,
    generator: G,
    allow: AllowList,
    greeting: String,
    poll_interval: Duration,
    history: ChatHistory,
    phase: Phase,
}

impl<M: Messenger, G: ResponseGenerator> Orchestrator<M, G> {
    pub fn new(store: HistoryStore, messenger: M, generator: G, target: impl Into<String>) -> Self {
        Self {
            store,
            messenger,
            generator,
            allow: AllowList::new(target),
            greeting: DEFAULT_GREETING.to_string(),
            poll_interval: Duration::from_secs(1),
            history: ChatHistory::new(),
            phase: Phase::Init,
        }
    }

    /// Greeting sent once after bootstrap. Empty disables it.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Poll wait and inter-iteration delay.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn target(&self) -> &str {
        self.allow.target()
    }

    /// Drive the whole lifecycle until the source dies or `cancel` fires.
    ///
    /// Returns an error only for fatal conditions: an unusable store, a
    /// source that cannot start, or a failed final save.
    pub async fn run(
        &mut self,
        source: &mut dyn EventSource,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.init().await?;

        if let Err(e) = self.bootstrap(source).await {
            error!("Bootstrap failed: {:#}", e);
            if let Err(shutdown_err) = self.shutdown(source).await {
                error!("Shutdown after failed bootstrap also failed: {:#}", shutdown_err);
            }
            return Err(e);
        }

        self.steady_loop(source, &cancel).await;
        self.shutdown(source).await
    }

    /// Ensure the store exists and load it.
    pub async fn init(&mut self) -> Result<()> {
        self.phase = Phase::Init;
        self.store
            .initialize()
            .await
            .with_context(|| format!("initializing {}", self.store.path().display()))?;
        self.history = self.store.load().await;
        info!(
            "Loaded {} history records from {}",
            self.history.len(),
            self.store.path().display()
        );
        Ok(())
    }

    /// Start the source, merge scraped history, persist, greet.
    pub async fn bootstrap(&mut self, source: &mut dyn EventSource) -> Result<()> {
        self.phase = Phase::Bootstrap;
        source.start().await.context("starting companion")?;

        let existing = std::mem::take(&mut self.history);
        let before = existing.len();
        self.history = self
            .messenger
            .fetch_history(self.allow.target(), existing)
            .await;
        info!(
            "Fetched {} earlier messages",
            self.history.len().saturating_sub(before)
        );
        self.persist().await;

        if !self.greeting.is_empty() {
            info!("Sending initial message to {}", self.allow.target());
            if !self
                .messenger
                .send(self.allow.target(), &self.greeting)
                .await
            {
                warn!("Failed to send initial message to {}", self.allow.target());
            }
        }
        Ok(())
    }

    /// Poll and answer until the source exits or closes, or `cancel` fires.
    ///
    /// Cancellation is checked between iterations, never in the middle of
    /// handling an event.
    pub async fn steady_loop(&mut self, source: &mut dyn EventSource, cancel: &CancellationToken) {
        self.phase = Phase::SteadyLoop;
        info!("Listening for messages from {}", self.allow.target());

        loop {
            if cancel.is_cancelled() {
                info!("Shutdown requested");
                break;
            }
            if let Some(status) = source.exit_status() {
                error!("Companion process exited unexpectedly ({})", status);
                break;
            }

            match source.poll(self.poll_interval).await {
                SourcePoll::Event(event) => {
                    self.handle_event(event).await;
                }
                SourcePoll::Idle => {}
                SourcePoll::Closed => {
                    error!("Companion event stream closed");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Answer one inbound event.
    #[instrument(skip(self, event), fields(sender = %event.sender_id))]
    pub async fn handle_event(&mut self, event: InboundEvent) -> EventOutcome {
        if !self.allow.permits(&event.sender_id) {
            info!("Ignoring message from {} - not the target", event.sender_id);
            return EventOutcome::Ignored;
        }
        info!("Received message from {}: {}", event.sender_id, event.text);

        let sender = event.sender_id.clone();
        let incoming = event.text.clone();
        self.history.push(event.into());

        let reply = self.generator.generate(&self.history, &incoming).await;

        let outcome = if self.messenger.send(&sender, &reply).await {
            info!("Successfully responded to {}", sender);
            self.history.push(MessageRecord::outbound(reply));
            EventOutcome::Replied
        } else {
            error!("Failed to respond to {}", sender);
            EventOutcome::ReplyFailed
        };

        self.persist().await;
        outcome
    }

    /// Stop the source and persist the final history.
    pub async fn shutdown(&mut self, source: &mut dyn EventSource) -> Result<()> {
        self.phase = Phase::Shutdown;
        source.shutdown().await;
        self.store
            .save(&self.history)
            .await
            .with_context(|| format!("saving {}", self.store.path().display()))?;
        info!("Saved {} history records", self.history.len());
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.history).await {
            error!("Failed to save history: {}", e);
        }
    }
}
