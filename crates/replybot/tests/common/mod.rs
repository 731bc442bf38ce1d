//! Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use replybot::browser::{BrowserError, BrowserLauncher, BrowserResult, PageSession};
use replybot::companion::{
    AllowList, CompanionError, CompanionResult, EventSource, EventStream, SourcePoll,
};
use replybot::config::UiConfig;
use replybot::generator::ResponseGenerator;
use replybot::protocol::{ChatHistory, MessageRecord};
use replybot::ui::{Messenger, ScrapedMessage};

pub const TARGET: &str = "T1";

/// UI config with no sleeps, so retries and paging run instantly.
pub fn fast_ui_config() -> UiConfig {
    UiConfig {
        retry_delay_ms: 0,
        load_more_pause_ms: 0,
        ..UiConfig::default()
    }
}

pub fn scraped(items: &[(&str, &str)]) -> Vec<ScrapedMessage> {
    items
        .iter()
        .map(|(sender, text)| ScrapedMessage {
            sender_id: sender.to_string(),
            text: text.to_string(),
        })
        .collect()
}

pub fn event_line(sender: &str, text: &str, timestamp: i64) -> String {
    format!(
        "{}\n",
        serde_json::json!({"sender_id": sender, "text": text, "timestamp": timestamp})
    )
}

// ---------------------------------------------------------------------------
// Fake web client
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct WebState {
    /// Selectors that never appear: waits time out, counts are zero.
    pub missing: HashSet<String>,
    pub fail_launch: bool,
    pub fail_navigation: bool,
    /// Navigations that fail before the page starts loading again.
    pub fail_navigations: usize,
    /// Successive `evaluate` results.
    pub batches: VecDeque<Vec<ScrapedMessage>>,
    /// Returned once `batches` runs dry. `None` means an empty list.
    pub repeat: Option<Vec<ScrapedMessage>>,
    pub log: Vec<String>,
    pub launches: usize,
    pub closes: usize,
}

/// [`BrowserLauncher`] whose pages act on a shared, scripted [`WebState`].
#[derive(Clone, Default)]
pub struct FakeWeb {
    pub state: Arc<Mutex<WebState>>,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .missing
            .insert(selector.to_string());
        self
    }

    pub fn with_batches(self, batches: Vec<Vec<ScrapedMessage>>) -> Self {
        self.state.lock().unwrap().batches = batches.into();
        self
    }

    pub fn repeating(self, batch: Vec<ScrapedMessage>) -> Self {
        self.state.lock().unwrap().repeat = Some(batch);
        self
    }

    pub fn failing_launch(self) -> Self {
        self.state.lock().unwrap().fail_launch = true;
        self
    }

    pub fn failing_navigation(self) -> Self {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn failing_first_navigations(self, count: usize) -> Self {
        self.state.lock().unwrap().fail_navigations = count;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of logged calls whose entry starts with `prefix`.
    pub fn calls(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl BrowserLauncher for FakeWeb {
    async fn launch(&self) -> BrowserResult<Box<dyn PageSession>> {
        let mut state = self.state.lock().unwrap();
        state.launches += 1;
        if state.fail_launch {
            return Err(BrowserError::Launch {
                session: "fake".to_string(),
                message: "launch refused".to_string(),
            });
        }
        Ok(Box::new(FakePage {
            name: format!("fake-{}", state.launches),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

pub struct FakePage {
    name: String,
    state: Arc<Mutex<WebState>>,
    closed: bool,
}

impl FakePage {
    fn record(&self, entry: String) -> std::sync::MutexGuard<'_, WebState> {
        let mut state = self.state.lock().unwrap();
        state.log.push(entry);
        state
    }
}

#[async_trait]
impl PageSession for FakePage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let mut state = self.record(format!("navigate {url}"));
        if state.fail_navigation {
            return Err(BrowserError::action("navigate", "net::ERR_NAME_NOT_RESOLVED"));
        }
        if state.fail_navigations > 0 {
            state.fail_navigations -= 1;
            return Err(BrowserError::action("navigate", "net::ERR_CONNECTION_RESET"));
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let state = self.record(format!("wait {selector}"));
        if state.missing.contains(selector) {
            return Err(BrowserError::Timeout {
                action: "wait",
                millis: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> BrowserResult<usize> {
        let state = self.record(format!("count {selector}"));
        Ok(if state.missing.contains(selector) { 0 } else { 1 })
    }

    async fn hover(&mut self, selector: &str) -> BrowserResult<()> {
        self.record(format!("hover {selector}"));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        let state = self.record(format!("click {selector}"));
        if state.missing.contains(selector) {
            return Err(BrowserError::NotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> BrowserResult<()> {
        self.record(format!("type {selector} {text}"));
        Ok(())
    }

    async fn press(&mut self, key: &str) -> BrowserResult<()> {
        self.record(format!("press {key}"));
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> BrowserResult<Value> {
        let mut state = self.record("evaluate".to_string());
        let batch = match state.batches.pop_front() {
            Some(batch) => batch,
            None => state.repeat.clone().unwrap_or_default(),
        };
        Ok(serde_json::to_value(batch).unwrap())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.record("close".to_string());
            state.closes += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator collaborators
// ---------------------------------------------------------------------------

/// [`Messenger`] that records sends and appends canned records on fetch.
#[derive(Clone, Default)]
pub struct StubMessenger {
    pub send_ok: bool,
    pub scraped: Vec<MessageRecord>,
    pub sends: Arc<Mutex<Vec<(String, String)>>>,
    pub fetches: Arc<AtomicUsize>,
}

impl StubMessenger {
    pub fn succeeding() -> Self {
        Self {
            send_ok: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for StubMessenger {
    async fn send(&self, recipient_id: &str, text: &str) -> bool {
        self.sends
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), text.to_string()));
        self.send_ok
    }

    async fn fetch_history(&self, _target_id: &str, mut existing: ChatHistory) -> ChatHistory {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        for record in &self.scraped {
            existing.push(record.clone());
        }
        existing
    }
}

/// [`ResponseGenerator`] with a fixed reply.
#[derive(Clone)]
pub struct StubGenerator {
    pub reply: String,
    pub calls: Arc<AtomicUsize>,
    /// History length seen by each call.
    pub seen: Arc<Mutex<Vec<usize>>>,
}

impl StubGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for StubGenerator {
    async fn generate(&self, history: &ChatHistory, _incoming: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(history.len());
        self.reply.clone()
    }
}

/// [`EventSource`] over an in-memory stream of driver output.
pub struct ScriptedSource {
    stream: Option<EventStream>,
    pending: Option<EventStream>,
    allow: AllowList,
    pub fail_start: bool,
    pub exited: Option<String>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// Source that replays `output` and then closes.
    pub fn from_output(output: &str) -> Self {
        Self::from_stream(EventStream::spawn(
            Cursor::new(output.as_bytes().to_vec()),
            16,
        ))
    }

    pub fn from_stream(stream: EventStream) -> Self {
        Self {
            stream: None,
            pending: Some(stream),
            allow: AllowList::new(TARGET),
            fail_start: false,
            exited: None,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn start(&mut self) -> CompanionResult<()> {
        if self.fail_start {
            return Err(CompanionError::Spawn {
                binary: "node".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "node not found"),
            });
        }
        match self.pending.take() {
            Some(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            None => Err(CompanionError::AlreadyStarted),
        }
    }

    fn exit_status(&mut self) -> Option<String> {
        self.exited.clone()
    }

    async fn poll(&mut self, wait: Duration) -> SourcePoll {
        match self.stream.as_mut() {
            Some(stream) => stream.poll(&self.allow, wait).await,
            None => SourcePoll::Closed,
        }
    }

    async fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.stream = None;
    }
}
