//! Browser session abstraction.
//!
//! A [`BrowserLauncher`] hands out fresh, isolated [`PageSession`]s. Sessions
//! are never shared or pooled: every UI operation launches its own, drives it,
//! and closes it. [`SessionGuard`] owns a session for the duration of one
//! operation and guarantees the close.

mod daemon;
mod error;

pub use daemon::{AgentBrowser, agent_browser_base_dir, browser_session_name};
pub use error::{BrowserError, BrowserResult};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;

/// Opens browser sessions backed by the persistent profile.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn PageSession>>;
}

/// One live page. All selectors are CSS selectors.
#[async_trait]
pub trait PageSession: Send {
    /// Session name, for logs.
    fn name(&self) -> &str;

    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Wait until `selector` matches a visible element.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&mut self, selector: &str) -> BrowserResult<usize>;

    async fn hover(&mut self, selector: &str) -> BrowserResult<()>;

    async fn click(&mut self, selector: &str) -> BrowserResult<()>;

    /// Type into an element, replacing whatever it held.
    async fn type_text(&mut self, selector: &str, text: &str) -> BrowserResult<()>;

    /// Press a key on the focused element (`Enter`, `Tab`, ...).
    async fn press(&mut self, key: &str) -> BrowserResult<()>;

    /// Evaluate a script expression and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value>;

    /// Shut the session down. Must be safe to call more than once.
    async fn close(&mut self) -> BrowserResult<()>;
}

/// Scoped ownership of a [`PageSession`].
///
/// Call [`SessionGuard::release`] on every exit path. If the guard is dropped
/// without release (panic, cancelled future) the close is scheduled on the
/// current runtime instead.
pub struct SessionGuard {
    page: Option<Box<dyn PageSession>>,
}

impl SessionGuard {
    /// Launch a session and take ownership of it.
    pub async fn acquire(launcher: &dyn BrowserLauncher) -> BrowserResult<Self> {
        let page = launcher.launch().await?;
        debug!("Browser session {} acquired", page.name());
        Ok(Self { page: Some(page) })
    }

    pub fn page(&mut self) -> BrowserResult<&mut (dyn PageSession + 'static)> {
        self.page.as_deref_mut().ok_or(BrowserError::Closed)
    }

    /// Close the session. Close failures are logged, never returned.
    pub async fn release(mut self) {
        if let Some(mut page) = self.page.take() {
            close_logged(page.as_mut()).await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };
        warn!(
            "Browser session {} dropped without release, closing in background",
            page.name()
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_logged(page.as_mut()).await;
                });
            }
            Err(_) => warn!("No runtime available to close browser session"),
        }
    }
}

async fn close_logged(page: &mut dyn PageSession) {
    let name = page.name().to_string();
    match page.close().await {
        Ok(()) => debug!("Browser session {} closed", name),
        Err(e) => warn!("Failed to close browser session {}: {}", name, e),
    }
}
