//! agent-browser daemon backend.
//!
//! Each session is a separate daemon started through the agent-browser CLI
//! (`--session <name> open about:blank`). After launch, commands go straight
//! to the daemon's Unix socket as newline-delimited JSON, one connection per
//! command. All sessions share the persistent profile directory, which keeps
//! the web client logged in across calls.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use replybot_protocol::{BrowserAction, BrowserRequest, BrowserResponse, WaitState, WaitUntil};

use super::{BrowserError, BrowserLauncher, BrowserResult, PageSession};
use crate::config::BrowserConfig;

/// Launcher for agent-browser backed sessions.
#[derive(Debug, Clone)]
pub struct AgentBrowser {
    config: BrowserConfig,
    profile_dir: PathBuf,
}

impl AgentBrowser {
    pub fn new(config: BrowserConfig, profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            profile_dir: profile_dir.into(),
        }
    }

    fn socket_base(&self) -> PathBuf {
        match self.config.socket_dir_base {
            Some(ref dir) => PathBuf::from(dir),
            None => agent_browser_base_dir(),
        }
    }

    async fn run_cli(&self, session: &str, socket_dir: &Path, args: &[&str]) -> BrowserResult<()> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--session").arg(session);

        if self.config.headed {
            cmd.arg("--headed");
        }
        if let Some(ref executable_path) = self.config.executable_path {
            cmd.arg("--executable-path").arg(executable_path);
        }
        cmd.arg("--profile").arg(&self.profile_dir);
        cmd.env("AGENT_BROWSER_SOCKET_DIR", socket_dir);
        cmd.args(args);
        cmd.kill_on_drop(true);

        debug!(
            "agent-browser command: {} {:?} (session={})",
            self.config.binary, args, session
        );

        let launch_err = |message: String| BrowserError::Launch {
            session: session.to_string(),
            message,
        };

        let output = timeout(
            Duration::from_secs(self.config.launch_timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| launch_err("agent-browser command timed out".to_string()))?
        .map_err(|e| launch_err(format!("running {}: {}", self.config.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if !stderr.is_empty() { stderr } else { stdout };
            return Err(launch_err(format!("agent-browser command failed: {detail}")));
        }

        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for AgentBrowser {
    async fn launch(&self) -> BrowserResult<Box<dyn PageSession>> {
        let session = browser_session_name();
        let socket_dir = self.socket_base().join(&session);

        tokio::fs::create_dir_all(&socket_dir).await?;
        restrict_permissions(&socket_dir).await;
        tokio::fs::create_dir_all(&self.profile_dir).await?;

        if let Err(e) = self
            .run_cli(&session, &socket_dir, &["open", "about:blank"])
            .await
        {
            let _ = tokio::fs::remove_dir_all(&socket_dir).await;
            return Err(e);
        }

        let w = self.config.viewport_width.to_string();
        let h = self.config.viewport_height.to_string();
        if let Err(e) = self
            .run_cli(&session, &socket_dir, &["set", "viewport", &w, &h])
            .await
        {
            warn!("Could not set viewport for session {}: {}", session, e);
        }

        Ok(Box::new(
            DaemonPage::attach(
                session,
                socket_dir,
                Duration::from_secs(self.config.command_timeout_secs),
            )
            .with_wait_until(self.config.wait_until),
        ))
    }
}

/// Socket dirs are private to the current user.
#[cfg(unix)]
async fn restrict_permissions(dir: &Path) {
    if let Err(err) =
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await
    {
        warn!(
            "Failed to set permissions for agent-browser socket dir {}: {}",
            dir.display(),
            err
        );
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_dir: &Path) {}

/// A live daemon session reached over its socket.
#[derive(Debug)]
pub(crate) struct DaemonPage {
    session: String,
    session_dir: PathBuf,
    io_timeout: Duration,
    wait_until: WaitUntil,
    closed: bool,
}

impl DaemonPage {
    pub(crate) fn attach(session: String, session_dir: PathBuf, io_timeout: Duration) -> Self {
        Self {
            session,
            session_dir,
            io_timeout,
            wait_until: WaitUntil::Load,
            closed: false,
        }
    }

    pub(crate) fn with_wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = wait_until;
        self
    }

    fn socket_path(&self) -> PathBuf {
        self.session_dir.join(format!("{}.sock", self.session))
    }

    async fn send(&self, action: BrowserAction) -> BrowserResult<BrowserResponse> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        self.exchange(action).await
    }

    async fn exchange(&self, action: BrowserAction) -> BrowserResult<BrowserResponse> {
        let name = action.name();
        let budget = self.io_timeout + Duration::from_millis(action.wait_budget_ms());
        let request = BrowserRequest::new(action);
        let line = request.to_line().map_err(|e| BrowserError::Protocol {
            action: name,
            message: e.to_string(),
        })?;

        let response = timeout(budget, round_trip(&self.socket_path(), name, &line))
            .await
            .map_err(|_| BrowserError::Timeout {
                action: name,
                millis: budget.as_millis() as u64,
            })??;

        if response.id != request.id {
            warn!(
                "Daemon answered request {} with id {} (session {})",
                request.id, response.id, self.session
            );
        }
        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| "Command failed".to_string());
            return Err(BrowserError::action(name, message));
        }
        Ok(response)
    }
}

#[cfg(unix)]
async fn round_trip(path: &Path, action: &'static str, line: &str) -> BrowserResult<BrowserResponse> {
    let mut stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|source| BrowserError::Connect {
            path: path.display().to_string(),
            source,
        })?;
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    if response_line.trim().is_empty() {
        return Err(BrowserError::Protocol {
            action,
            message: "empty response from daemon".to_string(),
        });
    }

    serde_json::from_str(&response_line).map_err(|e| BrowserError::Protocol {
        action,
        message: e.to_string(),
    })
}

#[cfg(not(unix))]
async fn round_trip(_path: &Path, _action: &'static str, _line: &str) -> BrowserResult<BrowserResponse> {
    Err(BrowserError::Unsupported)
}

#[async_trait]
impl PageSession for DaemonPage {
    fn name(&self) -> &str {
        &self.session
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.send(BrowserAction::Navigate {
            url: url.to_string(),
            wait_until: Some(self.wait_until),
        })
        .await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.send(BrowserAction::Wait {
            selector: Some(selector.to_string()),
            timeout: Some(timeout.as_millis() as u64),
            state: Some(WaitState::Visible),
        })
        .await?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> BrowserResult<usize> {
        let response = self
            .send(BrowserAction::Count {
                selector: selector.to_string(),
            })
            .await?;
        response
            .field("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| BrowserError::Protocol {
                action: "count",
                message: "response has no numeric count".to_string(),
            })
    }

    async fn hover(&mut self, selector: &str) -> BrowserResult<()> {
        self.send(BrowserAction::Hover {
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.send(BrowserAction::Click {
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> BrowserResult<()> {
        self.send(BrowserAction::Type {
            selector: selector.to_string(),
            text: text.to_string(),
            delay: None,
            clear: Some(true),
        })
        .await?;
        Ok(())
    }

    async fn press(&mut self, key: &str) -> BrowserResult<()> {
        self.send(BrowserAction::Press {
            key: key.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value> {
        let response = self
            .send(BrowserAction::Evaluate {
                script: script.to_string(),
            })
            .await?;
        Ok(response.field("result").cloned().unwrap_or(Value::Null))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.exchange(BrowserAction::Close).await.map(|_| ());
        if let Err(e) = tokio::fs::remove_dir_all(&self.session_dir).await {
            debug!(
                "Could not remove session dir {}: {}",
                self.session_dir.display(),
                e
            );
        }
        result
    }
}

/// Resolve the base directory for agent-browser session socket directories.
///
/// Priority:
///   AGENT_BROWSER_SOCKET_DIR_BASE > XDG_STATE_HOME/replybot/agent-browser >
///   ~/.local/state/replybot/agent-browser > tmpdir/replybot/agent-browser
pub fn agent_browser_base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENT_BROWSER_SOCKET_DIR_BASE") {
        return PathBuf::from(dir);
    }
    if let Ok(state_dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_dir)
            .join("replybot")
            .join("agent-browser");
    }
    if let Some(home) = dirs::home_dir() {
        return home
            .join(".local")
            .join("state")
            .join("replybot")
            .join("agent-browser");
    }
    std::env::temp_dir().join("replybot").join("agent-browser")
}

/// Fresh short session name.
///
/// Unix socket paths are limited to about 103 bytes and the name appears in
/// both the directory and the socket file name, so keep it short.
pub fn browser_session_name() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("rb-{}", &simple[..12])
}
