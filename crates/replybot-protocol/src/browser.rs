//! agent-browser daemon wire protocol.
//!
//! Each command is one JSON object terminated by a newline, written to the
//! session's Unix socket. The daemon answers with one [`BrowserResponse`] line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

/// The subset of daemon actions the UI executor drives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BrowserAction {
    Navigate {
        url: String,
        #[serde(rename = "waitUntil", skip_serializing_if = "Option::is_none")]
        wait_until: Option<WaitUntil>,
    },
    Wait {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<WaitState>,
    },
    Count {
        selector: String,
    },
    Hover {
        selector: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        clear: Option<bool>,
    },
    Press {
        key: String,
    },
    Evaluate {
        script: String,
    },
    Close,
}

impl BrowserAction {
    /// Action name as the daemon sees it, for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Wait { .. } => "wait",
            BrowserAction::Count { .. } => "count",
            BrowserAction::Hover { .. } => "hover",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Type { .. } => "type",
            BrowserAction::Press { .. } => "press",
            BrowserAction::Evaluate { .. } => "evaluate",
            BrowserAction::Close => "close",
        }
    }

    /// Milliseconds the daemon may legitimately block on this action.
    pub fn wait_budget_ms(&self) -> u64 {
        match self {
            BrowserAction::Wait { timeout, .. } => timeout.unwrap_or(0),
            _ => 0,
        }
    }
}

/// A command envelope: a fresh request id plus the flattened action.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserRequest {
    pub id: String,
    #[serde(flatten)]
    pub action: BrowserAction,
}

impl BrowserRequest {
    pub fn new(action: BrowserAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
        }
    }

    /// Serialize as a single newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserResponse {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BrowserResponse {
    /// Look up a field of the `data` object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref()?.get(key)
    }
}
