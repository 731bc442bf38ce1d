//! Configuration schema.
//!
//! Every section deserializes with defaults so a partial TOML file (or none at
//! all) yields a runnable configuration. The binary layers the file, then
//! `REPLYBOT__SECTION__KEY` environment variables, then CLI flags.

use replybot_protocol::WaitUntil;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub bot: BotConfig,
    pub companion: CompanionConfig,
    pub browser: BrowserConfig,
    pub ui: UiConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Explicit log file. Takes precedence over `daily_file`.
    pub file: Option<String>,
    /// Write `replybot_YYYYMMDD.log` into the state directory.
    pub daily_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            daily_file: false,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: Option<String>,
    pub state_dir: Option<String>,
}

/// Identity of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The bot account's own id. Passed to the driver so it can drop
    /// self-originated messages.
    pub phone_number: Option<String>,
    /// The single allow-listed conversation partner.
    pub target_phone_number: Option<String>,
    /// Sent once after startup.
    pub greeting: String,
    /// Delay between event polls.
    pub poll_interval_ms: u64,
    /// History file. Defaults to `<data_dir>/chat_history.json`.
    pub history_file: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            phone_number: None,
            target_phone_number: None,
            greeting: "Hello! This is an automated message.".to_string(),
            poll_interval_ms: 1000,
            history_file: None,
        }
    }
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Companion driver process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub node_binary: String,
    pub npm_binary: String,
    /// Driver directory. Defaults to `<data_dir>/companion`.
    pub driver_dir: Option<String>,
    pub script_name: String,
    /// npm packages installed on first setup.
    pub packages: Vec<String>,
    /// Install npm packages when `node_modules` is missing.
    pub auto_install: bool,
    /// How long to wait for the driver after SIGINT before killing it.
    pub shutdown_timeout_secs: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            node_binary: "node".to_string(),
            npm_binary: "npm".to_string(),
            driver_dir: None,
            script_name: "whatsapp.js".to_string(),
            packages: vec![
                "whatsapp-web.js".to_string(),
                "qrcode-terminal".to_string(),
            ],
            auto_install: true,
            shutdown_timeout_secs: 10,
        }
    }
}

/// agent-browser daemon integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Path to the agent-browser CLI binary.
    pub binary: String,
    /// Launch the browser with a visible window.
    pub headed: bool,
    /// Optional Chromium executable path.
    pub executable_path: Option<String>,
    /// Persistent profile directory. Defaults to `<data_dir>/browser-profile`.
    pub profile_dir: Option<String>,
    /// Base directory for per-session socket dirs.
    pub socket_dir_base: Option<String>,
    /// Budget for launching the daemon through the CLI.
    pub launch_timeout_secs: u64,
    /// Socket I/O budget added on top of any wait the command itself does.
    pub command_timeout_secs: u64,
    /// Page event a navigation waits for before it answers.
    pub wait_until: WaitUntil,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: "agent-browser".to_string(),
            headed: true,
            executable_path: None,
            profile_dir: None,
            socket_dir_base: None,
            launch_timeout_secs: 30,
            command_timeout_secs: 15,
            wait_until: WaitUntil::Load,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// Web client selectors. Third-party markup changes without notice, so every
/// one of these is overridable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub compose_input: String,
    /// Looser input match used to detect that the conversation pane is ready.
    pub any_input: String,
    pub send_button: String,
    pub last_message: String,
    pub message_bubbles: String,
    /// Class marking a bubble as written by the other party.
    pub incoming_class: String,
    /// Text node inside a bubble.
    pub message_text: String,
    pub reply_button: String,
    pub load_earlier: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            compose_input:
                r#"div[contenteditable="true"][data-testid="conversation-compose-box-input"]"#
                    .to_string(),
            any_input: r#"div[contenteditable="true"]"#.to_string(),
            send_button: r#"span[data-testid="send"]"#.to_string(),
            last_message: "div.message-in:last-child, div.message-out:last-child".to_string(),
            message_bubbles: "div.message-in, div.message-out".to_string(),
            incoming_class: "message-in".to_string(),
            message_text: "span.selectable-text".to_string(),
            reply_button: r#"div[aria-label="Reply"]"#.to_string(),
            load_earlier: r#"div[aria-label="Load earlier messages"]"#.to_string(),
        }
    }
}

/// UI executor timings and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub input_wait_ms: u64,
    pub message_wait_ms: u64,
    pub reply_wait_ms: u64,
    pub send_button_wait_ms: u64,
    pub history_input_wait_ms: u64,
    pub retry_delay_ms: u64,
    pub load_more_pause_ms: u64,
    pub history_limit: usize,
    pub selectors: Selectors,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://web.whatsapp.com".to_string(),
            max_retries: 3,
            input_wait_ms: 30_000,
            message_wait_ms: 30_000,
            reply_wait_ms: 30_000,
            send_button_wait_ms: 20_000,
            history_input_wait_ms: 60_000,
            retry_delay_ms: 2_000,
            load_more_pause_ms: 2_000,
            history_limit: 100,
            selectors: Selectors::default(),
        }
    }
}

/// Text generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// How many history records the prompt carries.
    pub context_messages: usize,
    /// Sent when generation fails for any reason.
    pub fallback_reply: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
            context_messages: 10,
            fallback_reply: crate::generator::FALLBACK_REPLY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [bot]
            target_phone_number = "15550001111@c.us"

            [ui.selectors]
            send_button = "button.send"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.bot.target_phone_number.as_deref(),
            Some("15550001111@c.us")
        );
        assert_eq!(config.bot.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.ui.selectors.send_button, "button.send");
        assert_eq!(
            config.ui.selectors.reply_button,
            Selectors::default().reply_button
        );
        assert_eq!(config.ui.max_retries, 3);
        assert_eq!(config.ui.history_limit, 100);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.ui.selectors, Selectors::default());
        assert_eq!(parsed.companion.script_name, "whatsapp.js");
    }
}
