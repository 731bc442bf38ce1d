//! Wire types for replybot.
//!
//! Three boundaries share these types:
//!
//! ```text
//! companion driver --[stdout: one JSON event per line]--> replybot
//! replybot --[history file: JSON array of records]--> disk
//! replybot --[unix socket: JSON command per line]--> agent-browser daemon
//! ```
//!
//! Records are persistent, events are ephemeral. An [`InboundEvent`] only
//! becomes part of the conversation once it is accepted and turned into a
//! [`MessageRecord`].

pub mod browser;
pub mod records;

pub use browser::{BrowserAction, BrowserRequest, BrowserResponse, WaitState, WaitUntil};
pub use records::{ChatHistory, InboundEvent, MessageRecord, OWN_SENDER_ID, Timestamp};
