//! Conversation records and companion events.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender id used for records the bot itself sent.
pub const OWN_SENDER_ID: &str = "me";

/// When a record was produced.
///
/// Live inbound events carry epoch milliseconds from the companion driver.
/// Records the bot creates (replies, scraped history) carry an RFC 3339
/// string. Both forms are kept exactly as they were written so a store
/// round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Unix milliseconds.
    EpochMillis(i64),
    /// ISO-8601 / RFC 3339 text.
    Iso(String),
}

impl Timestamp {
    /// Current wall-clock time as an RFC 3339 string.
    pub fn now() -> Self {
        Timestamp::Iso(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::EpochMillis(ms)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::EpochMillis(ms) => write!(f, "{ms}"),
            Timestamp::Iso(text) => f.write_str(text),
        }
    }
}

/// One turn of the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender_id: String,
    pub text: String,
    pub timestamp: Timestamp,
}

impl MessageRecord {
    pub fn new(
        sender_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<Timestamp>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    /// A reply sent by the bot, stamped with the current time.
    pub fn outbound(text: impl Into<String>) -> Self {
        Self::new(OWN_SENDER_ID, text, Timestamp::now())
    }

    /// Whether the bot (or the account owner, in scraped history) wrote this.
    pub fn is_own(&self) -> bool {
        self.sender_id.eq_ignore_ascii_case(OWN_SENDER_ID)
    }
}

/// Ordered conversation log. Insertion order is the context order handed to
/// the generator; duplicates are separate turns and are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory(Vec<MessageRecord>);

impl ChatHistory {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, record: MessageRecord) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&MessageRecord> {
        self.0.last()
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.0
    }

    /// The newest `n` records, oldest first.
    pub fn tail(&self, n: usize) -> &[MessageRecord] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }
}

impl From<Vec<MessageRecord>> for ChatHistory {
    fn from(records: Vec<MessageRecord>) -> Self {
        Self(records)
    }
}

impl FromIterator<MessageRecord> for ChatHistory {
    fn from_iter<I: IntoIterator<Item = MessageRecord>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a MessageRecord;
    type IntoIter = std::slice::Iter<'a, MessageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Inbound message announced by the companion driver on one stdout line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: String,
    pub text: String,
    /// Unix milliseconds (`Date.now()` in the driver).
    pub timestamp: i64,
}

impl From<InboundEvent> for MessageRecord {
    fn from(event: InboundEvent) -> Self {
        MessageRecord::new(event.sender_id, event.text, event.timestamp)
    }
}
