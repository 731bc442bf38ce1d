//! replybot: a one-to-one chat auto-responder.
//!
//! Inbound messages arrive from a companion driver process, replies come from
//! a text-generation service and go out by driving the messenger's web client
//! through an agent-browser daemon. See [`orchestrator::Orchestrator`] for the
//! lifecycle that ties the pieces together.

pub mod browser;
pub mod companion;
pub mod config;
pub mod generator;
pub mod history;
pub mod orchestrator;
pub mod ui;

pub use replybot_protocol as protocol;
