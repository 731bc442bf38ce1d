//! Durable conversation log.
//!
//! The store is a single JSON file holding the whole ordered history. It is
//! rewritten wholesale on every save through a temp file and a rename, so a
//! reader never observes a half-written log.

mod error;
mod store;

pub use error::{HistoryError, HistoryResult};
pub use store::HistoryStore;
