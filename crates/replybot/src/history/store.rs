//! JSON file history store.

use log::{debug, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use replybot_protocol::ChatHistory;

use super::{HistoryError, HistoryResult};

/// Single-writer JSON file holding the full [`ChatHistory`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the store holding an empty history if it does not exist yet.
    ///
    /// An existing file is left untouched, whatever its content.
    pub async fn initialize(&self) -> HistoryResult<()> {
        if fs::try_exists(&self.path)
            .await
            .map_err(|e| HistoryError::io(&self.path, e))?
        {
            return Ok(());
        }

        self.save(&ChatHistory::new()).await?;
        info!("Initialized new chat history file at {}", self.path.display());
        Ok(())
    }

    /// Load the history, degrading to an empty log on any failure.
    pub async fn load(&self) -> ChatHistory {
        match self.try_load().await {
            Ok(history) => {
                info!(
                    "Chat history loaded: {} record(s) from {}",
                    history.len(),
                    self.path.display()
                );
                history
            }
            Err(e) => {
                warn!("Could not load chat history, starting empty: {}", e);
                ChatHistory::new()
            }
        }
    }

    /// Load the history, reporting why it could not be read.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn try_load(&self) -> HistoryResult<ChatHistory> {
        let raw = fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HistoryError::NotFound(self.path.clone())
            } else {
                HistoryError::io(&self.path, e)
            }
        })?;

        serde_json::from_slice(&raw).map_err(|source| HistoryError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the store with `history`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the store.
    #[instrument(skip(self, history), fields(path = %self.path.display(), records = history.len()))]
    pub async fn save(&self, history: &ChatHistory) -> HistoryResult<()> {
        let body = serde_json::to_vec_pretty(history).map_err(HistoryError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HistoryError::io(parent, e))?;
        }

        let tmp_path = self.temp_path();
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| HistoryError::io(&tmp_path, e))?;
        file.write_all(&body)
            .await
            .map_err(|e| HistoryError::io(&tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| HistoryError::io(&tmp_path, e))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(HistoryError::io(&self.path, e));
        }

        debug!(
            "Saved {} record(s) to {}",
            history.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("history"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
