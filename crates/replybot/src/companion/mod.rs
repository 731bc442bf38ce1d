//! Event source backed by the companion Node.js driver.
//!
//! The driver runs as a child process and reports inbound messages on stdout
//! as JSON lines. [`Companion`] owns the child and its [`EventStream`] and
//! hands the orchestrator only allow-listed events.

mod error;
mod events;
mod process;
mod setup;

pub use error::{CompanionError, CompanionResult, SetupError, SetupResult};
pub use events::{
    AllowList, CompanionLine, DecodeError, EventStream, SourcePoll, StreamItem, classify_line,
};
pub use process::{CompanionLaunch, CompanionProcess, script_path};
pub use setup::{DRIVER_SCRIPT, ensure_driver};

use async_trait::async_trait;
use log::info;
use std::time::Duration;

/// Source of inbound chat events.
#[async_trait]
pub trait EventSource: Send {
    /// Start producing events. Calling it twice is an error.
    async fn start(&mut self) -> CompanionResult<()>;

    /// Description of the producer's exit, if it has terminated.
    fn exit_status(&mut self) -> Option<String>;

    /// Wait up to `wait` for the next allow-listed event.
    async fn poll(&mut self, wait: Duration) -> SourcePoll;

    /// Stop the producer. Safe to call more than once.
    async fn shutdown(&mut self);
}

/// [`EventSource`] over the companion driver process.
pub struct Companion {
    launch: CompanionLaunch,
    allow: AllowList,
    process: Option<CompanionProcess>,
    stream: Option<EventStream>,
    last_exit: Option<String>,
}

impl Companion {
    pub fn new(launch: CompanionLaunch, allow: AllowList) -> Self {
        Self {
            launch,
            allow,
            process: None,
            stream: None,
            last_exit: None,
        }
    }
}

#[async_trait]
impl EventSource for Companion {
    async fn start(&mut self) -> CompanionResult<()> {
        if self.process.is_some() {
            return Err(CompanionError::AlreadyStarted);
        }
        let (process, stream) = CompanionProcess::spawn(&self.launch)?;
        self.process = Some(process);
        self.stream = Some(stream);
        Ok(())
    }

    fn exit_status(&mut self) -> Option<String> {
        match self.process.as_mut() {
            Some(process) => process.try_exit().map(|status| status.to_string()),
            None => self.last_exit.clone(),
        }
    }

    async fn poll(&mut self, wait: Duration) -> SourcePoll {
        match self.stream.as_mut() {
            Some(stream) => stream.poll(&self.allow, wait).await,
            None => SourcePoll::Closed,
        }
    }

    async fn shutdown(&mut self) {
        // Stdout stays open until the driver is gone.
        if let Some(mut process) = self.process.take() {
            info!("Stopping companion process (pid {:?})", process.pid());
            self.last_exit = process
                .shutdown(self.launch.shutdown_timeout)
                .await
                .map(|status| status.to_string());
        }
        self.stream = None;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn companion(dir: &TempDir, body: &str, target: &str) -> Companion {
        let script = dir.path().join("driver.sh");
        std::fs::write(&script, body).unwrap();
        Companion::new(
            CompanionLaunch {
                node_binary: "sh".to_string(),
                script,
                working_dir: dir.path().to_path_buf(),
                env: Vec::new(),
                shutdown_timeout: Duration::from_secs(2),
            },
            AllowList::new(target),
        )
    }

    #[tokio::test]
    async fn test_unstarted_source_is_closed() {
        let dir = TempDir::new().unwrap();
        let mut source = companion(&dir, "", "T1");
        assert_eq!(
            source.poll(Duration::from_millis(10)).await,
            SourcePoll::Closed
        );
        assert!(source.exit_status().is_none());
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_poll_and_exit() {
        let dir = TempDir::new().unwrap();
        let mut source = companion(
            &dir,
            "echo '{\"sender_id\":\"X\",\"text\":\"no\",\"timestamp\":1}'\n\
             echo '{\"sender_id\":\"T1\",\"text\":\"yes\",\"timestamp\":2}'\n",
            "T1",
        );
        source.start().await.unwrap();
        assert!(matches!(
            source.start().await,
            Err(CompanionError::AlreadyStarted)
        ));

        let wait = Duration::from_secs(2);
        assert_eq!(source.poll(wait).await, SourcePoll::Idle);
        assert!(matches!(
            source.poll(wait).await,
            SourcePoll::Event(ref e) if e.text == "yes"
        ));
        assert_eq!(source.poll(wait).await, SourcePoll::Closed);

        source.shutdown().await;
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_lets_driver_exit_cleanly() {
        let dir = TempDir::new().unwrap();
        let mut source = companion(
            &dir,
            "trap 'echo stopping; exit 0' INT\n\
             while true; do sleep 0.1; done\n",
            "T1",
        );
        source.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(source.exit_status().is_none());

        source.shutdown().await;
        assert_eq!(source.exit_status().as_deref(), Some("exit status: 0"));
        assert_eq!(
            source.poll(Duration::from_millis(10)).await,
            SourcePoll::Closed
        );
    }
}
