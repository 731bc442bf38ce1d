//! Companion child process handle.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::error::{CompanionError, CompanionResult};
use super::events::EventStream;

/// Everything needed to start the driver.
#[derive(Debug, Clone)]
pub struct CompanionLaunch {
    pub node_binary: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub shutdown_timeout: Duration,
}

/// Handle to the running driver.
#[derive(Debug)]
pub struct CompanionProcess {
    pid: Option<u32>,
    child: Child,
}

impl CompanionProcess {
    /// Spawn the driver with piped stdout and stderr.
    ///
    /// Stdout is handed back as an [`EventStream`]. Stderr is drained into
    /// the log so the child never blocks on a full pipe.
    pub fn spawn(launch: &CompanionLaunch) -> CompanionResult<(Self, EventStream)> {
        let mut cmd = Command::new(&launch.node_binary);
        cmd.arg(&launch.script)
            .current_dir(&launch.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &launch.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| CompanionError::Spawn {
            binary: launch.node_binary.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(CompanionError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(CompanionError::MissingPipe("stderr"))?;

        let pid = child.id();
        info!(
            "Started companion {} (pid {:?})",
            launch.script.display(),
            pid
        );

        tokio::spawn(Self::stderr_reader_task(stderr));
        let stream = EventStream::spawn(stdout, 64);
        Ok((Self { pid, child }, stream))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the child has terminated.
    pub fn try_exit(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to check companion status: {:?}", e);
                None
            }
        }
    }

    /// Interrupt the child, wait up to `grace`, then kill it.
    ///
    /// Returns the exit status once the child is gone. Keep the stdout
    /// [`EventStream`] alive until this returns so the child can still write
    /// while it winds down.
    pub async fn shutdown(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.try_exit() {
            debug!("Companion already exited with {}", status);
            return Some(status);
        }

        if self.interrupt() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    info!("Companion exited with {}", status);
                    return Some(status);
                }
                Ok(Err(e)) => warn!("Failed waiting for companion: {:?}", e),
                Err(_) => warn!(
                    "Companion did not exit within {:?} of SIGINT, killing",
                    grace
                ),
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill companion: {:?}", e);
            return None;
        }
        self.try_exit()
    }

    #[cfg(unix)]
    fn interrupt(&self) -> bool {
        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGINT) };
        if rc != 0 {
            warn!(
                "Failed to send SIGINT to companion: {}",
                std::io::Error::last_os_error()
            );
        }
        rc == 0
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> bool {
        false
    }

    async fn stderr_reader_task(stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        warn!("companion stderr: {}", line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Companion stderr reader stopped: {:?}", e);
                    break;
                }
            }
        }
    }
}

/// Script path inside the driver directory.
pub fn script_path(driver_dir: &Path, script_name: &str) -> PathBuf {
    driver_dir.join(script_name)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh_launch(dir: &TempDir, body: &str) -> CompanionLaunch {
        let script = dir.path().join("driver.sh");
        std::fs::write(&script, body).unwrap();
        CompanionLaunch {
            node_binary: "sh".to_string(),
            script,
            working_dir: dir.path().to_path_buf(),
            env: vec![("TARGET_PHONE_NUMBER".to_string(), "T1".to_string())],
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_spawn_streams_stdout_events() {
        let dir = TempDir::new().unwrap();
        let launch = sh_launch(
            &dir,
            "echo 'Client is ready!'\n\
             printf '{\"sender_id\":\"%s\",\"text\":\"hi\",\"timestamp\":100}\\n' \"$TARGET_PHONE_NUMBER\"\n\
             echo oops >&2\n",
        );

        let (mut process, mut stream) = CompanionProcess::spawn(&launch).unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.sender_id, "T1");
        assert_eq!(event.text, "hi");
        assert!(stream.next().await.is_none());

        process.shutdown(Duration::from_secs(1)).await;
        assert!(process.try_exit().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_running_child() {
        let dir = TempDir::new().unwrap();
        let launch = sh_launch(&dir, "sleep 30\n");

        let (mut process, _stream) = CompanionProcess::spawn(&launch).unwrap();
        assert!(process.try_exit().is_none());

        let started = std::time::Instant::now();
        process.shutdown(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(process.try_exit().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_kills_after_grace() {
        let dir = TempDir::new().unwrap();
        let launch = sh_launch(&dir, "trap '' INT\nwhile true; do sleep 1; done\n");

        let (mut process, _stream) = CompanionProcess::spawn(&launch).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = process.shutdown(Duration::from_millis(300)).await.unwrap();
        assert!(!status.success());
        assert!(process.try_exit().is_some());
    }

    #[tokio::test]
    async fn test_child_can_write_while_stopping() {
        let dir = TempDir::new().unwrap();
        let launch = sh_launch(
            &dir,
            "line='{\"sender_id\":\"T1\",\"text\":\"bye\",\"timestamp\":1}'\n\
             trap 'echo \"$line\"; exit 0' INT\n\
             while true; do sleep 0.1; done\n",
        );

        let (mut process, mut stream) = CompanionProcess::spawn(&launch).unwrap();
        assert!(process.pid().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = process.shutdown(Duration::from_secs(2)).await.unwrap();
        assert!(status.success());
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.text, "bye");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let dir = TempDir::new().unwrap();
        let mut launch = sh_launch(&dir, "");
        launch.node_binary = "/nonexistent/replybot-node".to_string();

        let err = CompanionProcess::spawn(&launch).map(|_| ()).unwrap_err();
        assert!(matches!(err, CompanionError::Spawn { .. }));
    }
}
