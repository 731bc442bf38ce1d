//! Driver directory preparation: runtime check, npm install, bundled script.

use log::info;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::error::{SetupError, SetupResult};
use super::process::script_path;
use crate::config::CompanionConfig;

/// Driver script shipped with the binary.
pub const DRIVER_SCRIPT: &str = include_str!("../../assets/companion.js");

/// Make sure `driver_dir` holds an installed driver and return the script path.
///
/// Dependencies are installed only when `node_modules` is absent. An existing
/// script is left untouched so local edits survive.
pub async fn ensure_driver(config: &CompanionConfig, driver_dir: &Path) -> SetupResult<PathBuf> {
    tokio::fs::create_dir_all(driver_dir).await?;

    let version = run_step(&config.node_binary, &["-v"], driver_dir).await?;
    info!("Node.js is installed ({})", version);

    let modules = driver_dir.join("node_modules");
    if !tokio::fs::try_exists(&modules).await? {
        if !config.auto_install {
            info!(
                "Skipping dependency install in {} (auto_install = false)",
                driver_dir.display()
            );
        } else {
            info!("Installing driver dependencies in {}", driver_dir.display());
            run_step(&config.npm_binary, &["init", "-y"], driver_dir).await?;

            let mut install = vec!["install"];
            install.extend(config.packages.iter().map(String::as_str));
            run_step(&config.npm_binary, &install, driver_dir).await?;
        }
    }

    let script = script_path(driver_dir, &config.script_name);
    if !tokio::fs::try_exists(&script).await? {
        tokio::fs::write(&script, DRIVER_SCRIPT).await?;
        info!("Wrote driver script to {}", script.display());
    }

    Ok(script)
}

/// Run one setup command and return its trimmed stdout.
async fn run_step(binary: &str, args: &[&str], cwd: &Path) -> SetupResult<String> {
    let command = format!("{} {}", binary, args.join(" "));
    let output = Command::new(binary)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| SetupError::RuntimeMissing {
            binary: binary.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(SetupError::CommandFailed {
            command,
            status: output.status.to_string(),
            output: detail,
        });
    }

    info!("`{}` successful", command);
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(node: &str, npm: &str) -> CompanionConfig {
        CompanionConfig {
            node_binary: node.to_string(),
            npm_binary: npm.to_string(),
            ..CompanionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_writes_script_when_installed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();

        let script = ensure_driver(&config("true", "false"), dir.path())
            .await
            .unwrap();

        assert_eq!(script, dir.path().join("whatsapp.js"));
        let written = std::fs::read_to_string(&script).unwrap();
        assert_eq!(written, DRIVER_SCRIPT);
    }

    #[tokio::test]
    async fn test_keeps_existing_script() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("whatsapp.js"), "// custom").unwrap();

        let script = ensure_driver(&config("true", "false"), dir.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(script).unwrap(), "// custom");
    }

    #[tokio::test]
    async fn test_missing_runtime_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = ensure_driver(&config("/nonexistent/node", "true"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::RuntimeMissing { .. }));
    }

    #[tokio::test]
    async fn test_failing_runtime_check_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();

        let err = ensure_driver(&config("false", "true"), dir.path())
            .await
            .unwrap_err();
        match err {
            SetupError::CommandFailed { command, .. } => assert_eq!(command, "false -v"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("whatsapp.js").exists());
    }

    #[tokio::test]
    async fn test_failed_install_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = ensure_driver(&config("true", "false"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::CommandFailed { .. }));
        assert!(!dir.path().join("whatsapp.js").exists());
    }

    #[tokio::test]
    async fn test_auto_install_disabled() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config("true", "false");
        cfg.auto_install = false;

        let script = ensure_driver(&cfg, dir.path()).await.unwrap();
        assert!(script.exists());
    }
}
