//! # Script Runner
//!
//! Spawns an external interpreter on `<scripts_dir>/<name>.py`, waits for it
//! and hands back trimmed stdout (or stderr on failure). Nothing is streamed
//! and nothing is retried; the process is killed if the request is dropped or
//! the timeout elapses.

use crate::error::{DeckError, DeckResult};
use crate::guard::validate_script_name;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Script file extension appended to every name
const SCRIPT_EXTENSION: &str = "py";

/// Result of a finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs scripts from a single directory with a single interpreter
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    dir: PathBuf,
    interpreter: String,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(dir: impl Into<PathBuf>, interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            interpreter: interpreter.into(),
            timeout,
        }
    }

    /// Resolves `<dir>/<name>.py` after validating the name
    pub fn script_path(&self, name: &str) -> DeckResult<PathBuf> {
        validate_script_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, SCRIPT_EXTENSION)))
    }

    /// Runs `<name>.py` with a single argument
    ///
    /// A non-zero exit is reported through [`ScriptOutput::success`]; only
    /// spawn failures, missing scripts and timeouts are errors.
    pub async fn run(&self, name: &str, arg: &str) -> DeckResult<ScriptOutput> {
        let path = self.script_path(name)?;
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(DeckError::not_found(format!(
                "Script '{}' does not exist",
                path.display()
            )));
        }

        info!("🐍 Running {} {}", self.interpreter, path.display());

        // The interpreter runs inside the scripts dir, so pass the bare file name
        let file_name = format!("{}.{}", name, SCRIPT_EXTENSION);
        let child = Command::new(&self.interpreter)
            .arg(&file_name)
            .arg(arg)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeckError::Script(format!("Failed to start '{}': {}", self.interpreter, e))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| DeckError::Script(format!("Failed to wait for script: {}", e)))?,
            Err(_) => {
                warn!("Script {} timed out after {:?}", name, self.timeout);
                return Err(DeckError::Script(format!(
                    "Script '{}' timed out after {}s",
                    name,
                    self.timeout.as_secs()
                )));
            }
        };

        debug!("Script {} exited with {}", name, output.status);

        Ok(ScriptOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::fs;

    fn runner(dir: &Path) -> ScriptRunner {
        ScriptRunner::new(dir, "sh", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_run_success() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.py"), "echo \"hello $1\"\n").unwrap();

        let out = runner(dir.path()).run("hello", "world").await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "hello world");
    }

    #[tokio::test]
    async fn test_run_failure_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.py"), "echo oops >&2\nexit 3\n").unwrap();

        let out = runner(dir.path()).run("broken", "x").await.unwrap();
        assert!(!out.success);
        assert_eq!(out.stderr, "oops");
    }

    #[tokio::test]
    async fn test_runs_in_scripts_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "local\n").unwrap();
        fs::write(dir.path().join("cat.py"), "cat data.txt\n").unwrap();

        let out = runner(dir.path()).run("cat", "").await.unwrap();
        assert_eq!(out.stdout, "local");
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("slow.py"), "sleep 5\n").unwrap();

        let runner = ScriptRunner::new(dir.path(), "sh", Duration::from_millis(100));
        let err = runner.run("slow", "").await.unwrap_err();
        assert!(matches!(err, DeckError::Script(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_names_and_missing_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path());

        assert!(matches!(
            runner.run("../escape", "").await,
            Err(DeckError::InvalidScript(_))
        ));
        assert!(matches!(
            runner.run("absent", "").await,
            Err(DeckError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.py"), "print('hi')\n").unwrap();

        let runner = ScriptRunner::new(dir.path(), "no-such-interpreter-xyz", Duration::from_secs(1));
        assert!(matches!(
            runner.run("hello", "").await,
            Err(DeckError::Script(_))
        ));
    }
}
