//! Probing for and installing the local OCR executable.
//!
//! Installation goes through whichever system package manager is found on
//! PATH, or an explicit command from configuration. It is attempted at most
//! once per [`LocalBackendState`]; the probe result is cached for the rest of
//! the process.

use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Process-wide availability of the local engine, one entry per binary.
static GLOBAL_STATES: LazyLock<Mutex<HashMap<String, Arc<LocalBackendState>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Errors while installing the local engine. Never leaves this crate's
/// backends: they are logged and turned into "unavailable".
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no supported package manager found (tried {0})")]
    NoPackageManager(String),

    #[error("install command is empty")]
    EmptyCommand,

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
}

/// Lazily initialized, once-only record of whether the engine is installed.
#[derive(Debug, Default)]
pub struct LocalBackendState {
    installed: OnceCell<bool>,
    install_attempts: AtomicUsize,
}

impl LocalBackendState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide state for `binary`, shared by every backend built
    /// without an explicit state for the same executable.
    pub fn global(binary: &str) -> Arc<Self> {
        let mut states = GLOBAL_STATES
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(states.entry(binary.to_string()).or_default())
    }

    /// Cached availability, if the probe already ran.
    pub fn installed(&self) -> Option<bool> {
        self.installed.get().copied()
    }

    /// Run `init` if nobody has yet; concurrent callers wait for the first.
    ///
    /// Initialization runs on its own task. Dropping the calling future does
    /// not abandon it half way, so a cancelled caller never causes a second
    /// install: later callers wait on the same in-flight initialization.
    pub async fn get_or_init<F, Fut>(self: &Arc<Self>, init: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if let Some(installed) = self.installed() {
            return installed;
        }

        let state = Arc::clone(self);
        let task = tokio::spawn(async move { *state.installed.get_or_init(init).await });
        match task.await {
            Ok(installed) => installed,
            Err(e) => {
                warn!("Local engine availability check aborted: {}", e);
                false
            }
        }
    }

    pub(crate) fn record_install_attempt(&self) {
        self.install_attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// How many times installation was started under this state.
    pub fn install_attempts(&self) -> usize {
        self.install_attempts.load(Ordering::SeqCst)
    }
}

/// A package manager and the commands that install Tesseract with it.
struct PackageManager {
    binary: &'static str,
    steps: &'static [&'static [&'static str]],
}

const PACKAGE_MANAGERS: &[PackageManager] = &[
    PackageManager {
        binary: "apt-get",
        steps: &[
            &["apt-get", "update"],
            &["apt-get", "install", "-y", "tesseract-ocr"],
        ],
    },
    PackageManager {
        binary: "apk",
        steps: &[&["apk", "add", "--no-cache", "tesseract-ocr"]],
    },
    PackageManager {
        binary: "dnf",
        steps: &[&["dnf", "install", "-y", "tesseract"]],
    },
    PackageManager {
        binary: "yum",
        steps: &[&["yum", "install", "-y", "tesseract"]],
    },
    PackageManager {
        binary: "brew",
        steps: &[&["brew", "install", "tesseract"]],
    },
];

/// Pick install commands for the first package manager found on PATH.
pub fn detect_install_plan() -> Result<Vec<Vec<String>>, InstallError> {
    PACKAGE_MANAGERS
        .iter()
        .find(|pm| which::which(pm.binary).is_ok())
        .map(|pm| {
            debug!("Using {} to install tesseract", pm.binary);
            pm.steps
                .iter()
                .map(|step| step.iter().map(|s| s.to_string()).collect())
                .collect()
        })
        .ok_or_else(|| {
            InstallError::NoPackageManager(
                PACKAGE_MANAGERS
                    .iter()
                    .map(|pm| pm.binary)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })
}

/// Check that `binary --version` runs and exits successfully.
pub async fn probe_binary(binary: &str, timeout: Duration) -> bool {
    let child = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            debug!("{} not runnable: {}", binary, e);
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("{} --version failed: {}", binary, e);
            false
        }
        Err(_) => {
            debug!("{} --version timed out", binary);
            false
        }
    }
}

/// Run each install step in order, stopping at the first failure.
pub async fn run_install_plan(
    plan: &[Vec<String>],
    timeout: Duration,
) -> Result<(), InstallError> {
    if plan.is_empty() {
        return Err(InstallError::EmptyCommand);
    }
    for step in plan {
        run_step(step, timeout).await?;
    }
    Ok(())
}

async fn run_step(step: &[String], timeout: Duration) -> Result<(), InstallError> {
    let (program, args) = step.split_first().ok_or(InstallError::EmptyCommand)?;
    let command = step.join(" ");
    info!("Installing local OCR engine: {}", command);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InstallError::Spawn {
            command: command.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| InstallError::Spawn {
            command: command.clone(),
            source,
        })?,
        Err(_) => {
            return Err(InstallError::Timeout {
                command,
                secs: timeout.as_secs(),
            })
        }
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("{} failed: {}", command, stderr);
        Err(InstallError::Failed {
            command,
            status: output.status.to_string(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_probe_missing_binary() {
        assert!(!probe_binary("ocrchain-definitely-missing-binary", Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let err = run_install_plan(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, InstallError::EmptyCommand));

        let err = run_install_plan(&[vec![]], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_missing_install_program() {
        let plan = vec![vec!["ocrchain-no-such-package-manager".to_string()]];
        let err = run_install_plan(&plan, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_step_stops_plan() {
        let plan = vec![
            vec!["sh".to_string(), "-c".to_string(), "echo nope >&2; exit 3".to_string()],
            vec!["ocrchain-never-reached".to_string()],
        ];
        let err = run_install_plan(&plan, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            InstallError::Failed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_state_initializes_once() {
        let state = Arc::new(LocalBackendState::new());
        assert_eq!(state.installed(), None);

        let calls = Arc::new(AtomicUsize::new(0));
        let run = |state: Arc<LocalBackendState>, calls: Arc<AtomicUsize>| async move {
            state
                .get_or_init(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    true
                })
                .await
        };

        let (a, b) = tokio::join!(
            run(Arc::clone(&state), Arc::clone(&calls)),
            run(Arc::clone(&state), Arc::clone(&calls))
        );
        assert!(a && b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.installed(), Some(true));
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_rerun_init() {
        let state = Arc::new(LocalBackendState::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                false
            }
        };
        let first = tokio::time::timeout(Duration::from_millis(50), state.get_or_init(slow)).await;
        assert!(first.is_err());

        let second = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            }
        };
        // Waits for the in-flight init instead of starting another
        assert!(!state.get_or_init(second).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.installed(), Some(false));
    }

    #[test]
    fn test_global_state_keyed_by_binary() {
        let a = LocalBackendState::global("/opt/ocrchain-test/a/tesseract");
        let b = LocalBackendState::global("/opt/ocrchain-test/b/tesseract");
        let a_again = LocalBackendState::global("/opt/ocrchain-test/a/tesseract");

        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
