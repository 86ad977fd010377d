//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction. The binary is
//! probed once per process; if missing it is installed through the system
//! package manager before the first recognition.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::backend::{BackendError, OcrBackend, OcrBackendType, Recognition};
use super::install::{detect_install_plan, probe_binary, run_install_plan, LocalBackendState};
use crate::config::LocalOcrConfig;

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: LocalOcrConfig,
    timeout: Duration,
    state: Arc<LocalBackendState>,
}

impl TesseractBackend {
    /// Create a backend sharing the process-wide install state for its
    /// configured binary.
    pub fn new(config: LocalOcrConfig, timeout: Duration) -> Self {
        let state = LocalBackendState::global(&config.binary);
        Self {
            config,
            timeout,
            state,
        }
    }

    /// Use a private install state instead of the process-wide one.
    pub fn with_state(mut self, state: Arc<LocalBackendState>) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &Arc<LocalBackendState> {
        &self.state
    }

    /// Make sure the binary can run, installing it on first use.
    ///
    /// Only the first caller probes (and possibly installs); everyone else
    /// reads the cached answer. Install failures yield `false`.
    pub async fn ensure_available(&self) -> bool {
        let config = self.config.clone();
        let timeout = self.timeout;
        let state = Arc::clone(&self.state);

        self.state
            .get_or_init(move || async move {
                if probe_binary(&config.binary, timeout).await {
                    debug!("{} is available", config.binary);
                    return true;
                }
                if !config.auto_install {
                    info!("{} not found and auto-install disabled", config.binary);
                    return false;
                }
                install(&config, timeout, &state).await
            })
            .await
    }

    /// Run Tesseract on an image file, killing it if it outlives the timeout.
    async fn run_tesseract(&self, image_path: &Path) -> Result<String, BackendError> {
        let psm = self.config.page_segmentation_mode.to_string();
        let child = Command::new(&self.config.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language])
            .args(["--psm", &psm])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::Unavailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.config.binary
                )))
            }
            Err(e) => {
                return Err(BackendError::Logic(format!(
                    "failed to start {}: {}",
                    self.config.binary, e
                )))
            }
        };

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(BackendError::Logic(format!("tesseract failed: {}", e))),
            Err(_) => {
                return Err(BackendError::Transient(format!(
                    "tesseract timed out after {}s",
                    self.timeout.as_secs_f32()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Logic(format!(
                "tesseract failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(BackendError::Logic(if detail.is_empty() {
                "tesseract produced no text".to_string()
            } else {
                format!("tesseract produced no text: {}", detail)
            }));
        }
        Ok(text)
    }
}

async fn install(config: &LocalOcrConfig, timeout: Duration, state: &LocalBackendState) -> bool {
    state.record_install_attempt();

    let plan = match &config.install_command {
        Some(command) => Ok(vec![command.clone()]),
        None => detect_install_plan(),
    };
    let install_timeout = Duration::from_secs(config.install_timeout_secs);

    let result = match plan {
        Ok(plan) => run_install_plan(&plan, install_timeout).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            let available = probe_binary(&config.binary, timeout).await;
            if available {
                info!("Installed {}", config.binary);
            } else {
                warn!("Install finished but {} still not runnable", config.binary);
            }
            available
        }
        Err(e) => {
            warn!("Could not install {}: {}", config.binary, e);
            false
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn language(&self) -> &str {
        &self.config.language
    }

    async fn is_available(&self) -> bool {
        self.ensure_available().await
    }

    fn availability_hint(&self) -> String {
        match self.state.installed() {
            Some(true) => "Tesseract is available".to_string(),
            Some(false) if self.config.auto_install => format!(
                "{} could not be installed automatically. Install with: apt install tesseract-ocr",
                self.config.binary
            ),
            _ => format!(
                "{} not installed. Install with: apt install tesseract-ocr",
                self.config.binary
            ),
        }
    }

    async fn recognize(&self, image: &[u8]) -> Result<Recognition, BackendError> {
        if !self.ensure_available().await {
            return Err(BackendError::Unavailable(self.availability_hint()));
        }

        let suffix = infer::get(image)
            .map(|kind| format!(".{}", kind.extension()))
            .unwrap_or_default();

        // Removed when dropped, on every return path below.
        let mut file = tempfile::Builder::new()
            .prefix("ocrchain-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| BackendError::Logic(format!("failed to create temp file: {}", e)))?;
        file.write_all(image)
            .and_then(|_| file.flush())
            .map_err(|e| BackendError::Logic(format!("failed to write temp file: {}", e)))?;

        let text = self.run_tesseract(file.path()).await?;
        Ok(Recognition::new(text, self.config.confidence))
    }
}
