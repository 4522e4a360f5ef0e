//! Tesseract engine driven through the `tesseract` command-line binary.
//!
//! The binary is run in TSV mode so word boxes and confidences survive. The
//! child process is polled so that request cancellation and the per-request
//! timeout can kill it mid-run.

use super::OcrEngine;
use super::tsv::parse_tsv;
use crate::types::{OcrMode, OcrParams, OcrResult};
use crate::{OcrQueueError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const ENGINE_NAME: &str = "tesseract";

/// How often a running child is checked for cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Tesseract OCR engine backed by the command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCommandEngine {
    binary: PathBuf,
    version: String,
    /// tessdata directory used for `OcrMode::Fast`
    tessdata_fast: Option<PathBuf>,
    /// tessdata directory used for `OcrMode::Best`
    tessdata_best: Option<PathBuf>,
    /// Words below this confidence are dropped
    min_confidence: f64,
}

impl TesseractCommandEngine {
    /// Locate the binary and probe its version with `--version`.
    ///
    /// # Errors
    ///
    /// Returns `OcrQueueError::Engine` if the binary can't be executed.
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| OcrQueueError::engine(ENGINE_NAME, format!("Failed to execute {}: {}", binary.display(), e)))?;

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        let version = parse_version_banner(&banner)
            .ok_or_else(|| OcrQueueError::engine(ENGINE_NAME, format!("Unrecognised version output: {}", banner.trim())))?;

        tracing::debug!(binary = %binary.display(), %version, "Detected tesseract");
        Ok(Self::with_version(binary, version))
    }

    /// Use `binary` without probing it.
    pub fn with_version(binary: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            version: version.into(),
            tessdata_fast: None,
            tessdata_best: None,
            min_confidence: 0.0,
        }
    }

    pub fn with_tessdata_dirs(mut self, fast: Option<PathBuf>, best: Option<PathBuf>) -> Self {
        self.tessdata_fast = fast;
        self.tessdata_best = best;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    fn build_command(&self, path: &Path, params: &OcrParams) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg(path).arg("stdout").arg("-l").arg(&params.language_code);

        let tessdata = match params.mode {
            OcrMode::Fast => self.tessdata_fast.as_ref(),
            OcrMode::Best => self.tessdata_best.as_ref(),
            OcrMode::Default => None,
        };
        if let Some(dir) = tessdata {
            command.arg("--tessdata-dir").arg(dir);
        }

        command
            .arg("tsv")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Wait for the child, killing it if `cancel` fires or `deadline` passes.
    ///
    /// Returns `Ok(None)` when the child was killed.
    fn wait_for_child(
        &self,
        child: &mut Child,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Option<std::process::ExitStatus>> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            let timed_out = deadline.is_some_and(|deadline| Instant::now() >= deadline);
            if cancel.is_cancelled() || timed_out {
                if timed_out {
                    tracing::warn!(engine = ENGINE_NAME, "OCR timed out, killing child process");
                }
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl OcrEngine for TesseractCommandEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn process_image(&self, path: &Path, params: &OcrParams, cancel: &CancellationToken) -> Result<Option<OcrResult>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut child = self
            .build_command(path, params)
            .spawn()
            .map_err(|e| OcrQueueError::engine(ENGINE_NAME, format!("Failed to execute {}: {}", self.binary.display(), e)))?;

        // Drain both pipes on their own threads so a chatty child can't block on a full pipe.
        let stdout_reader = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                stdout.read_to_string(&mut buffer).map(|_| buffer)
            })
        });
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let deadline = params
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(u64::from(secs)));
        let status = self.wait_for_child(&mut child, cancel, deadline)?;

        let stdout = match stdout_reader {
            Some(handle) => handle
                .join()
                .map_err(|_| OcrQueueError::engine(ENGINE_NAME, "stdout reader panicked"))??,
            None => String::new(),
        };
        let stderr = stderr_reader.and_then(|handle| handle.join().ok()).unwrap_or_default();

        let Some(status) = status else {
            return Ok(None);
        };
        if !status.success() {
            return Err(OcrQueueError::ocr(format!(
                "tesseract exited with {} for {}: {}",
                status,
                path.display(),
                stderr.trim()
            )));
        }

        Ok(Some(parse_tsv(&stdout, &params.language_code, self.min_confidence)))
    }
}

/// Extract "5.3.0" from a banner such as "tesseract 5.3.0\n leptonica-1.82.0".
fn parse_version_banner(banner: &str) -> Option<String> {
    let first_line = banner.lines().find(|line| !line.trim().is_empty())?;
    let mut parts = first_line.split_whitespace();
    let name = parts.next()?;
    if !name.eq_ignore_ascii_case("tesseract") {
        return None;
    }
    let version = parts.next()?.trim_start_matches('v');
    Some(version.to_string())
}
