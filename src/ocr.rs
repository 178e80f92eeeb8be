// =============================================================================
// ocr.rs - THE EYES
// =============================================================================
//
// OCR is the one correctness-critical dependency we cannot test for accuracy,
// so it sits behind a one-method trait. The pipeline's retry logic is tested
// against scripted fakes; the real engine is a thin adapter over the
// `tesseract` command-line tool, fed through stdin so no image ever touches
// the disk.
// =============================================================================

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SleuthError};

/// Anything that can read text off an image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognized text fragments, in the order the engine detected them.
    /// An empty vector means "saw nothing", which is not an error.
    async fn recognize(&self, image: &[u8]) -> Result<Vec<String>>;
}

/// Runs `tesseract stdin stdout --psm 7` (single text line, which is what a
/// CAPTCHA is).
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<String>> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm", "7"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SleuthError::Ocr(format!("failed to start {}: {e}", self.binary)))?;

        let ocr_error = |e: std::io::Error| SleuthError::Ocr(format!("{}: {e}", self.binary));

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await.map_err(ocr_error)?;
            stdin.shutdown().await.map_err(ocr_error)?;
        }

        let output = child.wait_with_output().await.map_err(ocr_error)?;
        if !output.status.success() {
            return Err(SleuthError::Ocr(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let fragments = fragments_from_output(&String::from_utf8_lossy(&output.stdout));
        debug!(fragments = fragments.len(), "OCR pass complete");
        Ok(fragments)
    }
}

/// One fragment per non-blank output line.
fn fragments_from_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
