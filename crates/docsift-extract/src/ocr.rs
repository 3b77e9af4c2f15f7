//! Optical character recognition for image documents.
//!
//! Recognition is behind the [`TextRecognizer`] trait so the image extractor
//! can be tested without an OCR engine installed. [`TesseractRecognizer`]
//! drives the `tesseract` command line tool over stdin/stdout.

use async_trait::async_trait;
use docsift_core::ExtractError;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Trait for turning image bytes into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognizer name, used in logs.
    fn name(&self) -> &str;

    /// Recognize text in an encoded image (PNG, JPEG, TIFF, ...).
    async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError>;
}

/// Recognizer backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    language: String,
}

impl TesseractRecognizer {
    /// Create a recognizer running `command` with the given language pack.
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    /// Executable that will be invoked.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Language pack passed with `-l`.
    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError> {
        debug!(
            "Running {} on {} bytes (lang: {})",
            self.command,
            image.len(),
            self.language
        );

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ExtractError::Failed(format!(
                    "OCR engine `{}` not found; install tesseract-ocr",
                    self.command
                )),
                _ => ExtractError::Io(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A broken pipe means tesseract exited early; its stderr says why.
            if let Err(e) = stdin.write_all(image).await {
                warn!("Failed to feed image to {}: {}", self.command, e);
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Failed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
