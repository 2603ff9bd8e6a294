//! # Screenshot
//!
//! Captures the preview with a headless Chromium-compatible browser so a
//! vision model can see what the code renders.

use crate::error::{self, Error, Result};
use base64::Engine as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const DEFAULT_WIDTH: u32 = 500;
pub const DEFAULT_HEIGHT: u32 = 500;

#[derive(Debug, Clone)]
pub struct ScreenshotConfig {
    /// Browser binary, e.g. `chromium` or `google-chrome`
    pub browser: String,
    pub width: u32,
    pub height: u32,
    /// Where the PNG is written
    pub output: PathBuf,
}

impl ScreenshotConfig {
    pub fn new(browser: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            browser: browser.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            output: output.into(),
        }
    }

    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width.unwrap_or(self.width);
        self.height = height.unwrap_or(self.height);
        self
    }

    fn args(&self, url: &str) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--hide-scrollbars".to_string(),
            format!("--screenshot={}", self.output.display()),
            format!("--window-size={},{}", self.width, self.height),
            url.to_string(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Screenshotter {
    config: ScreenshotConfig,
}

impl Screenshotter {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.output
    }

    /// Render `url` and write the PNG to the configured path
    pub async fn screenshot(&self, url: &str) -> Result<()> {
        let output = Command::new(&self.config.browser)
            .args(self.config.args(url))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                error::spawn_failed(self.config.browser.clone(), e)
                    .with_operation("screenshot::capture")
            })?;

        if !output.status.success() {
            return Err(error::exited(
                self.config.browser.clone(),
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            )
            .with_operation("screenshot::capture"));
        }

        tracing::info!(path = %self.path().display(), "screenshot captured");
        Ok(())
    }

    /// The last capture, base64 encoded
    pub async fn base64_image(&self) -> Result<String> {
        let bytes = tokio::fs::read(self.path())
            .await
            .map_err(|e| error::io_at(e, "screenshot::base64_image", self.path()))?;
        if bytes.is_empty() {
            return Err(Error::invalid_state("screenshot file is empty")
                .with_context("path", self.path().display().to_string()));
        }
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}
