//! Settings read once from the environment at startup

use previs_error::{Error, Result};
use previs_io::{PreviewConfig, ProviderConfig, ScreenshotConfig};
use std::path::PathBuf;

pub const DEFAULT_BROWSER: &str = "chromium";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub browser: String,
    /// Dev server command line with a `{port}` placeholder
    pub dev_server: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            api_key: get("PREVIS_OPENAI_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            base_url: get("PREVIS_BASE_URL"),
            model: get("PREVIS_MODEL"),
            browser: get("PREVIS_BROWSER").unwrap_or_else(|| DEFAULT_BROWSER.to_string()),
            dev_server: get("PREVIS_DEV_SERVER"),
        }
    }

    /// Provider settings; `model` from the command line wins over the env
    pub fn provider_config(&self, model: Option<&str>) -> Result<ProviderConfig> {
        let mut config = match (&self.api_key, &self.base_url) {
            (Some(key), _) => ProviderConfig::openai(key.clone()),
            (None, Some(url)) => ProviderConfig::local(url.clone(), DEFAULT_MODEL),
            (None, None) => {
                return Err(Error::config_invalid(
                    "OPENAI_API_KEY",
                    "no API key configured; set OPENAI_API_KEY or PREVIS_BASE_URL",
                ))
            }
        };
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.trim_end_matches('/').to_string());
        }
        if let Some(model) = model.or(self.model.as_deref()) {
            config = config.with_model(model);
        }
        Ok(config)
    }

    pub fn preview_config(&self, port: Option<u16>, cwd: Option<PathBuf>) -> PreviewConfig {
        let mut config = PreviewConfig::default();
        if let Some(port) = port {
            config = config.with_port(port);
        }
        if let Some(line) = &self.dev_server {
            config = config.with_command_line(line);
        }
        config.cwd = cwd;
        config
    }

    pub fn screenshot_config(&self, output: PathBuf, width: Option<u32>, height: Option<u32>) -> ScreenshotConfig {
        ScreenshotConfig::new(self.browser.clone(), output).with_size(width, height)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}
