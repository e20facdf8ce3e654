use crate::models::params::{Color, DEFAULT_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings from `QR Studio.yaml` and `QRSTUDIO_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub render: RenderSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

/// Initial parameters and regeneration timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Quiet period before a burst of edits triggers a render.
    pub debounce_ms: u64,
    pub default_text: String,
    pub default_size: u32,
    pub foreground: Color,
    pub background: Color,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 160,
            default_text: String::new(),
            default_size: DEFAULT_SIZE,
            foreground: Color::BLACK,
            background: Color::WHITE,
        }
    }
}

impl RenderSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Export file names, share texts and staged file lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub download_file_name: String,
    pub share_file_name: String,
    pub share_caption: String,
    /// Prefix of the web composer link; the percent-encoded message is appended.
    pub composer_url: String,
    pub composer_message: String,
    pub clipboard_hint: String,
    /// How long a staged PNG outlives the action that created it.
    pub release_delay_ms: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            download_file_name: "qr-code.png".to_string(),
            share_file_name: "qr.png".to_string(),
            share_caption: "QR code generated with QR Studio".to_string(),
            composer_url: "https://web.whatsapp.com/send?text=".to_string(),
            composer_message: "Generated a QR code! Download it or attach manually.".to_string(),
            clipboard_hint: "QR copied! Go to your chat and paste it (CTRL+V).".to_string(),
            release_delay_ms: 500,
        }
    }
}

impl ExportSettings {
    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    /// Composer link with the message percent-encoded.
    pub fn composer_link(&self) -> String {
        format!(
            "{}{}",
            self.composer_url,
            urlencoding::encode(&self.composer_message)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: String,
    pub debug: bool,
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            debug: false,
            console: true,
        }
    }
}
