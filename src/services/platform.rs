//! Platform capabilities used by the export actions.
//!
//! Each capability sits behind a trait so the exporter can run against mocks,
//! and so a missing capability is an ordinary [`PlatformError::Unsupported`]
//! rather than a special case.

use camino::Utf8Path;
use image::RgbaImage;
use std::borrow::Cow;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Not supported on this platform")]
    Unsupported,

    #[error("Cancelled by the user")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl PlatformError {
    /// Unsupported and cancelled are normal outcomes that lead to a fallback.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Unsupported | Self::Cancelled)
    }
}

/// Native "share file" sheet.
#[cfg_attr(test, mockall::automock)]
pub trait ShareSheet: Send + Sync {
    /// Whether files (not just text) can be shared.
    fn can_share_files(&self) -> bool;

    fn share_file(&self, path: &Utf8Path, title: &str, text: &str) -> Result<(), PlatformError>;
}

/// Writes images to the system clipboard.
#[cfg_attr(test, mockall::automock)]
pub trait ImageClipboard: Send + Sync {
    fn copy_image(&self, image: &RgbaImage) -> Result<(), PlatformError>;
}

/// Opens a URL in the user's browser.
#[cfg_attr(test, mockall::automock)]
pub trait UrlLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), PlatformError>;
}

/// The set of capabilities an exporter works with.
#[derive(Clone)]
pub struct Platform {
    pub share_sheet: Arc<dyn ShareSheet>,
    pub clipboard: Arc<dyn ImageClipboard>,
    pub launcher: Arc<dyn UrlLauncher>,
}

impl Platform {
    /// Desktop implementations of every capability.
    pub fn system() -> Self {
        Self {
            share_sheet: Arc::new(DesktopShareSheet),
            clipboard: Arc::new(SystemClipboard),
            launcher: Arc::new(SystemUrlLauncher),
        }
    }
}

/// Desktop platforms have no file share sheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopShareSheet;

impl ShareSheet for DesktopShareSheet {
    fn can_share_files(&self) -> bool {
        false
    }

    fn share_file(&self, _path: &Utf8Path, _title: &str, _text: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Clipboard access through `arboard`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ImageClipboard for SystemClipboard {
    fn copy_image(&self, image: &RgbaImage) -> Result<(), PlatformError> {
        let mut clipboard = arboard::Clipboard::new().map_err(map_clipboard_error)?;

        clipboard
            .set_image(arboard::ImageData {
                width: image.width() as usize,
                height: image.height() as usize,
                bytes: Cow::Borrowed(image.as_raw()),
            })
            .map_err(map_clipboard_error)
    }
}

fn map_clipboard_error(e: arboard::Error) -> PlatformError {
    match e {
        arboard::Error::ClipboardNotSupported => PlatformError::Unsupported,
        other => PlatformError::Failed(format!("Clipboard error: {}", other)),
    }
}

/// Opens URLs with the platform's opener command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUrlLauncher;

impl SystemUrlLauncher {
    fn command(url: &str) -> Command {
        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("cmd");
            // The empty argument is the window title expected by `start`
            cmd.args(["/C", "start", ""]).arg(url);
            cmd
        }

        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl UrlLauncher for SystemUrlLauncher {
    fn open(&self, url: &str) -> Result<(), PlatformError> {
        let status = Self::command(url).status().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PlatformError::Unsupported,
            _ => PlatformError::Failed(format!("Failed to launch browser: {}", e)),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::Failed(format!(
                "Browser opener exited with {}",
                status
            )))
        }
    }
}
