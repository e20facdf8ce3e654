//! Download and share actions over the visible artifact.
//!
//! Every action encodes the artifact to PNG and stages it as a file in the
//! staging directory. Staged files are released after
//! [`ExportSettings::release_delay`], whether or not the action succeeded.

use crate::metrics::Metrics;
use crate::models::ExportSettings;
use crate::services::platform::{Platform, PlatformError};
use crate::services::canvas::encode_png;
use crate::services::render::RenderedArtifact;
use camino::{Utf8Path, Utf8PathBuf};
use image::RgbaImage;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Title passed to the share sheet
const SHARE_TITLE: &str = "QR Code";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing has been rendered yet")]
    NothingRendered,

    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Which share action the user picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareChannel {
    /// Native share sheet, falling back to the web composer link
    Primary,
    /// Copy the image for pasting into a chat
    Clipboard,
}

/// What a share action ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// Handed to the platform share sheet
    Shared,
    /// The composer link was opened instead
    OpenedComposer,
    /// The image is on the clipboard; the message tells the user what to do next
    CopiedToClipboard { message: String },
    /// Clipboard unavailable; the user should be asked whether to download instead
    OfferDownload,
    /// Neither the share sheet nor the composer link could be used
    Unavailable { reason: String },
}

/// A PNG written to the staging directory.
#[derive(Debug)]
pub struct StagedFile {
    path: Utf8PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Remove the file after `delay`. A file already gone is not an error.
    pub fn release_after(self, handle: &Handle, delay: Duration) -> JoinHandle<()> {
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("Released staged file {}", self.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to release staged file {}: {}", self.path, e),
            }
        })
    }
}

/// Runs download and share actions against a [`Platform`].
pub struct Exporter {
    settings: ExportSettings,
    platform: Platform,
    staging_dir: Utf8PathBuf,
    handle: Handle,
    metrics: Arc<Metrics>,
    next_stage_id: AtomicU64,
}

impl Exporter {
    pub fn new(
        settings: ExportSettings,
        platform: Platform,
        staging_dir: impl Into<Utf8PathBuf>,
        handle: Handle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            settings,
            platform,
            staging_dir: staging_dir.into(),
            handle,
            metrics,
            next_stage_id: AtomicU64::new(0),
        }
    }

    /// Staging directory under the system temp dir, if it is valid UTF-8.
    pub fn default_staging_dir() -> Option<Utf8PathBuf> {
        Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .ok()
            .map(|dir| dir.join("qrstudio-staging"))
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn staging_dir(&self) -> &Utf8Path {
        &self.staging_dir
    }

    /// Remove every file this process staged. Returns how many were removed.
    pub fn purge_staging(&self) -> usize {
        let prefix = format!("{}-", std::process::id());
        let Ok(entries) = self.staging_dir.read_dir_utf8() else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            if entry.file_name().starts_with(&prefix) && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Purged {} staged file(s) from {}", removed, self.staging_dir);
        }
        removed
    }

    /// Encode `artifact` as PNG and write it to the staging directory.
    pub async fn stage(&self, artifact: &RenderedArtifact, file_name: &str) -> Result<StagedFile, ExportError> {
        let id = self.next_stage_id.fetch_add(1, Ordering::Relaxed);
        let path = self
            .staging_dir
            .join(format!("{}-{}-{}", std::process::id(), id, file_name));
        let dir = self.staging_dir.clone();
        let image = artifact.image().clone();

        self.handle
            .spawn_blocking(move || write_staged(&image, &dir, path))
            .await?
    }

    /// Save `artifact` as a PNG at `dest`.
    pub async fn download(&self, artifact: &RenderedArtifact, dest: &Utf8Path) -> Result<(), ExportError> {
        let staged = self.stage(artifact, &self.settings.download_file_name).await?;

        let source = staged.path().to_path_buf();
        let dest_path = dest.to_path_buf();
        let copied = self
            .handle
            .spawn_blocking(move || {
                fs::copy(&source, &dest_path)
                    .map(drop)
                    .map_err(|source| ExportError::Io {
                        path: dest_path,
                        source,
                    })
            })
            .await;
        staged.release_after(&self.handle, self.settings.release_delay());
        copied??;

        self.metrics.record_download();
        tracing::info!("Saved QR code to {}", dest);
        Ok(())
    }

    pub async fn share_via(&self, channel: ShareChannel, artifact: &RenderedArtifact) -> Result<ShareOutcome, ExportError> {
        match channel {
            ShareChannel::Primary => self.share_primary(artifact).await,
            ShareChannel::Clipboard => self.share_clipboard(artifact).await,
        }
    }

    /// Share through the native sheet, or open the composer link.
    pub async fn share_primary(&self, artifact: &RenderedArtifact) -> Result<ShareOutcome, ExportError> {
        let staged = self.stage(artifact, &self.settings.share_file_name).await?;

        let sheet = Arc::clone(&self.platform.share_sheet);
        let path = staged.path().to_path_buf();
        let caption = self.settings.share_caption.clone();
        let shared = self
            .handle
            .spawn_blocking(move || {
                if !sheet.can_share_files() {
                    return Err(PlatformError::Unsupported);
                }
                sheet.share_file(&path, SHARE_TITLE, &caption)
            })
            .await;

        staged.release_after(&self.handle, self.settings.release_delay());

        match shared? {
            Ok(()) => {
                self.metrics.record_share();
                tracing::info!("Shared QR code through the share sheet");
                return Ok(ShareOutcome::Shared);
            }
            Err(e) if e.is_expected() => {
                tracing::debug!("Share sheet not used ({}), opening composer link", e)
            }
            Err(e) => tracing::warn!("Share sheet failed ({}), opening composer link", e),
        }

        let launcher = Arc::clone(&self.platform.launcher);
        let link = self.settings.composer_link();
        let opened = self.handle.spawn_blocking(move || launcher.open(&link)).await?;

        match opened {
            Ok(()) => {
                self.metrics.record_share();
                self.metrics.record_share_fallback();
                Ok(ShareOutcome::OpenedComposer)
            }
            Err(e) => {
                self.metrics.record_export_failure();
                tracing::warn!("Failed to open composer link: {}", e);
                Ok(ShareOutcome::Unavailable {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Copy the image to the clipboard, or ask for a download instead.
    pub async fn share_clipboard(&self, artifact: &RenderedArtifact) -> Result<ShareOutcome, ExportError> {
        let clipboard = Arc::clone(&self.platform.clipboard);
        let image = artifact.image().clone();
        let copied = self
            .handle
            .spawn_blocking(move || clipboard.copy_image(&image))
            .await?;

        match copied {
            Ok(()) => {
                self.metrics.record_share();
                tracing::info!("Copied QR code to clipboard");
                Ok(ShareOutcome::CopiedToClipboard {
                    message: self.settings.clipboard_hint.clone(),
                })
            }
            Err(e) => {
                if e.is_expected() {
                    tracing::info!("Clipboard image copy not available: {}", e);
                } else {
                    self.metrics.record_export_failure();
                    tracing::warn!("Clipboard image copy failed: {}", e);
                }
                self.metrics.record_share_fallback();
                Ok(ShareOutcome::OfferDownload)
            }
        }
    }
}

fn write_staged(image: &RgbaImage, dir: &Utf8Path, path: Utf8PathBuf) -> Result<StagedFile, ExportError> {
    let png = encode_png(image)?;

    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, &png).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::debug!("Staged {} ({} bytes)", path, png.len());
    Ok(StagedFile { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationParameters;
    use crate::services::encoder::QrcodeEncoder;
    use crate::services::platform::{MockImageClipboard, MockShareSheet, MockUrlLauncher};
    use crate::services::render::RenderPipeline;
    use tempfile::TempDir;

    fn artifact() -> RenderedArtifact {
        RenderPipeline::new(Arc::new(QrcodeEncoder::new()))
            .render(&GenerationParameters::default())
            .unwrap()
    }

    fn exporter(dir: &TempDir, platform: Platform) -> (Exporter, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let staging = Utf8PathBuf::from_path_buf(dir.path().join("staging")).unwrap();
        let exporter = Exporter::new(
            ExportSettings::default(),
            platform,
            staging,
            Handle::current(),
            Arc::clone(&metrics),
        );
        (exporter, metrics)
    }

    fn platform(sheet: MockShareSheet, clipboard: MockImageClipboard, launcher: MockUrlLauncher) -> Platform {
        Platform {
            share_sheet: Arc::new(sheet),
            clipboard: Arc::new(clipboard),
            launcher: Arc::new(launcher),
        }
    }

    #[tokio::test]
    async fn test_share_sheet_used_when_supported() {
        let dir = TempDir::new().unwrap();

        let mut sheet = MockShareSheet::new();
        sheet.expect_can_share_files().return_const(true);
        sheet
            .expect_share_file()
            .withf(|path, _, text| path.as_str().ends_with("qr.png") && text.contains("QR code"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut launcher = MockUrlLauncher::new();
        launcher.expect_open().never();

        let (exporter, metrics) = exporter(&dir, platform(sheet, MockImageClipboard::new(), launcher));
        let outcome = exporter.share_primary(&artifact()).await.unwrap();

        assert_eq!(outcome, ShareOutcome::Shared);
        assert_eq!(metrics.shares.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_cancelled_share_opens_composer() {
        let dir = TempDir::new().unwrap();

        let mut sheet = MockShareSheet::new();
        sheet.expect_can_share_files().return_const(true);
        sheet
            .expect_share_file()
            .returning(|_, _, _| Err(PlatformError::Cancelled));
        let mut launcher = MockUrlLauncher::new();
        launcher
            .expect_open()
            .withf(|url: &str| url.starts_with("https://web.whatsapp.com/send?text=Generated%20a%20QR%20code"))
            .times(1)
            .returning(|_| Ok(()));

        let (exporter, metrics) = exporter(&dir, platform(sheet, MockImageClipboard::new(), launcher));
        let outcome = exporter.share_via(ShareChannel::Primary, &artifact()).await.unwrap();

        assert_eq!(outcome, ShareOutcome::OpenedComposer);
        assert_eq!(metrics.share_fallbacks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_clipboard_failure_offers_download() {
        let dir = TempDir::new().unwrap();

        let mut clipboard = MockImageClipboard::new();
        clipboard
            .expect_copy_image()
            .returning(|_| Err(PlatformError::Failed("no display".to_string())));

        let (exporter, metrics) = exporter(
            &dir,
            platform(MockShareSheet::new(), clipboard, MockUrlLauncher::new()),
        );
        let outcome = exporter.share_clipboard(&artifact()).await.unwrap();

        assert_eq!(outcome, ShareOutcome::OfferDownload);
        assert_eq!(metrics.export_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_clipboard_receives_artifact_pixels() {
        let dir = TempDir::new().unwrap();
        let expected = artifact();
        let expected_size = expected.size();

        let mut clipboard = MockImageClipboard::new();
        clipboard
            .expect_copy_image()
            .withf(move |image| image.width() == expected_size)
            .times(1)
            .returning(|_| Ok(()));

        let (exporter, _) = exporter(
            &dir,
            platform(MockShareSheet::new(), clipboard, MockUrlLauncher::new()),
        );
        let outcome = exporter.share_clipboard(&expected).await.unwrap();

        assert!(matches!(outcome, ShareOutcome::CopiedToClipboard { ref message } if message.contains("paste")));
    }

    #[tokio::test]
    async fn test_stage_writes_png() {
        let dir = TempDir::new().unwrap();
        let (exporter, _) = exporter(
            &dir,
            platform(MockShareSheet::new(), MockImageClipboard::new(), MockUrlLauncher::new()),
        );

        let staged = exporter.stage(&artifact(), "qr.png").await.unwrap();
        let bytes = fs::read(staged.path()).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
        assert!(staged.path().starts_with(exporter.staging_dir()));

        assert_eq!(exporter.purge_staging(), 1);
        assert!(!staged.path().exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_downloads_overlap_on_single_thread() {
        let dir = TempDir::new().unwrap();
        let (exporter, metrics) = exporter(
            &dir,
            platform(MockShareSheet::new(), MockImageClipboard::new(), MockUrlLauncher::new()),
        );
        let rendered = artifact();
        let first = Utf8PathBuf::from_path_buf(dir.path().join("first.png")).unwrap();
        let second = Utf8PathBuf::from_path_buf(dir.path().join("second.png")).unwrap();

        // File work runs on the blocking pool, so the runtime thread stays free
        let (a, b) = tokio::join!(
            exporter.download(&rendered, &first),
            exporter.download(&rendered, &second)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
        assert_eq!(metrics.downloads.load(Ordering::Relaxed), 2);
        assert_eq!(exporter.purge_staging(), 2);
    }
}
