// GUI Controller - binds the Slint window to the Studio
//
// - UI callbacks → Studio operations (edits, logo, download, share)
// - Visible frames → preview image
// - StudioEvent → status line
// - Native file dialogs through `rfd`

use crate::models::{Color, GenerationParameters, LogoAsset, LogoError};
use crate::services::{ExportError, RenderedArtifact, ShareChannel, ShareOutcome};
use crate::studio::{LogoSelection, Studio, StudioError, StudioEvent};
use crate::ui::bridge::{UiBridge, UiBridgeHandle, forward_latest};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{Image, Rgba8Pixel, SharedPixelBuffer};
use std::sync::{Arc, Mutex, PoisonError};

// Include the generated Slint code
slint::include_modules!();

/// Wait before re-queueing a frame the UI channel refused
const FRAME_RETRY: std::time::Duration = std::time::Duration::from_millis(16);

/// Extensions offered by the logo picker
const LOGO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "ico"];

/// What the open confirm dialog will do when accepted
#[derive(Debug, Clone)]
enum PendingConfirmation {
    /// Use a logo over the size limit
    LargeLogo(LogoAsset),
    /// Clipboard copy failed; save the PNG instead
    DownloadInstead,
}

type SharedPending = Arc<Mutex<Option<PendingConfirmation>>>;

/// Wires the Slint window to a [`Studio`]
pub struct GuiController {
    ui: MainWindow,
    _bridge: UiBridge<MainWindow>,
    studio: Arc<Studio>,
}

impl GuiController {
    /// Build the window, bind callbacks and subscriptions, and start the initial render
    pub fn new(studio: Arc<Studio>) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;
        let bridge = UiBridge::new(&ui, studio.handle().clone(), Arc::clone(studio.metrics()));
        let pending: SharedPending = Arc::new(Mutex::new(None));

        Self::sync_ui_with_params(&ui, &studio.store().snapshot());
        Self::setup_callbacks(&ui, &bridge, &studio, &pending);
        Self::setup_frame_subscription(&bridge, &studio);
        Self::setup_event_subscription(&bridge, &studio);

        if let Err(e) = studio.regenerate_now() {
            tracing::error!("Initial render failed: {}", e);
            ui.set_status_message(format!("Could not render QR code: {}", e).into());
        }

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            studio,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();
        if self.studio.is_render_pending() {
            tracing::debug!("Event loop exited with a render pending");
        }
        result
    }

    fn sync_ui_with_params(ui: &MainWindow, params: &GenerationParameters) {
        ui.set_qr_text(params.text.clone().into());
        ui.set_qr_size(params.size as f32);
        ui.set_size_label(size_label(params.size).into());

        ui.set_foreground_hex(params.foreground.to_hex().into());
        ui.set_foreground_swatch(to_slint_color(params.foreground));
        ui.set_foreground_valid(true);
        ui.set_background_hex(params.background.to_hex().into());
        ui.set_background_swatch(to_slint_color(params.background));
        ui.set_background_valid(true);

        Self::show_logo(ui, params.logo.as_ref());

        tracing::debug!("UI synchronized with parameters");
    }

    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &UiBridge<MainWindow>,
        studio: &Arc<Studio>,
        pending: &SharedPending,
    ) {
        // ===== Debounced edits =====

        let studio_clone = Arc::clone(studio);
        ui.on_text_edited(move |text| {
            studio_clone.edit_text(text.as_str());
        });

        let studio_clone = Arc::clone(studio);
        let ui_weak = ui.as_weak();
        ui.on_size_changed(move |value| {
            let size = studio_clone.edit_size(value.round() as i64);
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_size_label(size_label(size).into());
            }
        });

        let studio_clone = Arc::clone(studio);
        let ui_weak = ui.as_weak();
        ui.on_foreground_edited(move |value| {
            let Some(ui) = ui_weak.upgrade() else { return };
            match value.parse::<Color>() {
                Ok(color) => {
                    ui.set_foreground_valid(true);
                    ui.set_foreground_swatch(to_slint_color(color));
                    studio_clone.edit_foreground(color);
                }
                Err(e) => {
                    tracing::debug!("Ignoring foreground input: {}", e);
                    ui.set_foreground_valid(false);
                }
            }
        });

        let studio_clone = Arc::clone(studio);
        let ui_weak = ui.as_weak();
        ui.on_background_edited(move |value| {
            let Some(ui) = ui_weak.upgrade() else { return };
            match value.parse::<Color>() {
                Ok(color) => {
                    ui.set_background_valid(true);
                    ui.set_background_swatch(to_slint_color(color));
                    studio_clone.edit_background(color);
                }
                Err(e) => {
                    tracing::debug!("Ignoring background input: {}", e);
                    ui.set_background_valid(false);
                }
            }
        });

        // ===== Logo =====

        let studio_clone = Arc::clone(studio);
        let pending_clone = Arc::clone(pending);
        let ui_weak = ui.as_weak();
        ui.on_pick_logo(move || {
            tracing::debug!("Pick logo clicked");
            let Some(ui) = ui_weak.upgrade() else { return };

            let Some(path) = Self::show_file_picker("Choose a logo", vec![("Images", LOGO_EXTENSIONS)])
            else {
                return;
            };

            match studio_clone.select_logo_path(&path) {
                Ok(LogoSelection::Applied { generation }) => {
                    tracing::info!("Logo {} applied in pass {}", path, generation);
                    Self::show_logo(&ui, studio_clone.store().read(|p| p.logo.clone()).as_ref());
                }
                Ok(LogoSelection::NeedsConfirmation { asset, size_bytes }) => {
                    *lock(&pending_clone) = Some(PendingConfirmation::LargeLogo(asset));
                    Self::show_confirm_dialog(
                        &ui,
                        "Large image",
                        format!(
                            "Image is larger than 3MB ({:.1} MB). Continue?",
                            size_bytes as f64 / (1024.0 * 1024.0)
                        ),
                        "Use image",
                    );
                }
                Err(StudioError::Logo(e @ LogoError::NotAnImage { .. })) => {
                    Self::show_message_dialog(&ui, "Invalid file", e.to_string(), "");
                }
                Err(e) => {
                    tracing::error!("Failed to use logo {}: {}", path, e);
                    Self::show_message_dialog(&ui, "Logo failed", "The logo could not be used.", e.to_string());
                }
            }
        });

        let studio_clone = Arc::clone(studio);
        let ui_weak = ui.as_weak();
        ui.on_clear_logo(move || {
            tracing::debug!("Clear logo clicked");
            if let Err(e) = studio_clone.clear_logo() {
                tracing::error!("Render after clearing logo failed: {}", e);
            }
            if let Some(ui) = ui_weak.upgrade() {
                Self::show_logo(&ui, None);
            }
        });

        // ===== Export =====

        let studio_clone = Arc::clone(studio);
        let bridge_handle = bridge.clone_handle();
        ui.on_download(move || {
            tracing::debug!("Download clicked");
            Self::start_download(&studio_clone, &bridge_handle);
        });

        let studio_clone = Arc::clone(studio);
        let bridge_handle = bridge.clone_handle();
        ui.on_share_primary(move || {
            tracing::debug!("Share clicked");
            let studio = Arc::clone(&studio_clone);
            let bridge = bridge_handle.clone();
            bridge_handle.spawn_async(move || async move {
                let result = studio.share_via(ShareChannel::Primary).await;
                bridge.update_ui(move |ui| match result {
                    Ok(ShareOutcome::Shared) => ui.set_status_message("Shared.".into()),
                    Ok(ShareOutcome::OpenedComposer) => ui.set_status_message(
                        "Opened the chat composer. Attach the downloaded image manually.".into(),
                    ),
                    Ok(ShareOutcome::Unavailable { reason }) => {
                        Self::show_message_dialog(ui, "Share unavailable", "Could not open a share target.", reason)
                    }
                    Ok(other) => tracing::debug!("Unexpected primary share outcome: {:?}", other),
                    Err(e) => Self::report_export_error(ui, e),
                });
            });
        });

        let studio_clone = Arc::clone(studio);
        let bridge_handle = bridge.clone_handle();
        let pending_clone = Arc::clone(pending);
        ui.on_share_clipboard(move || {
            tracing::debug!("Copy image clicked");
            let studio = Arc::clone(&studio_clone);
            let bridge = bridge_handle.clone();
            let pending = Arc::clone(&pending_clone);
            bridge_handle.spawn_async(move || async move {
                let result = studio.share_via(ShareChannel::Clipboard).await;
                bridge.update_ui(move |ui| match result {
                    Ok(ShareOutcome::CopiedToClipboard { message }) => {
                        Self::show_message_dialog(ui, "Copied", message, "")
                    }
                    Ok(ShareOutcome::OfferDownload) => {
                        *lock(&pending) = Some(PendingConfirmation::DownloadInstead);
                        Self::show_confirm_dialog(
                            ui,
                            "Clipboard unavailable",
                            "Clipboard image copy not supported. Download instead?",
                            "Download",
                        );
                    }
                    Ok(other) => tracing::debug!("Unexpected clipboard outcome: {:?}", other),
                    Err(e) => Self::report_export_error(ui, e),
                });
            });
        });

        // ===== Dialogs =====

        let studio_clone = Arc::clone(studio);
        let bridge_handle = bridge.clone_handle();
        let pending_clone = Arc::clone(pending);
        let ui_weak = ui.as_weak();
        ui.on_confirm_accepted(move || {
            let Some(ui) = ui_weak.upgrade() else { return };
            ui.set_show_confirm_dialog(false);

            match lock(&pending_clone).take() {
                Some(PendingConfirmation::LargeLogo(asset)) => {
                    match studio_clone.confirm_logo(asset) {
                        Ok(_) => Self::show_logo(&ui, studio_clone.store().read(|p| p.logo.clone()).as_ref()),
                        Err(e) => {
                            tracing::error!("Failed to apply confirmed logo: {}", e);
                            ui.set_status_message(format!("Could not render QR code: {}", e).into());
                        }
                    }
                }
                Some(PendingConfirmation::DownloadInstead) => {
                    Self::start_download(&studio_clone, &bridge_handle);
                }
                None => tracing::debug!("Confirm accepted with nothing pending"),
            }
        });

        let pending_clone = Arc::clone(pending);
        let ui_weak = ui.as_weak();
        ui.on_confirm_rejected(move || {
            if let Some(declined) = lock(&pending_clone).take() {
                tracing::debug!("Declined {:?}", declined);
            }
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_confirm_dialog(false);
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_message_dismissed(move || {
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_message_dialog(false);
            }
        });
    }

    /// Present every new visible artifact in the preview
    fn setup_frame_subscription(bridge: &UiBridge<MainWindow>, studio: &Arc<Studio>) {
        let bridge_handle = bridge.clone_handle();
        let frames = studio.frames();

        // The UI reads the newest frame when the update runs, so frames that
        // arrive while one is queued collapse into it
        bridge.spawn_async(move || async move {
            forward_latest(frames, FRAME_RETRY, |latest| {
                bridge_handle.try_update_ui(move |ui| {
                    if let Some(artifact) = latest.get() {
                        Self::present(ui, &artifact);
                    }
                })
            })
            .await;
            tracing::debug!("Frame subscription ended");
        });
    }

    /// Mirror render outcomes in the status line
    fn setup_event_subscription(bridge: &UiBridge<MainWindow>, studio: &Arc<Studio>) {
        let bridge_handle = bridge.clone_handle();
        let mut rx = studio.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("Studio event thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(StudioEvent::Rendered { generation }) => {
                        tracing::trace!("Pass {} rendered", generation);
                        bridge_handle.update_ui(|ui| ui.set_status_message("".into()));
                    }
                    Ok(StudioEvent::RenderFailed { message }) => {
                        bridge_handle.update_ui(move |ui| {
                            ui.set_status_message(format!("Could not render QR code: {}", message).into())
                        });
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Studio event subscription lagged - {} events skipped", skipped);
                    }
                }
            }

            tracing::debug!("Studio event thread terminated");
        });
    }

    /// Ask for a destination, then save the visible artifact there
    fn start_download(studio: &Arc<Studio>, bridge: &UiBridgeHandle<MainWindow>) {
        let file_name = studio.exporter().settings().download_file_name.clone();
        let Some(dest) = Self::show_save_dialog("Save QR code", &file_name) else {
            return;
        };

        let studio = Arc::clone(studio);
        let bridge_clone = bridge.clone();
        bridge.spawn_async(move || async move {
            let result = studio.download(&dest).await;
            bridge_clone.update_ui(move |ui| match result {
                Ok(()) => ui.set_status_message(format!("Saved {}", dest).into()),
                Err(e) => Self::report_export_error(ui, e),
            });
        });
    }

    fn present(ui: &MainWindow, artifact: &RenderedArtifact) {
        let image = artifact.image();
        let buffer = SharedPixelBuffer::<Rgba8Pixel>::clone_from_slice(
            image.as_raw(),
            image.width(),
            image.height(),
        );
        ui.set_qr_image(Image::from_rgba8(buffer));
        ui.set_qr_image_size(artifact.size() as i32);
    }

    fn show_logo(ui: &MainWindow, logo: Option<&LogoAsset>) {
        ui.set_has_logo(logo.is_some());
        ui.set_logo_name(logo.map(|l| l.file_name().to_string()).unwrap_or_default().into());
    }

    fn report_export_error(ui: &MainWindow, error: StudioError) {
        match error {
            StudioError::Export(ExportError::NothingRendered) => {
                ui.set_status_message("Nothing to export yet.".into());
            }
            other => {
                tracing::error!("Export failed: {}", other);
                Self::show_message_dialog(ui, "Export failed", "The QR code could not be exported.", other.to_string());
            }
        }
    }

    fn show_message_dialog(
        ui: &MainWindow,
        title: impl Into<slint::SharedString>,
        message: impl Into<slint::SharedString>,
        details: impl Into<slint::SharedString>,
    ) {
        ui.set_message_title(title.into());
        ui.set_message_text(message.into());
        ui.set_message_details(details.into());
        ui.set_show_message_dialog(true);
    }

    fn show_confirm_dialog(
        ui: &MainWindow,
        title: impl Into<slint::SharedString>,
        message: impl Into<slint::SharedString>,
        accept_label: impl Into<slint::SharedString>,
    ) {
        ui.set_confirm_title(title.into());
        ui.set_confirm_text(message.into());
        ui.set_confirm_accept_label(accept_label.into());
        ui.set_show_confirm_dialog(true);
    }

    fn show_file_picker(title: &str, filters: Vec<(&str, &[&str])>) -> Option<Utf8PathBuf> {
        use rfd::FileDialog;

        let mut dialog = FileDialog::new().set_title(title);
        for (name, extensions) in filters {
            dialog = dialog.add_filter(name, extensions);
        }

        dialog.pick_file().and_then(to_utf8)
    }

    fn show_save_dialog(title: &str, file_name: &str) -> Option<Utf8PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .set_file_name(file_name)
            .add_filter("PNG image", &["png"])
            .save_file()
            .and_then(to_utf8)
    }
}

fn to_utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::try_from(path)
        .map_err(|e| tracing::error!("Failed to convert path to UTF-8: {}", e))
        .ok()
}

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, Option<PendingConfirmation>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn size_label(size: u32) -> String {
    format!("{} px", size)
}

fn to_slint_color(color: Color) -> slint::Color {
    slint::Color::from_argb_u8(color.a, color.r, color.g, color.b)
}
