// Studio command interface
//
// Owns the parameter store, the renderer, the debounce timer and the exporter.
// Edits go through the debouncer; logo changes and explicit regenerations start
// a pass immediately. Every pass reports through StudioEvent.

use crate::metrics::Metrics;
use crate::models::{Color, GenerationParameters, LogoAdmission, LogoAsset, LogoError, Settings};
use crate::services::{
    DecodingLogoLoader, Debouncer, ExportError, Exporter, LogoLoader, Platform, QrcodeEncoder,
    RenderError, RenderPass, RenderPipeline, RenderedArtifact, Renderer, ShareChannel,
    ShareOutcome,
};
use crate::state::ParameterStore;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

#[derive(Error, Debug)]
pub enum StudioError {
    #[error(transparent)]
    Logo(#[from] LogoError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Notifications about render passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    /// A pass published its base layer
    Rendered { generation: u64 },
    /// A pass failed to encode; the previous frame stays visible
    RenderFailed { message: String },
}

/// Result of picking a logo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoSelection {
    /// The logo is in use and a pass has started
    Applied { generation: u64 },
    /// The file is large; call [`Studio::confirm_logo`] to use it anyway
    NeedsConfirmation { asset: LogoAsset, size_bytes: usize },
}

pub struct Studio<L: LogoLoader = DecodingLogoLoader> {
    store: ParameterStore,
    renderer: Arc<Renderer<L>>,
    debouncer: Debouncer<GenerationParameters>,
    exporter: Exporter,
    handle: Handle,
    metrics: Arc<Metrics>,
    event_tx: broadcast::Sender<StudioEvent>,
}

impl Studio<DecodingLogoLoader> {
    pub fn new(
        settings: &Settings,
        store: ParameterStore,
        platform: Platform,
        staging_dir: Utf8PathBuf,
        handle: Handle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_loader(
            settings,
            store,
            platform,
            staging_dir,
            handle,
            metrics,
            DecodingLogoLoader,
        )
    }
}

impl<L: LogoLoader> Studio<L> {
    pub fn with_loader(
        settings: &Settings,
        store: ParameterStore,
        platform: Platform,
        staging_dir: Utf8PathBuf,
        handle: Handle,
        metrics: Arc<Metrics>,
        loader: L,
    ) -> Self {
        let pipeline = RenderPipeline::new(Arc::new(QrcodeEncoder::new()));
        let renderer = Arc::new(Renderer::new(pipeline, loader, Arc::clone(&metrics)));
        let (event_tx, _) = broadcast::channel(32);

        let debouncer = {
            let renderer = Arc::clone(&renderer);
            let event_tx = event_tx.clone();
            Debouncer::new(handle.clone(), settings.render.debounce(), move |params| {
                let result = execute_pass(&renderer, &event_tx, &params);
                async move {
                    if let Ok(pass) = result {
                        pass.logo_finished().await;
                    }
                }
            })
        };

        let exporter = Exporter::new(
            settings.export.clone(),
            platform,
            staging_dir,
            handle.clone(),
            Arc::clone(&metrics),
        );

        tracing::info!(
            "Studio ready (debounce {}ms, staging in {})",
            settings.render.debounce_ms,
            exporter.staging_dir()
        );

        Self {
            store,
            renderer,
            debouncer,
            exporter,
            handle,
            metrics,
            event_tx,
        }
    }

    // ===== Rendering =====

    /// Request a render of the current parameters after the quiet period.
    pub fn generate(&self) {
        self.metrics.record_render_requested();
        self.debouncer.trigger(self.store.snapshot());
    }

    /// Drop any pending debounced render and start a pass right away.
    pub fn regenerate_now(&self) -> Result<RenderPass, RenderError> {
        self.metrics.record_render_requested();
        self.debouncer.cancel();

        let _runtime = self.handle.enter();
        execute_pass(&self.renderer, &self.event_tx, &self.store.snapshot())
    }

    pub fn is_render_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    // ===== Edits (debounced) =====

    pub fn edit_text(&self, text: impl Into<String>) {
        self.store.set_text(text);
        self.generate();
    }

    /// Returns the effective size for display.
    pub fn edit_size(&self, size: i64) -> u32 {
        self.store.set_size(size);
        self.generate();
        self.store.read(|p| p.size)
    }

    /// Size from raw input; returns the effective size for display.
    pub fn edit_size_input(&self, input: &str) -> u32 {
        self.store.set_size_input(input);
        self.generate();
        self.store.read(|p| p.size)
    }

    pub fn edit_foreground(&self, color: Color) {
        self.store.set_foreground(color);
        self.generate();
    }

    pub fn edit_background(&self, color: Color) {
        self.store.set_background(color);
        self.generate();
    }

    // ===== Logo (immediate) =====

    /// Validate a picked logo and apply it unless it needs confirmation.
    pub fn select_logo(&self, asset: LogoAsset) -> Result<LogoSelection, StudioError> {
        match asset.admit()? {
            LogoAdmission::Accepted => self.confirm_logo(asset),
            LogoAdmission::NeedsConfirmation { size_bytes } => {
                tracing::info!(
                    "Logo {} is {} bytes, asking for confirmation",
                    asset.file_name(),
                    size_bytes
                );
                Ok(LogoSelection::NeedsConfirmation { asset, size_bytes })
            }
        }
    }

    pub fn select_logo_path(&self, path: &Utf8Path) -> Result<LogoSelection, StudioError> {
        self.select_logo(LogoAsset::from_path(path)?)
    }

    /// Apply a logo without the size check.
    pub fn confirm_logo(&self, asset: LogoAsset) -> Result<LogoSelection, StudioError> {
        tracing::info!("Using logo {} ({} bytes)", asset.file_name(), asset.len());
        self.store.set_logo(asset);
        let pass = self.regenerate_now()?;
        Ok(LogoSelection::Applied {
            generation: pass.generation,
        })
    }

    pub fn clear_logo(&self) -> Result<RenderPass, RenderError> {
        self.store.clear_logo();
        self.regenerate_now()
    }

    // ===== Output =====

    pub fn current_artifact(&self) -> Option<Arc<RenderedArtifact>> {
        self.renderer.surface().snapshot()
    }

    /// Visible artifact, updated on every base layer and logo paint.
    pub fn frames(&self) -> watch::Receiver<Option<Arc<RenderedArtifact>>> {
        self.renderer.surface().subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.event_tx.subscribe()
    }

    pub async fn download(&self, dest: &Utf8Path) -> Result<(), StudioError> {
        let artifact = self.current_artifact().ok_or(ExportError::NothingRendered)?;
        self.exporter.download(&artifact, dest).await?;
        Ok(())
    }

    pub async fn share_via(&self, channel: ShareChannel) -> Result<ShareOutcome, StudioError> {
        let artifact = self.current_artifact().ok_or(ExportError::NothingRendered)?;
        Ok(self.exporter.share_via(channel, &artifact).await?)
    }

    // ===== Accessors =====

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

fn execute_pass<L: LogoLoader>(
    renderer: &Renderer<L>,
    event_tx: &broadcast::Sender<StudioEvent>,
    params: &GenerationParameters,
) -> Result<RenderPass, RenderError> {
    match renderer.run_pass(params) {
        Ok(pass) => {
            if pass.presented {
                let _ = event_tx.send(StudioEvent::Rendered {
                    generation: pass.generation,
                });
            }
            Ok(pass)
        }
        Err(e) => {
            let _ = event_tx.send(StudioEvent::RenderFailed {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}
