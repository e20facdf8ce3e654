//! Render pipeline: `GenerationParameters` → `RenderedArtifact`.
//!
//! [`RenderPipeline::render`] is the pure, synchronous mapping. [`Renderer`]
//! runs the same steps as a pass: the QR base layer is published on the
//! [`RenderSurface`] at once, and the logo is decoded by a [`LogoLoader`] and
//! painted later, but only while its pass is still the current generation.

use crate::metrics::Metrics;
use crate::models::{Color, GenerationParameters, LogoAsset};
use crate::services::canvas::{Canvas, encode_png};
use crate::services::encoder::{EcLevel, EncodeRequest, EncodingError, QrEncoder};
use image::RgbaImage;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Logo edge length as a fraction of the QR edge length.
pub const LOGO_RATIO: f32 = 0.24;

/// Gap between the logo and the edge of its backdrop.
pub const LOGO_PADDING: u32 = 8;

/// Corner radius of the logo backdrop.
pub const BACKDROP_RADIUS: f32 = 16.0;

/// Errors that abort a render pass
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// A composited QR bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifact {
    image: RgbaImage,
    generation: u64,
    has_logo: bool,
}

impl RenderedArtifact {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn size(&self) -> u32 {
        self.image.width()
    }

    /// Generation of the pass that produced this artifact (0 for direct renders).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_logo(&self) -> bool {
        self.has_logo
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&self.image)
    }
}

/// Where the logo and its backdrop go on a QR of a given size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoPlacement {
    /// Top-left corner of the logo
    pub x: f32,
    pub y: f32,
    /// Logo edge length
    pub logo_size: u32,
    /// Top-left corner of the backdrop
    pub backdrop_x: f32,
    pub backdrop_y: f32,
    /// Backdrop edge length (`logo_size + 2 * LOGO_PADDING`)
    pub backdrop_size: u32,
}

impl LogoPlacement {
    pub fn for_size(size: u32) -> Self {
        let logo_size = (size as f32 * LOGO_RATIO).floor() as u32;
        let offset = (size - logo_size) as f32 / 2.0;
        Self {
            x: offset,
            y: offset,
            logo_size,
            backdrop_x: offset - LOGO_PADDING as f32,
            backdrop_y: offset - LOGO_PADDING as f32,
            backdrop_size: logo_size + 2 * LOGO_PADDING,
        }
    }
}

/// Decode a logo for compositing. Corrupt data yields `None`.
pub fn decode_logo(asset: &LogoAsset) -> Option<RgbaImage> {
    match image::load_from_memory(asset.bytes()) {
        Ok(decoded) => Some(decoded.to_rgba8()),
        Err(e) => {
            tracing::warn!(
                "Skipping logo overlay, failed to decode {}: {}",
                asset.file_name(),
                e
            );
            None
        }
    }
}

/// Draw the rounded backdrop in `background` and the logo on top of it.
pub fn composite_logo(canvas: &mut Canvas, logo: &RgbaImage, background: Color) {
    let size = canvas.width().min(canvas.height());
    let placement = LogoPlacement::for_size(size);

    canvas.rounded_rect(
        placement.backdrop_x,
        placement.backdrop_y,
        placement.backdrop_size as f32,
        placement.backdrop_size as f32,
        BACKDROP_RADIUS,
    );
    canvas.fill(background);
    canvas.begin_path();

    canvas.draw_image(
        logo,
        placement.x.round() as i64,
        placement.y.round() as i64,
        placement.logo_size,
        placement.logo_size,
    );
}

/// Stateless mapping from parameters to artifacts.
#[derive(Clone)]
pub struct RenderPipeline {
    encoder: Arc<dyn QrEncoder>,
}

impl RenderPipeline {
    pub fn new(encoder: Arc<dyn QrEncoder>) -> Self {
        Self { encoder }
    }

    /// Steps 1-2: clamp, substitute blank text, encode at high error correction.
    pub fn render_base(&self, params: &GenerationParameters) -> Result<Canvas, RenderError> {
        let size = params.effective_size();
        let request = EncodeRequest {
            text: params.effective_text(),
            size,
            foreground: params.foreground,
            background: params.background,
            level: EcLevel::High,
        };

        let mut canvas = Canvas::new(size, size, params.background);
        self.encoder.draw(&request, &mut canvas)?;
        Ok(canvas)
    }

    /// Full synchronous render. A logo that fails to decode is skipped.
    pub fn render(&self, params: &GenerationParameters) -> Result<RenderedArtifact, RenderError> {
        let mut canvas = self.render_base(params)?;

        let logo = params.logo.as_ref().and_then(decode_logo);
        if let Some(ref logo) = logo {
            composite_logo(&mut canvas, logo, params.background);
        }

        Ok(RenderedArtifact {
            image: canvas.into_image(),
            generation: 0,
            has_logo: logo.is_some(),
        })
    }
}

/// Outcome of an asynchronous logo paint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoPaint {
    /// The logo landed on its own pass's base layer
    Painted,
    /// A newer pass started first; nothing was painted
    Stale,
    /// The logo could not be decoded; the base layer stays as is
    DecodeFailed,
}

/// The visible output plus the generation counter guarding it.
///
/// Cloning shares the same surface.
#[derive(Clone)]
pub struct RenderSurface {
    generation: Arc<Mutex<u64>>,
    frame_tx: watch::Sender<Option<Arc<RenderedArtifact>>>,
}

impl RenderSurface {
    pub fn new() -> Self {
        let (frame_tx, _) = watch::channel(None);
        Self {
            generation: Arc::new(Mutex::new(0)),
            frame_tx,
        }
    }

    /// Start a new pass, superseding every earlier one.
    pub fn begin_pass(&self) -> u64 {
        let mut generation = self.lock_generation();
        *generation += 1;
        *generation
    }

    pub fn current_generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Publish a base layer for `generation`. Returns false if superseded.
    pub fn present(&self, generation: u64, image: RgbaImage) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            return false;
        }

        let artifact = Arc::new(RenderedArtifact {
            image,
            generation,
            has_logo: false,
        });
        self.frame_tx.send_replace(Some(artifact));
        true
    }

    /// Composite `logo` onto the visible frame if it still belongs to `generation`.
    pub fn paint_logo(&self, generation: u64, logo: &RgbaImage, background: Color) -> LogoPaint {
        let current = self.lock_generation();
        if *current != generation {
            return LogoPaint::Stale;
        }

        let painted = self.frame_tx.send_if_modified(|frame| {
            let Some(artifact) = frame.as_mut() else {
                return false;
            };
            if artifact.generation != generation {
                return false;
            }

            let artifact = Arc::make_mut(artifact);
            let mut canvas = Canvas::from_image(std::mem::take(&mut artifact.image));
            composite_logo(&mut canvas, logo, background);
            artifact.image = canvas.into_image();
            artifact.has_logo = true;
            true
        });

        if painted {
            LogoPaint::Painted
        } else {
            LogoPaint::Stale
        }
    }

    /// Snapshot of the visible artifact, if anything has been rendered.
    pub fn snapshot(&self) -> Option<Arc<RenderedArtifact>> {
        self.frame_tx.borrow().clone()
    }

    /// Receiver notified whenever the visible artifact changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RenderedArtifact>>> {
        self.frame_tx.subscribe()
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Asynchronous logo decoding.
pub trait LogoLoader: Send + Sync + 'static {
    /// Decode `asset`; `None` when the data is corrupt.
    fn load(&self, asset: LogoAsset) -> impl Future<Output = Option<RgbaImage>> + Send;
}

/// [`LogoLoader`] decoding on tokio's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodingLogoLoader;

impl LogoLoader for DecodingLogoLoader {
    async fn load(&self, asset: LogoAsset) -> Option<RgbaImage> {
        match tokio::task::spawn_blocking(move || decode_logo(&asset)).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!("Logo decode task failed: {}", e);
                None
            }
        }
    }
}

/// A started render pass.
#[derive(Debug)]
pub struct RenderPass {
    pub generation: u64,
    /// Whether the base layer was published (false if already superseded)
    pub presented: bool,
    logo_task: Option<JoinHandle<LogoPaint>>,
}

impl RenderPass {
    pub fn has_logo_task(&self) -> bool {
        self.logo_task.is_some()
    }

    /// Wait for the logo paint, if this pass has a logo.
    pub async fn logo_finished(self) -> Option<LogoPaint> {
        let task = self.logo_task?;
        match task.await {
            Ok(paint) => Some(paint),
            Err(e) => {
                tracing::error!("Logo paint task failed: {}", e);
                None
            }
        }
    }
}

/// Runs generation-tagged passes against a [`RenderSurface`].
pub struct Renderer<L: LogoLoader = DecodingLogoLoader> {
    pipeline: RenderPipeline,
    surface: RenderSurface,
    loader: Arc<L>,
    metrics: Arc<Metrics>,
}

impl<L: LogoLoader> Renderer<L> {
    pub fn new(pipeline: RenderPipeline, loader: L, metrics: Arc<Metrics>) -> Self {
        Self {
            pipeline,
            surface: RenderSurface::new(),
            loader: Arc::new(loader),
            metrics,
        }
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// Start a pass: render and publish the base layer now, then paint the
    /// logo (if any) when the loader finishes.
    ///
    /// Must be called from within a tokio runtime when `params` has a logo.
    pub fn run_pass(&self, params: &GenerationParameters) -> Result<RenderPass, RenderError> {
        self.metrics.record_render_executed();

        // A failed pass must not supersede the visible one or its pending logo
        let base = match self.pipeline.render_base(params) {
            Ok(canvas) => canvas,
            Err(e) => {
                self.metrics.record_render_failed();
                tracing::error!(
                    "Render pass failed, keeping pass {}: {}",
                    self.surface.current_generation(),
                    e
                );
                return Err(e);
            }
        };

        let generation = self.surface.begin_pass();

        let presented = self.surface.present(generation, base.into_image());
        tracing::debug!(
            "Render pass {} base layer {} ({}px)",
            generation,
            if presented { "presented" } else { "superseded" },
            params.effective_size()
        );

        let logo_task = params.logo.clone().map(|asset| {
            let surface = self.surface.clone();
            let loader = Arc::clone(&self.loader);
            let metrics = Arc::clone(&self.metrics);
            let background = params.background;

            tokio::spawn(async move {
                let Some(logo) = loader.load(asset).await else {
                    return LogoPaint::DecodeFailed;
                };

                let outcome = surface.paint_logo(generation, &logo, background);
                match outcome {
                    LogoPaint::Painted => metrics.record_logo_painted(),
                    LogoPaint::Stale => {
                        metrics.record_stale_logo_dropped();
                        tracing::debug!("Dropped stale logo paint for pass {}", generation);
                    }
                    LogoPaint::DecodeFailed => {}
                }
                outcome
            })
        });

        Ok(RenderPass {
            generation,
            presented,
            logo_task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::encoder::QrcodeEncoder;

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(Arc::new(QrcodeEncoder::new()))
    }

    fn red_logo() -> LogoAsset {
        let png = encode_png(&RgbaImage::from_pixel(16, 16, image::Rgba([255, 0, 0, 255]))).unwrap();
        LogoAsset::new(png, "image/png", "red.png")
    }

    #[test]
    fn test_logo_placement_geometry() {
        let placement = LogoPlacement::for_size(300);
        assert_eq!(placement.logo_size, 72);
        assert_eq!(placement.x, 114.0);
        assert_eq!(placement.backdrop_x, 106.0);
        assert_eq!(placement.backdrop_size, 88);

        let odd = LogoPlacement::for_size(101);
        assert_eq!(odd.logo_size, 24);
        assert_eq!(odd.x, 38.5);
    }

    #[test]
    fn test_render_clamps_size() {
        let params = GenerationParameters {
            size: 5,
            ..GenerationParameters::default()
        };
        let artifact = pipeline().render(&params).unwrap();
        assert_eq!(artifact.size(), 100);
    }

    #[test]
    fn test_corrupt_logo_keeps_base() {
        let params = GenerationParameters {
            text: "corrupt".to_string(),
            logo: Some(LogoAsset::new(vec![1, 2, 3], "image/png", "broken.png")),
            ..GenerationParameters::default()
        };

        let with_corrupt = pipeline().render(&params).unwrap();
        let base = pipeline().render(&params.without_logo()).unwrap();

        assert!(!with_corrupt.has_logo());
        assert_eq!(with_corrupt.image(), base.image());
    }

    #[test]
    fn test_logo_drawn_at_center() {
        let params = GenerationParameters {
            text: "logo".to_string(),
            size: 300,
            logo: Some(red_logo()),
            ..GenerationParameters::default()
        };

        let artifact = pipeline().render(&params).unwrap();
        assert!(artifact.has_logo());
        assert_eq!(artifact.image().get_pixel(150, 150), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_surface_rejects_superseded_present() {
        let surface = RenderSurface::new();
        let first = surface.begin_pass();
        let second = surface.begin_pass();

        assert!(!surface.present(first, RgbaImage::new(1, 1)));
        assert!(surface.snapshot().is_none());
        assert!(surface.present(second, RgbaImage::new(1, 1)));
        assert_eq!(surface.snapshot().unwrap().generation(), second);
    }

    #[test]
    fn test_surface_paint_logo_checks_generation() {
        let surface = RenderSurface::new();
        let logo = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]));

        let first = surface.begin_pass();
        surface.present(first, RgbaImage::from_pixel(100, 100, image::Rgba([255; 4])));
        let second = surface.begin_pass();

        assert_eq!(surface.paint_logo(first, &logo, Color::WHITE), LogoPaint::Stale);

        surface.present(second, RgbaImage::from_pixel(100, 100, image::Rgba([255; 4])));
        assert_eq!(surface.paint_logo(second, &logo, Color::WHITE), LogoPaint::Painted);
        assert!(surface.snapshot().unwrap().has_logo());
    }
}
