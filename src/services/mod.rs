//! Services module - rendering, scheduling and export logic.
//!
//! Nothing here depends on the UI layer; the [`Studio`](crate::studio::Studio)
//! wires these pieces together and the controller drives the studio.
//!
//! # Components
//!
//! - [`canvas`]: raster surface with path fills, image blits and PNG encoding
//! - [`encoder`]: the [`QrEncoder`] capability and its `qrcode`-backed implementation
//! - [`render`]: the pure [`RenderPipeline`] plus the generation-tagged
//!   [`Renderer`] / [`RenderSurface`] used for live preview
//! - [`debounce`]: trailing-edge [`Debouncer`] on the tokio runtime
//! - [`export`]: download and share actions ([`Exporter`])
//! - [`platform`]: share sheet, clipboard and URL launcher capabilities
//!
//! # Render flow
//!
//! 1. An edit updates the [`ParameterStore`](crate::state::ParameterStore)
//! 2. The studio triggers the debouncer with the edit
//! 3. After the quiet period the renderer starts a pass on the latest snapshot
//! 4. The base QR layer is published at once; a logo is decoded off the pass
//!    and painted only if no newer pass has started

pub mod canvas;
pub mod debounce;
pub mod encoder;
pub mod export;
pub mod platform;
pub mod render;

pub use canvas::{Canvas, encode_png};
pub use debounce::Debouncer;
pub use encoder::{EcLevel, EncodeRequest, EncodingError, QrEncoder, QrcodeEncoder};
pub use export::{ExportError, Exporter, ShareChannel, ShareOutcome, StagedFile};
pub use platform::{
    DesktopShareSheet, ImageClipboard, Platform, PlatformError, ShareSheet, SystemClipboard,
    SystemUrlLauncher, UrlLauncher,
};
pub use render::{
    DecodingLogoLoader, LogoLoader, LogoPaint, LogoPlacement, RenderError, RenderPass,
    RenderPipeline, RenderSurface, RenderedArtifact, Renderer,
};
