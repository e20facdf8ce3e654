//! Data models for QR Studio.
//!
//! - [`GenerationParameters`]: text, size, colors and optional logo for one render
//! - [`Color`]: RGBA8 color parsed from hex notation
//! - [`LogoAsset`]: encoded logo bytes picked by the user, validated with [`admit_logo`]
//! - [`Settings`]: configuration loaded by [`ConfigManager`](crate::config::ConfigManager)
//!
//! Parameters are owned by [`ParameterStore`](crate::state::ParameterStore);
//! everything else receives clones.

pub mod config;
pub mod logo;
pub mod params;

pub use config::{ExportSettings, LoggingSettings, RenderSettings, Settings};
pub use logo::{LogoAdmission, LogoAsset, LogoError, MAX_LOGO_BYTES, admit_logo};
pub use params::{
    Color, ColorParseError, DEFAULT_SIZE, GenerationParameters, MAX_SIZE, MIN_SIZE,
    PLACEHOLDER_TEXT, clamp_size, effective_text, parse_size_input,
};
