// QR Studio - desktop QR code generator
//
// Library crate with the render pipeline, debounce scheduler, export actions
// and state. The binary crate (main.rs) provides the GUI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod studio;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{Color, GenerationParameters, LogoAsset, Settings};
pub use state::{ParamChange, ParameterStore};
pub use studio::{LogoSelection, Studio, StudioError, StudioEvent};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Directory holding `QR Studio.yaml`
pub const CONFIG_DIR: &str = "QR Studio Data";
