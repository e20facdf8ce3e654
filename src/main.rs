//! QR Studio - desktop QR code generator
//!
//! Main entry point for the GUI application.
//!
//! # Execution Flow
//!
//! 1. Load settings from `QR Studio Data/QR Studio.yaml` and `QRSTUDIO_*` variables
//! 2. Initialize logging (daily rotating file + optional console)
//! 3. Create the tokio runtime (debounce timers, logo decoding, exports)
//! 4. Create the ParameterStore and the Studio
//! 5. Create the GuiController and run the Slint event loop (blocks until closed)
//! 6. Shut the runtime down and log the metrics summary
//!
//! The Slint event loop owns the main thread; everything else runs on tokio
//! workers and reaches the UI through the bridge.

use anyhow::{Context, Result};
use qrstudio::services::{Exporter, Platform};
use qrstudio::ui::GuiController;
use qrstudio::{APP_NAME, CONFIG_DIR, ConfigManager, Metrics, ParameterStore, Studio, VERSION};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let settings = config_manager.load_settings()?;

    // Held until exit so buffered log lines are flushed
    let _log_guard = qrstudio::logging::init_from_settings(&settings.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("qrstudio-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());

    let store = ParameterStore::new();
    store.load_from_settings(&settings.render);

    let staging_dir = Exporter::default_staging_dir()
        .context("System temp directory is not valid UTF-8")?;

    let studio = Arc::new(Studio::new(
        &settings,
        store,
        Platform::system(),
        staging_dir,
        runtime.handle().clone(),
        Arc::clone(&metrics),
    ));

    let gui_controller = GuiController::new(Arc::clone(&studio))?;

    tracing::info!("GUI controller initialized, launching window");

    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    // Pending release timers die with the runtime
    studio.exporter().purge_staging();
    runtime.shutdown_timeout(Duration::from_secs(2));

    metrics.log_summary();
    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
