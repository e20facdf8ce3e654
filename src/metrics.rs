// Runtime metrics
//
// Lock-free counters for render and export activity, logged on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Application-wide counters
///
/// Shared as `Arc<Metrics>` between the renderer, scheduler and exporter.
#[derive(Debug)]
pub struct Metrics {
    /// Edits that (re)armed the debounce timer
    pub renders_requested: AtomicU64,

    /// Render passes actually started
    pub renders_executed: AtomicU64,

    /// Render passes that failed to encode
    pub renders_failed: AtomicU64,

    /// Logo overlays composited onto their own pass
    pub logos_painted: AtomicU64,

    /// Logo overlays discarded because a newer pass had started
    pub stale_logos_dropped: AtomicU64,

    /// PNG files written through the download action
    pub downloads: AtomicU64,

    /// Share actions completed through any channel
    pub shares: AtomicU64,

    /// Shares that fell back to the composer link or a download offer
    pub share_fallbacks: AtomicU64,

    /// Share and clipboard attempts that failed unexpectedly
    pub export_failures: AtomicU64,

    /// Frames pushed to the UI thread
    pub ui_updates: AtomicU64,

    /// UI updates dropped because the bridge channel was full
    pub ui_update_channel_full: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            renders_requested: AtomicU64::new(0),
            renders_executed: AtomicU64::new(0),
            renders_failed: AtomicU64::new(0),
            logos_painted: AtomicU64::new(0),
            stale_logos_dropped: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            shares: AtomicU64::new(0),
            share_fallbacks: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            ui_update_channel_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_render_requested(&self) {
        self.renders_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_executed(&self) {
        self.renders_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_failed(&self) {
        self.renders_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_logo_painted(&self) {
        self.logos_painted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_logo_dropped(&self) {
        self.stale_logos_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_share(&self) {
        self.shares.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_share_fallback(&self) {
        self.share_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_channel_full(&self) {
        self.ui_update_channel_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Share of requested renders that were absorbed by debouncing (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        let requested = self.renders_requested.load(Ordering::Relaxed);
        let executed = self.renders_executed.load(Ordering::Relaxed);
        if requested == 0 {
            return 0.0;
        }
        requested.saturating_sub(executed) as f64 / requested as f64
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Renders: {} requested, {} executed, {} failed ({:.0}% coalesced)",
            self.renders_requested.load(Ordering::Relaxed),
            self.renders_executed.load(Ordering::Relaxed),
            self.renders_failed.load(Ordering::Relaxed),
            self.coalescing_ratio() * 100.0
        );
        tracing::info!(
            "Logos: {} painted, {} stale dropped",
            self.logos_painted.load(Ordering::Relaxed),
            self.stale_logos_dropped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Exports: {} downloads, {} shares ({} via fallback), {} failures",
            self.downloads.load(Ordering::Relaxed),
            self.shares.load(Ordering::Relaxed),
            self.share_fallbacks.load(Ordering::Relaxed),
            self.export_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "UI updates: {}, channel full errors: {}",
            self.ui_updates.load(Ordering::Relaxed),
            self.ui_update_channel_full.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
