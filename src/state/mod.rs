// Parameter store
//
// Wraps GenerationParameters with thread-safe access using Arc<RwLock<T>> and
// emits change events. Setters validate only; rendering is always started by
// the caller through the debounce scheduler.

use crate::models::{
    Color, GenerationParameters, LogoAsset, RenderSettings, clamp_size, parse_size_input,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when parameters are modified
#[derive(Clone, Debug, PartialEq)]
pub enum ParamChange {
    /// The text to encode changed
    TextChanged,

    /// The effective (clamped) size changed
    SizeChanged { size: u32 },

    /// Foreground and/or background color changed
    ColorsChanged { foreground: Color, background: Color },

    /// A logo was selected, replaced or cleared
    LogoChanged { present: bool },
}

/// Thread-safe holder of the current [`GenerationParameters`]
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for access
/// - the `set_*` methods for validated mutations
/// - [`subscribe()`](Self::subscribe) for change events
///
/// Clones share the same parameters and channel.
pub struct ParameterStore {
    params: Arc<RwLock<GenerationParameters>>,

    /// Broadcast channel for change events; sending with no subscribers is fine
    change_tx: broadcast::Sender<ParamChange>,
}

impl ParameterStore {
    /// Create a store holding default parameters
    pub fn new() -> Self {
        Self::with_params(GenerationParameters::default())
    }

    /// Create a store holding `params`, with the size clamped
    pub fn with_params(mut params: GenerationParameters) -> Self {
        params.size = clamp_size(params.size as i64);
        let (change_tx, _) = broadcast::channel(64);
        Self {
            params: Arc::new(RwLock::new(params)),
            change_tx,
        }
    }

    /// Clone of the current parameters, safe to hand to a render pass
    pub fn snapshot(&self) -> GenerationParameters {
        self.read(GenerationParameters::clone)
    }

    /// Execute a function with read access to the parameters
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&GenerationParameters) -> R,
    {
        let params = self.params.read().unwrap_or_else(PoisonError::into_inner);
        f(&params)
    }

    /// Apply a mutation and emit the resulting change events
    ///
    /// The size is re-clamped after `update_fn` runs, so no mutation can leave
    /// it out of range.
    ///
    /// # Returns
    /// The ParamChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<ParamChange>
    where
        F: FnOnce(&mut GenerationParameters),
    {
        let mut params = self.params.write().unwrap_or_else(PoisonError::into_inner);
        let old = params.clone();

        update_fn(&mut params);
        params.size = clamp_size(params.size as i64);

        let changes = Self::detect_changes(&old, &params);
        for change in &changes {
            let _ = self.change_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<ParamChange> {
        self.change_tx.subscribe()
    }

    fn detect_changes(old: &GenerationParameters, new: &GenerationParameters) -> Vec<ParamChange> {
        let mut changes = Vec::new();

        if old.text != new.text {
            changes.push(ParamChange::TextChanged);
        }

        if old.size != new.size {
            changes.push(ParamChange::SizeChanged { size: new.size });
        }

        if old.foreground != new.foreground || old.background != new.background {
            changes.push(ParamChange::ColorsChanged {
                foreground: new.foreground,
                background: new.background,
            });
        }

        if old.logo != new.logo {
            changes.push(ParamChange::LogoChanged {
                present: new.logo.is_some(),
            });
        }

        changes
    }

    pub fn set_text(&self, text: impl Into<String>) -> Vec<ParamChange> {
        let text = text.into();
        self.update(|params| params.text = text)
    }

    /// Set the size, clamped into `[MIN_SIZE, MAX_SIZE]`
    pub fn set_size(&self, size: i64) -> Vec<ParamChange> {
        self.update(|params| params.size = clamp_size(size))
    }

    /// Set the size from raw input text (e.g. a slider or text box)
    pub fn set_size_input(&self, input: &str) -> Vec<ParamChange> {
        let size = parse_size_input(input);
        self.update(|params| params.size = size)
    }

    pub fn set_foreground(&self, color: Color) -> Vec<ParamChange> {
        self.update(|params| params.foreground = color)
    }

    pub fn set_background(&self, color: Color) -> Vec<ParamChange> {
        self.update(|params| params.background = color)
    }

    /// Replace the logo wholesale
    pub fn set_logo(&self, logo: LogoAsset) -> Vec<ParamChange> {
        self.update(|params| params.logo = Some(logo))
    }

    pub fn clear_logo(&self) -> Vec<ParamChange> {
        self.update(|params| params.logo = None)
    }

    /// Load initial parameters from settings, keeping any selected logo
    pub fn load_from_settings(&self, settings: &RenderSettings) -> Vec<ParamChange> {
        self.update(|params| {
            params.text = settings.default_text.clone();
            params.size = clamp_size(settings.default_size as i64);
            params.foreground = settings.foreground;
            params.background = settings.background;

            tracing::info!(
                "Loaded render settings: size={}, fg={}, bg={}",
                params.size,
                params.foreground,
                params.background
            );
        })
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ParameterStore {
    fn clone(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            change_tx: self.change_tx.clone(),
        }
    }
}
