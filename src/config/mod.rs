use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::fs;

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "QR Studio.yaml";

/// Prefix for environment overrides, e.g. `QRSTUDIO_RENDER__DEBOUNCE_MS=250`
pub const ENV_PREFIX: &str = "QRSTUDIO";

/// Loads and saves [`Settings`].
///
/// Loading layers, lowest to highest priority:
/// 1. Built-in defaults
/// 2. `QR Studio.yaml` in the config directory (optional)
/// 3. `QRSTUDIO_<SECTION>__<KEY>` environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a manager over `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load settings from defaults, the settings file and the process environment.
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with_env(None)
    }

    /// Load settings, taking environment overrides from `env` instead of the
    /// process environment when given.
    pub fn load_settings_with_env(&self, env: Option<HashMap<String, String>>) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let defaults = Config::try_from(&Settings::default())
            .context("Failed to build default settings")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(
                File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: Settings = config
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!(
            "Loaded settings (debounce {}ms, default size {})",
            settings.render.debounce_ms,
            settings.render.default_size
        );
        Ok(settings)
    }

    /// Write `settings` to the settings file as YAML.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Color;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> ConfigManager {
        let dir = Utf8PathBuf::from_path_buf(temp_dir.path().join("QR Studio Data")).unwrap();
        ConfigManager::new(dir).unwrap()
    }

    #[test]
    fn test_creates_config_directory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.config_dir().exists());
        assert!(manager.settings_path().ends_with(SETTINGS_FILE));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = manager(&temp_dir)
            .load_settings_with_env(Some(HashMap::new()))
            .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        fs::write(
            manager.settings_path(),
            "render:\n  debounce_ms: 300\n  foreground: \"#336699\"\nexport:\n  download_file_name: my-qr.png\n",
        )
        .unwrap();

        let settings = manager.load_settings_with_env(Some(HashMap::new())).unwrap();
        assert_eq!(settings.render.debounce_ms, 300);
        assert_eq!(settings.render.foreground, Color::rgb(0x33, 0x66, 0x99));
        assert_eq!(settings.render.default_size, 200);
        assert_eq!(settings.export.download_file_name, "my-qr.png");
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::write(manager.settings_path(), "render:\n  debounce_ms: 300\n").unwrap();

        let env = HashMap::from([
            ("QRSTUDIO_RENDER__DEBOUNCE_MS".to_string(), "50".to_string()),
            ("QRSTUDIO_LOGGING__DEBUG".to_string(), "true".to_string()),
        ]);
        let settings = manager.load_settings_with_env(Some(env)).unwrap();

        assert_eq!(settings.render.debounce_ms, 50);
        assert!(settings.logging.debug);
    }

    #[test]
    fn test_invalid_color_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::write(manager.settings_path(), "render:\n  background: \"not-a-color\"\n").unwrap();

        assert!(manager.load_settings_with_env(Some(HashMap::new())).is_err());
    }
}
