//! Configuration file and data directory handling.

use crate::error::PocketError;
use crate::models::SessionOptions;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Get the default data directory.
///
/// Debug builds keep data next to the working directory so development runs
/// never touch the user's real profile.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./sqlpocket_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| d.join("sqlpocket"))
            .unwrap_or_else(|| PathBuf::from("./sqlpocket_data"))
    }
}

/// Create the data directory if needed.
pub fn init_data_dir(path: &Path) -> Result<(), PocketError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PocketError::config(format!(
                "Data path exists but is not a directory: {}",
                path.display()
            )));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        PocketError::config(format!("Failed to create data directory '{}': {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "Created data directory");
    Ok(())
}

/// Settings loaded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Timeouts and limits
    pub options: SessionOptions,
    /// Log filter directive, overriding the environment
    pub log_filter: Option<String>,
    /// Log directory, defaulting to `<data dir>/logs`
    pub log_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, PocketError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PocketError::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                )));
            }
        };

        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Load `config.json` from a data directory.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self, PocketError> {
        Self::load(&data_dir.join(CONFIG_FILE_NAME))
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), PocketError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| {
            PocketError::config(format!("Failed to write config file '{}': {e}", path.display()))
        })
    }

    /// Reject values that would make every operation fail.
    pub fn validate(&self) -> Result<(), PocketError> {
        let opts = &self.options;
        let timeouts = [
            ("tunnel_connect_timeout_secs", opts.tunnel_connect_timeout_secs),
            ("connect_timeout_secs", opts.connect_timeout_secs),
            ("read_timeout_secs", opts.read_timeout_secs),
            ("probe_timeout_secs", opts.probe_timeout_secs),
            ("validation_timeout_secs", opts.validation_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(PocketError::config(format!("{name} must be greater than zero")));
        }
        if opts.page_size == 0 {
            return Err(PocketError::config("page_size must be greater than zero"));
        }
        Ok(())
    }

    /// Log directory in effect.
    pub fn log_dir(&self, data_dir: &Path) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| data_dir.join("logs"))
    }
}
