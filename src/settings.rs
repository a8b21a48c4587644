use log::{LevelFilter, debug};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::navigation::ZoomLimits;
use crate::source::LoadConfig;
use crate::worker::WorkerOptions;

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdf-pageview";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("{field} must be a positive number, got {value}")]
    Invalid { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Page shown after a document loads; 0 keeps the view cleared
    #[serde(default = "default_initial_page")]
    pub initial_page: u32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,

    #[serde(default = "default_min_scale")]
    pub min_scale: f64,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub worker: WorkerOptions,

    #[serde(default)]
    pub load: LoadConfig,
}

fn default_initial_page() -> u32 {
    1
}

fn default_zoom_step() -> f64 {
    0.15
}

fn default_min_scale() -> f64 {
    0.1
}

fn default_device_pixel_ratio() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_page: default_initial_page(),
            zoom_step: default_zoom_step(),
            min_scale: default_min_scale(),
            device_pixel_ratio: default_device_pixel_ratio(),
            log_level: default_log_level(),
            worker: WorkerOptions::default(),
            load: LoadConfig::default(),
        }
    }
}

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl Settings {
    /// Load from `path`, or from the per-user config file if it exists.
    ///
    /// An explicit path must exist; a missing per-user file just yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        match preferred_config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let settings =
            serde_yaml::from_str::<Settings>(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    /// Reject zoom and pixel-ratio values that would make the scale
    /// zero, negative or NaN
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("zoom_step", self.zoom_step),
            ("min_scale", self.min_scale),
            ("device_pixel_ratio", self.device_pixel_ratio),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(SettingsError::Invalid { field, value });
            }
        }
        Ok(())
    }

    /// `log_level` as a filter; unknown names fall back to `Warn`
    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Warn)
    }

    #[must_use]
    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            initial_page: self.initial_page,
            zoom: ZoomLimits {
                step: self.zoom_step,
                min_scale: self.min_scale,
            },
            device_pixel_ratio: self.device_pixel_ratio,
            load: self.load.clone(),
        }
    }
}

/// Runtime options consumed by the viewer
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerOptions {
    pub initial_page: u32,
    pub zoom: ZoomLimits,
    pub device_pixel_ratio: f64,
    /// Merged under each source's own load configuration
    pub load: LoadConfig,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Settings::default().viewer_options()
    }
}
