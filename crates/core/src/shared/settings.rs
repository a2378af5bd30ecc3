use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which face detector backend to load at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    Haar,
    Blazeface,
}

impl std::fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorBackend::Haar => write!(f, "haar"),
            DetectorBackend::Blazeface => write!(f, "blazeface"),
        }
    }
}

/// Process-level analysis configuration.
///
/// Read once at startup; individual analysis requests cannot change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub detector: DetectorBackend,
    /// Pyramid step between detection scales. Lower finds more faces, slower.
    pub scale_factor: f64,
    /// Raw hits a face needs before it is reported. Higher is stricter.
    pub min_neighbors: u32,
    /// Smallest face side in pixels; 0 uses the cascade window size.
    pub min_face_size: u32,
    pub cascade_path: Option<PathBuf>,
    pub blazeface_model_path: Option<PathBuf>,
    pub blazeface_confidence: f64,
    /// Concurrent analyses when several clips are submitted together.
    pub workers: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            detector: DetectorBackend::Haar,
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_face_size: 0,
            cascade_path: None,
            blazeface_model_path: None,
            blazeface_confidence: 0.5,
            workers: 1,
        }
    }
}

impl AnalysisSettings {
    /// `<config_dir>/FaceStress/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceStress").join("settings.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Self = serde_json::from_str(&json).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads the user settings file, using defaults when it is absent or broken.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings file: {e}");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(SettingsError::Invalid {
                name: "scale_factor",
                reason: format!("must be greater than 1.0, got {}", self.scale_factor),
            });
        }
        if !(0.0..=1.0).contains(&self.blazeface_confidence) {
            return Err(SettingsError::Invalid {
                name: "blazeface_confidence",
                reason: format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.blazeface_confidence
                ),
            });
        }
        if self.workers == 0 {
            return Err(SettingsError::Invalid {
                name: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
