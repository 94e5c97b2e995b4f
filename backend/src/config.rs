//! Engine configuration file support.
//!
//! Settings are read from an `engine.toml` file. Every section and key is
//! optional and falls back to the defaults below. Environment variables with
//! the `POSTURE_` prefix override file values.
//!
//! ```toml
//! [repository]
//! type = "local"
//!
//! [analysis]
//! min_landmark_confidence = 0.5
//! min_body_extent = 0.5
//!
//! [comparison]
//! stable_tolerance_degrees = 0.5
//! stable_tolerance_level = 0.002
//!
//! [trend]
//! stable_threshold_degrees = 1.0
//! stable_threshold_level = 0.005
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::db::factory::RepositoryType;
use crate::models::MeasurementUnit;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub comparison: ComparisonSettings,
    #[serde(default)]
    pub trend: TrendSettings,
}

/// Repository backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Deviation Analyzer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Landmarks below this confidence are treated as missing.
    #[serde(default = "default_min_landmark_confidence")]
    pub min_landmark_confidence: f64,
    /// Minimum vertical extent of confident landmarks for body normalization.
    #[serde(default = "default_min_body_extent")]
    pub min_body_extent: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            min_landmark_confidence: default_min_landmark_confidence(),
            min_body_extent: default_min_body_extent(),
        }
    }
}

/// Comparison Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSettings {
    #[serde(default = "default_stable_tolerance_degrees")]
    pub stable_tolerance_degrees: f64,
    #[serde(default = "default_stable_tolerance_level")]
    pub stable_tolerance_level: f64,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            stable_tolerance_degrees: default_stable_tolerance_degrees(),
            stable_tolerance_level: default_stable_tolerance_level(),
        }
    }
}

impl ComparisonSettings {
    /// Largest change in deviation amount still considered stable.
    pub fn tolerance(&self, unit: MeasurementUnit) -> f64 {
        match unit {
            MeasurementUnit::Degrees => self.stable_tolerance_degrees,
            MeasurementUnit::LevelDifference => self.stable_tolerance_level,
        }
    }
}

/// Trend Analyzer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSettings {
    #[serde(default = "default_stable_threshold_degrees")]
    pub stable_threshold_degrees: f64,
    #[serde(default = "default_stable_threshold_level")]
    pub stable_threshold_level: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            stable_threshold_degrees: default_stable_threshold_degrees(),
            stable_threshold_level: default_stable_threshold_level(),
        }
    }
}

impl TrendSettings {
    /// Largest `|changeFromFirst|` still considered stable.
    pub fn threshold(&self, unit: MeasurementUnit) -> f64 {
        match unit {
            MeasurementUnit::Degrees => self.stable_threshold_degrees,
            MeasurementUnit::LevelDifference => self.stable_threshold_level,
        }
    }
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_min_landmark_confidence() -> f64 {
    0.5
}

fn default_min_body_extent() -> f64 {
    0.5
}

fn default_stable_tolerance_degrees() -> f64 {
    0.5
}

fn default_stable_tolerance_level() -> f64 {
    0.002
}

fn default_stable_threshold_degrees() -> f64 {
    1.0
}

fn default_stable_threshold_level() -> f64 {
    0.005
}

const ENV_OVERRIDES: &[&str] = &[
    "POSTURE_REPOSITORY_TYPE",
    "POSTURE_MIN_LANDMARK_CONFIDENCE",
    "POSTURE_MIN_BODY_EXTENT",
    "POSTURE_STABLE_TOLERANCE_DEGREES",
    "POSTURE_STABLE_TOLERANCE_LEVEL",
    "POSTURE_TREND_THRESHOLD_DEGREES",
    "POSTURE_TREND_THRESHOLD_LEVEL",
];

fn env_f64(key: &str) -> Result<Option<f64>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Searches for `engine.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Returns `Ok(None)` when no file exists.
    pub fn from_default_location() -> Result<Option<Self>, ConfigError> {
        let search_paths = [
            PathBuf::from("engine.toml"),
            PathBuf::from("backend/engine.toml"),
            PathBuf::from("../engine.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                log::debug!("Loading engine configuration from {}", path.display());
                return Self::from_file(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Defaults, then the default-location file if any, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_default_location()?.unwrap_or_default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `POSTURE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(repo_type) = std::env::var("POSTURE_REPOSITORY_TYPE") {
            self.repository.repo_type = repo_type;
        }
        if let Some(v) = env_f64("POSTURE_MIN_LANDMARK_CONFIDENCE")? {
            self.analysis.min_landmark_confidence = v;
        }
        if let Some(v) = env_f64("POSTURE_MIN_BODY_EXTENT")? {
            self.analysis.min_body_extent = v;
        }
        if let Some(v) = env_f64("POSTURE_STABLE_TOLERANCE_DEGREES")? {
            self.comparison.stable_tolerance_degrees = v;
        }
        if let Some(v) = env_f64("POSTURE_STABLE_TOLERANCE_LEVEL")? {
            self.comparison.stable_tolerance_level = v;
        }
        if let Some(v) = env_f64("POSTURE_TREND_THRESHOLD_DEGREES")? {
            self.trend.stable_threshold_degrees = v;
        }
        if let Some(v) = env_f64("POSTURE_TREND_THRESHOLD_LEVEL")? {
            self.trend.stable_threshold_level = v;
        }
        self.validate()
    }

    /// Names of the environment variables read by [`apply_env_overrides`](Self::apply_env_overrides).
    pub fn env_keys() -> &'static [&'static str] {
        ENV_OVERRIDES
    }

    pub fn repository_type(&self) -> Result<RepositoryType, ConfigError> {
        RepositoryType::from_str(&self.repository.repo_type).map_err(ConfigError::Invalid)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let confidence = self.analysis.min_landmark_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfigError::Invalid(format!(
                "analysis.min_landmark_confidence must be within [0, 1], got {}",
                confidence
            )));
        }
        let extent = self.analysis.min_body_extent;
        if !(extent > 0.0 && extent <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "analysis.min_body_extent must be within (0, 1], got {}",
                extent
            )));
        }
        let non_negative = [
            ("comparison.stable_tolerance_degrees", self.comparison.stable_tolerance_degrees),
            ("comparison.stable_tolerance_level", self.comparison.stable_tolerance_level),
            ("trend.stable_threshold_degrees", self.trend.stable_threshold_degrees),
            ("trend.stable_threshold_level", self.trend.stable_threshold_level),
        ];
        for (key, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be non-negative, got {}",
                    key, value
                )));
            }
        }
        self.repository_type()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.analysis.min_landmark_confidence, 0.5);
        assert_eq!(config.comparison.tolerance(MeasurementUnit::Degrees), 0.5);
        assert_eq!(config.trend.threshold(MeasurementUnit::LevelDifference), 0.005);
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
    }

    #[test]
    fn test_partial_section() {
        let toml = r#"
[analysis]
min_landmark_confidence = 0.7

[trend]
stable_threshold_degrees = 2.0
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.analysis.min_landmark_confidence, 0.7);
        assert_eq!(config.analysis.min_body_extent, 0.5);
        assert_eq!(config.trend.stable_threshold_degrees, 2.0);
        assert_eq!(config.trend.stable_threshold_level, 0.005);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.analysis.min_landmark_confidence = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = EngineConfig::default();
        config.comparison.stable_tolerance_level = -0.1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.repository.repo_type = "cassandra".to_string();
        assert!(config.validate().is_err());
    }
}
