use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use facegate_core::{VerifierConfig, MATCH_THRESHOLD};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("match_threshold must lie in [0, 1], got {0}")]
    InvalidThreshold(f64),
}

const DETECTOR_MODEL_FILE: &str = "seeta_fd_frontal_v1.0.bin";

/// CLI configuration.
///
/// Layered as defaults ← TOML file (`--config` or `FACEGATE_CONFIG`) ←
/// `FACEGATE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing the face detection model.
    pub model_dir: PathBuf,
    /// Minimum similarity accepted as a match.
    pub match_threshold: f64,
    /// Default number of records shown by `history`.
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("faces.db"),
            model_dir: default_data_dir().join("models"),
            match_threshold: MATCH_THRESHOLD,
            history_limit: 50,
        }
    }
}

impl Config {
    /// Load configuration from the optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEGATE_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `FACEGATE_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("FACEGATE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        self.match_threshold = env_parse(&lookup, "FACEGATE_MATCH_THRESHOLD", self.match_threshold);
        self.history_limit = env_parse(&lookup, "FACEGATE_HISTORY_LIMIT", self.history_limit);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        Ok(())
    }

    /// Path to the SeetaFace cascade detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(DETECTOR_MODEL_FILE)
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            match_threshold: self.match_threshold,
        }
    }
}

/// `$XDG_DATA_HOME/facegate`, falling back to `$HOME/.local/share/facegate`.
fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            default
        }),
        None => default,
    }
}
