use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Category;

/// Application-level constants
pub const APP_NAME: &str = "Docsort";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Docsort/ on all platforms. Falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default destination tree for filed documents
pub fn default_destination_root() -> PathBuf {
    app_data_dir().join("classified")
}

/// Default location of the fitted model bundle
pub fn default_model_path() -> PathBuf {
    app_data_dir().join("model").join("classifier.json")
}

/// Log filter used when `RUST_LOG` is not set
pub fn default_log_filter() -> &'static str {
    "info,docsort=debug"
}

/// Fatal configuration problems, reported once before any document runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid thresholds: low={low}, high={high} (need 0 <= low <= high <= 1)")]
    Thresholds { low: f64, high: f64 },

    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Category set is empty")]
    NoCategories,

    #[error("Invalid directory name: {0:?}")]
    DirectoryName(String),

    #[error("Destination root {path} is not writable: {source}")]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model error: {0}")]
    Model(String),
}

/// How a filed document reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingMode {
    /// Write a copy, leave the origin file in place.
    Copy,
    /// Write a copy, then remove the origin file.
    Move,
}

/// Pipeline configuration. Every field has a default so a partial TOML
/// file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tesseract language string, e.g. "fra+eng".
    pub ocr_languages: String,
    /// Tesseract traineddata directory (only used with the `ocr` feature).
    pub tessdata_dir: Option<PathBuf>,
    /// Confidence at or above which a document is filed without review.
    pub high_threshold: f64,
    /// Confidence below which a document goes to the uncertain bucket.
    pub low_threshold: f64,
    pub categories: Vec<Category>,
    pub destination_root: PathBuf,
    /// Name of the fallback directory under `destination_root`.
    pub uncertain_dir: String,
    pub workers: usize,
    /// PDFs whose text layer is shorter than this (trimmed chars) are OCR'd.
    pub min_native_text_len: usize,
    pub render_dpi: u32,
    pub deskew: bool,
    /// Extra attempts after a transient OCR engine failure.
    pub ocr_retries: u32,
    pub ocr_retry_backoff_ms: u64,
    pub filing_mode: FilingMode,
    /// Parent directory for per-document render spools. System temp if unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_languages: "fra+eng".into(),
            tessdata_dir: None,
            high_threshold: 0.80,
            low_threshold: 0.50,
            categories: Category::ALL.to_vec(),
            destination_root: default_destination_root(),
            uncertain_dir: "uncertain".into(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            min_native_text_len: 20,
            render_dpi: 300,
            deskew: true,
            ocr_retries: 2,
            ocr_retry_backoff_ms: 250,
            filing_mode: FilingMode::Copy,
            scratch_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Check values that do not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (low, high) = (self.low_threshold, self.high_threshold);
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(low) || !in_unit(high) || low > high {
            return Err(ConfigError::Thresholds { low, high });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        validate_dir_name(&self.uncertain_dir)?;
        if self.categories.iter().any(|c| c.as_str() == self.uncertain_dir) {
            return Err(ConfigError::DirectoryName(self.uncertain_dir.clone()));
        }
        Ok(())
    }

    /// Create the destination root and prove a file can be written there.
    pub fn ensure_destination_writable(&self) -> Result<(), ConfigError> {
        let root = &self.destination_root;
        let not_writable = |source| ConfigError::DestinationNotWritable {
            path: root.clone(),
            source,
        };
        std::fs::create_dir_all(root).map_err(not_writable)?;
        tempfile::NamedTempFile::new_in(root).map_err(not_writable)?;
        Ok(())
    }
}

fn validate_dir_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(ConfigError::DirectoryName(name.to_string()));
    }
    Ok(())
}
