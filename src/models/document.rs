use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::enums::DocumentFormat;

/// A document handed to the pipeline. Owned by the caller and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub original_filename: String,
    /// Set when the document was read from disk. Move-mode filing removes it.
    pub origin: Option<PathBuf>,
}

impl SourceDocument {
    pub fn new(bytes: Vec<u8>, format: DocumentFormat, original_filename: &str) -> Self {
        Self {
            bytes,
            format,
            original_filename: original_filename.to_string(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, path: &Path) -> Self {
        self.origin = Some(path.to_path_buf());
        self
    }

    /// Filename without its extension.
    pub fn base_name(&self) -> &str {
        Path::new(&self.original_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Original extension, or the format's canonical one when the name has none.
    pub fn extension(&self) -> String {
        Path::new(&self.original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_string())
            .unwrap_or_else(|| self.format.extension().to_string())
    }
}
