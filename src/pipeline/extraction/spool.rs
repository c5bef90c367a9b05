use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::ExtractionError;

/// Per-document scratch directory for rendered page images.
/// Dropping the spool deletes the directory and everything in it.
pub struct PageSpool {
    dir: TempDir,
    pages: Vec<PathBuf>,
}

impl PageSpool {
    /// Create under `scratch_dir`, or the system temp dir when `None`.
    pub fn create(scratch_dir: Option<&Path>) -> Result<Self, ExtractionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docsort-pages-");
        let dir = match scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| ExtractionError::EngineUnavailable(format!("no scratch space: {e}")))?;

        Ok(Self {
            dir,
            pages: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the next page image; pages are numbered in push order.
    pub fn push(&mut self, image_bytes: &[u8]) -> Result<(), ExtractionError> {
        let path = self
            .dir
            .path()
            .join(format!("page-{:04}.png", self.pages.len() + 1));
        std::fs::write(&path, image_bytes).map_err(|e| {
            ExtractionError::EngineUnavailable(format!("cannot spool page image: {e}"))
        })?;
        self.pages.push(path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Read back page `index` (0-based).
    pub fn read(&self, index: usize) -> Result<Vec<u8>, ExtractionError> {
        let path = self.pages.get(index).ok_or_else(|| {
            ExtractionError::EngineUnavailable(format!("page {} was never spooled", index + 1))
        })?;
        std::fs::read(path).map_err(|e| {
            ExtractionError::EngineUnavailable(format!("cannot read spooled page: {e}"))
        })
    }
}
