use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::clock::Clock;
use super::naming::{candidate_name, filing_stem, sanitize_component};
use super::{OrganizationDecision, OrganizationError, Routing, MAX_CONFLICT_SUFFIX};
use crate::config::{FilingMode, PipelineConfig};
use crate::models::SourceDocument;
use crate::pipeline::classification::ClassificationResult;

/// Confidence-gated filing into `<root>/<category>/` or `<root>/<uncertain>/`.
pub struct Organizer {
    root: PathBuf,
    uncertain_dir: String,
    high_threshold: f64,
    low_threshold: f64,
    mode: FilingMode,
    clock: Arc<dyn Clock>,
}

impl Organizer {
    pub fn from_config(config: &PipelineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: config.destination_root.clone(),
            uncertain_dir: config.uncertain_dir.clone(),
            high_threshold: config.high_threshold,
            low_threshold: config.low_threshold,
            mode: config.filing_mode,
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `confidence >= high` is direct, `low <= confidence < high` is review.
    pub fn route(&self, confidence: f64) -> Routing {
        if confidence >= self.high_threshold {
            Routing::Direct
        } else if confidence >= self.low_threshold {
            Routing::Review
        } else {
            Routing::Uncertain
        }
    }

    /// Write one copy of the document into its destination under a fresh name.
    /// Nothing outside the destination directory changes on failure.
    pub fn organize(
        &self,
        doc: &SourceDocument,
        result: &ClassificationResult,
    ) -> Result<OrganizationDecision, OrganizationError> {
        let routing = self.route(result.confidence);
        let target_dir = match routing {
            Routing::Direct | Routing::Review => self.root.join(result.category.as_str()),
            Routing::Uncertain => self.root.join(&self.uncertain_dir),
        };
        std::fs::create_dir_all(&target_dir).map_err(|source| OrganizationError::Io {
            path: target_dir.clone(),
            source,
        })?;

        let extension = sanitize_component(&doc.extension());
        let stem = filing_stem(
            doc.base_name(),
            self.clock.now(),
            routing,
            result.category,
            result.confidence,
            &extension,
        );

        let staged = self.stage(&target_dir, &doc.bytes)?;
        let (filename, suffix) = claim_name(staged, &target_dir, &stem, &extension)?;
        let final_path = target_dir.join(&filename);

        tracing::info!(
            file = %doc.original_filename,
            category = result.category.as_str(),
            confidence = result.confidence,
            routing = ?routing,
            destination = %final_path.display(),
            "Document filed"
        );

        if self.mode == FilingMode::Move {
            if let Some(origin) = &doc.origin {
                // the copy is already in place; a leftover origin is only a warning
                if let Err(e) = std::fs::remove_file(origin) {
                    tracing::warn!(origin = %origin.display(), error = %e, "Could not remove origin after filing");
                }
            }
        }

        Ok(OrganizationDecision {
            target_dir,
            filename,
            final_path,
            routing,
            conflict_suffix: (suffix > 0).then_some(suffix),
        })
    }

    /// Write the content to a hidden temp file in the destination directory.
    fn stage(&self, dir: &Path, bytes: &[u8]) -> Result<NamedTempFile, OrganizationError> {
        let io_err = |source| OrganizationError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
        staged.write_all(bytes).map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;
        Ok(staged)
    }
}

/// Link the staged file under the first free candidate name.
/// `persist_noclobber` fails with `AlreadyExists` instead of replacing, so two
/// workers racing for one name each end up with a distinct file.
fn claim_name(
    mut staged: NamedTempFile,
    dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<(String, u32), OrganizationError> {
    for suffix in 0..=MAX_CONFLICT_SUFFIX {
        let name = candidate_name(stem, suffix, extension);
        let path = dir.join(&name);
        match staged.persist_noclobber(&path) {
            Ok(_) => {
                if suffix > 0 {
                    tracing::debug!(name = %name, suffix, "Name conflict resolved");
                }
                return Ok((name, suffix));
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => {
                return Err(OrganizationError::Io {
                    path,
                    source: e.error,
                })
            }
        }
    }

    Err(OrganizationError::ConflictsExhausted {
        dir: dir.to_path_buf(),
        stem: stem.to_string(),
        attempts: MAX_CONFLICT_SUFFIX + 1,
    })
}
