pub mod clock;
pub mod naming;
pub mod organizer;

pub use clock::*;
pub use organizer::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest `_N` suffix tried before a name is given up on.
pub const MAX_CONFLICT_SUFFIX: u32 = 9999;

#[derive(Error, Debug)]
pub enum OrganizationError {
    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free filename for {stem} in {dir} after {attempts} attempts")]
    ConflictsExhausted {
        dir: PathBuf,
        stem: String,
        attempts: u32,
    },
}

/// Which confidence tier a document landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// At or above the high threshold; category directory, plain name.
    Direct,
    /// Between the thresholds; category directory, `_review` marker.
    Review,
    /// Below the low threshold; uncertain directory, label in the name.
    Uncertain,
}

/// Where a document was filed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationDecision {
    pub target_dir: PathBuf,
    pub filename: String,
    pub final_path: PathBuf,
    pub routing: Routing,
    /// `Some(n)` when the first `n` candidate names were taken.
    pub conflict_suffix: Option<u32>,
}
