//! Bounded parallel batches over a shared `Pipeline`.
//!
//! Documents run on the blocking pool (extraction and OCR are CPU and
//! file bound); a semaphore caps how many are in flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::processor::{
    BatchReport, FailedDocument, FailureKind, Pipeline, PipelineOutcome, Stage,
};
use crate::models::SourceDocument;

/// Cooperative cancellation shared between the caller and a running batch.
/// Checked before each document starts; a document in progress always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Pipeline {
    /// Process documents with at most `workers` in flight. Outcomes come
    /// back in input order whatever order they finish in.
    pub async fn process_batch_parallel(
        self: Arc<Self>,
        docs: Vec<SourceDocument>,
        cancel: CancelFlag,
    ) -> BatchReport {
        let jobs: Vec<(String, SourceDocument)> = docs
            .into_iter()
            .map(|doc| (doc.original_filename.clone(), doc))
            .collect();
        run_bounded(self, jobs, cancel, |pipeline: &Pipeline, doc: SourceDocument| {
            pipeline.process(&doc)
        })
        .await
    }

    /// Like `process_batch_parallel`, but each worker reads its own file,
    /// so only `workers` documents are held in memory at once.
    pub async fn process_paths_parallel(
        self: Arc<Self>,
        paths: Vec<PathBuf>,
        cancel: CancelFlag,
    ) -> BatchReport {
        let jobs: Vec<(String, PathBuf)> = paths
            .into_iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                (name, path)
            })
            .collect();
        run_bounded(self, jobs, cancel, |pipeline: &Pipeline, path: PathBuf| {
            pipeline.process_path(&path)
        })
        .await
    }
}

async fn run_bounded<T: Send + 'static>(
    pipeline: Arc<Pipeline>,
    jobs: Vec<(String, T)>,
    cancel: CancelFlag,
    work: fn(&Pipeline, T) -> PipelineOutcome,
) -> BatchReport {
    let total = jobs.len();
    let semaphore = Arc::new(Semaphore::new(pipeline.workers()));
    let mut tasks = JoinSet::new();
    let mut task_index = HashMap::new();
    let mut names = Vec::with_capacity(total);
    let mut skipped = Vec::new();

    tracing::info!(documents = total, workers = pipeline.workers(), "Batch started");

    for (index, (name, job)) in jobs.into_iter().enumerate() {
        names.push(name.clone());
        if !skipped.is_empty() {
            skipped.push(name);
            continue;
        }

        // The semaphore is never closed, so acquire only fails if that changes.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            skipped.push(name);
            continue;
        };
        if cancel.is_cancelled() {
            skipped.push(name);
            continue;
        }

        let pipeline = pipeline.clone();
        let handle = tasks.spawn_blocking(move || {
            let _permit = permit;
            work(&pipeline, job)
        });
        task_index.insert(handle.id(), index);
    }

    let mut slots: Vec<Option<PipelineOutcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                if let Some(&index) = task_index.get(&id) {
                    slots[index] = Some(outcome);
                }
            }
            Err(e) => {
                let Some(&index) = task_index.get(&e.id()) else {
                    continue;
                };
                tracing::error!(file = %names[index], error = %e, "Worker panicked");
                // parser panics are the only known source; report them as unreadable input
                slots[index] = Some(PipelineOutcome::Failed(FailedDocument {
                    filename: names[index].clone(),
                    stage: Stage::Extraction,
                    kind: FailureKind::CorruptInput,
                    detail: format!("worker panicked: {e}"),
                }));
            }
        }
    }

    let outcomes: Vec<PipelineOutcome> = slots.into_iter().flatten().collect();
    if !skipped.is_empty() {
        tracing::info!(skipped = skipped.len(), "Batch cancelled");
    }
    tracing::info!(
        processed = outcomes.len(),
        filed = outcomes.iter().filter(|o| matches!(o, PipelineOutcome::Filed(_))).count(),
        "Batch finished"
    );

    BatchReport { outcomes, skipped }
}
