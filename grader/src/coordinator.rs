//! # Batch Coordinator
//!
//! Grades many files under a fixed number of concurrent workers. Each file
//! runs its own [`pipeline`](crate::pipeline) start to finish; a failure in
//! one file never affects another.
//!
//! Workers never touch shared counters. They report state changes and their
//! final outcome over a channel, and a single collector assembles the report
//! in submission order.
//!
//! Results are saved in the background while grading continues. Call
//! [`BatchCoordinator::flush`] before shutting the runtime down so pending
//! saves are not dropped.

use std::sync::{Arc, Mutex};

use doc_parser::FileKind;
use marker::RuleEngine;
use marker::report::GradeResult;
use marker::rubric::Rubric;
use marker::types::EvaluationOptions;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use util::grading_config::GradingConfig;
use uuid::Uuid;

use crate::collaborators::{FileStager, NullStore, ResultStore};
use crate::error::{ErrorKind, GradingError};
use crate::pipeline::{self, DocumentExtractor, FeatureExtractor, PipelineContext, WorkerMessage};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Maximum number of files graded at once (at least 1).
    pub concurrency: usize,
    pub grading: EvaluationOptions,
    /// Kind to assume for every file instead of sniffing.
    pub declared_kind: Option<FileKind>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&GradingConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &GradingConfig) -> Self {
        Self {
            concurrency: config.batch.concurrency.max(1),
            grading: EvaluationOptions {
                only_criteria: None,
                include_details: config.batch.include_details,
            },
            declared_kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_id: String,
    pub error_kind: ErrorKind,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    /// Successful results in submission order.
    pub results: Vec<GradeResult>,
    /// Failures in submission order.
    pub errors: Vec<FileError>,
    pub summary: BatchSummary,
}

pub struct BatchCoordinator {
    stager: Arc<dyn FileStager>,
    store: Arc<dyn ResultStore>,
    engine: Arc<RuleEngine>,
    extractor: Arc<dyn FeatureExtractor>,
    config: Arc<GradingConfig>,
    saves: Mutex<JoinSet<()>>,
}

impl BatchCoordinator {
    /// A coordinator with the built-in detectors and a store that discards
    /// results.
    pub fn new(stager: Arc<dyn FileStager>, config: GradingConfig) -> Self {
        Self {
            stager,
            store: Arc::new(NullStore),
            engine: Arc::new(RuleEngine::new()),
            extractor: Arc::new(DocumentExtractor),
            config: Arc::new(config.sanitize()),
            saves: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_engine(mut self, engine: Arc<RuleEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub async fn run(&self, file_ids: Vec<String>, rubric: &Rubric, options: &BatchOptions) -> BatchReport {
        let (_keep_open, cancel) = watch::channel(false);
        self.run_with_cancel(file_ids, rubric, options, cancel).await
    }

    /// Like [`run`](Self::run), but files that have not started when `cancel`
    /// becomes `true` are skipped and reported as cancelled. Files already in
    /// progress finish normally.
    pub async fn run_with_cancel(
        &self,
        file_ids: Vec<String>,
        rubric: &Rubric,
        options: &BatchOptions,
        cancel: watch::Receiver<bool>,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let total = file_ids.len();
        let concurrency = options.concurrency.max(1);
        info!(batch_id = %batch_id, total, concurrency, rubric = %rubric.title, "batch started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(PipelineContext {
            stager: Arc::clone(&self.stager),
            extractor: Arc::clone(&self.extractor),
            engine: Arc::clone(&self.engine),
            rubric: Arc::new(rubric.clone()),
            config: Arc::clone(&self.config),
            grading: Arc::new(options.grading.clone()),
            declared_kind: options.declared_kind,
            events: tx.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut handles = Vec::with_capacity(total);
        for (index, file_id) in file_ids.iter().cloned().enumerate() {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let _ = tx.send(WorkerMessage::State {
                    index,
                    file_id: file_id.clone(),
                    state: pipeline::FileState::Queued,
                });

                let outcome = match semaphore.acquire_owned().await {
                    Err(_) => skip_file(&tx, index, &file_id, GradingError::Internal("worker pool closed".into())),
                    Ok(permit) => {
                        let cancelled = *cancel.borrow();
                        if cancelled {
                            skip_file(&tx, index, &file_id, GradingError::Cancelled)
                        } else {
                            let outcome = pipeline::run_file(&ctx, index, &file_id).await;
                            drop(permit);
                            outcome
                        }
                    }
                };
                let _ = tx.send(WorkerMessage::Finished { index, outcome });
            }));
        }
        // the collector stops once every worker has dropped its sender
        drop(tx);
        drop(ctx);

        let mut outcomes: Vec<Option<Result<GradeResult, GradingError>>> = vec![None; total];
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::State { index, file_id, state } => {
                    debug!(batch_id = %batch_id, index, file_id = %file_id, ?state, "file state");
                }
                WorkerMessage::Finished { index, outcome } => {
                    if let Ok(result) = &outcome {
                        self.persist(result.clone());
                    }
                    outcomes[index] = Some(outcome);
                }
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(batch_id = %batch_id, error = %e, "worker task aborted");
            }
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for (file_id, outcome) in file_ids.into_iter().zip(outcomes) {
            let outcome = outcome
                .unwrap_or_else(|| Err(GradingError::Internal("worker exited without a result".into())));
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => errors.push(FileError {
                    file_id,
                    error_kind: e.kind(),
                    error_message: e.to_string(),
                }),
            }
        }

        let summary = BatchSummary {
            total,
            success: results.len(),
            failed: errors.len(),
        };
        info!(
            batch_id = %batch_id,
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            "batch finished"
        );
        BatchReport {
            batch_id,
            results,
            errors,
            summary,
        }
    }

    /// Waits for every background save started so far. Store failures were
    /// already logged and are not reported again.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.lock_saves());
        let count = pending.len();
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "result save task aborted");
            }
        }
        if count > 0 {
            debug!(count, "pending result saves flushed");
        }
    }

    /// Hands a result to the store without waiting for it.
    fn persist(&self, result: GradeResult) {
        let store = Arc::clone(&self.store);
        self.lock_saves().spawn(async move {
            match store.save(&result).await {
                Ok(id) => debug!(file_id = %result.file.id, result_id = %id, "result stored"),
                Err(e) => warn!(file_id = %result.file.id, error = %e, "failed to store result"),
            }
        });
    }

    fn lock_saves(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reports a file that never reached the pipeline as failed and cleaned, so
/// every file ends in `Cleaned` whichever way it exits.
fn skip_file(
    events: &mpsc::UnboundedSender<WorkerMessage>,
    index: usize,
    file_id: &str,
    error: GradingError,
) -> Result<GradeResult, GradingError> {
    debug!(file_id = %file_id, error = %error, "file skipped");
    for state in [pipeline::FileState::Failed, pipeline::FileState::Cleaned] {
        let _ = events.send(WorkerMessage::State {
            index,
            file_id: file_id.to_string(),
            state,
        });
    }
    Err(error)
}
