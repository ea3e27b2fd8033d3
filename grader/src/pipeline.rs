//! One file's path through the grader:
//!
//! ```text
//! Queued → Loading → Extracting → Evaluating → Completed | Failed → Cleaned
//! ```
//!
//! `Cleaned` is reached on every exit path: the staged bytes are released
//! after the pipeline settles, whether it succeeded, failed or panicked.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use doc_parser::{DocumentError, DocumentFeatures, FileKind, LoadedDocument};
use futures::FutureExt;
use marker::RuleEngine;
use marker::report::{FileIdentity, GradeResult};
use marker::rubric::Rubric;
use marker::types::EvaluationOptions;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use util::grading_config::{GradingConfig, ParseLimits};

use crate::collaborators::FileStager;
use crate::error::GradingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileState {
    Queued,
    Loading,
    Extracting,
    Evaluating,
    Completed,
    Failed,
    Cleaned,
}

/// Messages sent by workers to the batch collector.
#[derive(Debug)]
pub enum WorkerMessage {
    State {
        index: usize,
        file_id: String,
        state: FileState,
    },
    Finished {
        index: usize,
        outcome: Result<GradeResult, GradingError>,
    },
}

/// Turns a loaded document into a feature record.
pub trait FeatureExtractor: Send + Sync {
    fn extract(
        &self,
        doc: &LoadedDocument,
        limits: &ParseLimits,
    ) -> Result<DocumentFeatures, DocumentError>;
}

/// The extractor backed by `doc_parser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl FeatureExtractor for DocumentExtractor {
    fn extract(
        &self,
        doc: &LoadedDocument,
        limits: &ParseLimits,
    ) -> Result<DocumentFeatures, DocumentError> {
        doc_parser::extract_features(doc, limits)
    }
}

/// Everything a worker needs; shared read-only across the batch.
pub(crate) struct PipelineContext {
    pub stager: Arc<dyn FileStager>,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub engine: Arc<RuleEngine>,
    pub rubric: Arc<Rubric>,
    pub config: Arc<GradingConfig>,
    pub grading: Arc<EvaluationOptions>,
    pub declared_kind: Option<FileKind>,
    pub events: UnboundedSender<WorkerMessage>,
}

impl PipelineContext {
    fn report(&self, index: usize, file_id: &str, state: FileState) {
        let _ = self.events.send(WorkerMessage::State {
            index,
            file_id: file_id.to_string(),
            state,
        });
    }
}

/// Runs the full pipeline for one file and always releases its staging.
pub(crate) async fn run_file(
    ctx: &Arc<PipelineContext>,
    index: usize,
    file_id: &str,
) -> Result<GradeResult, GradingError> {
    let started = Instant::now();

    let outcome = match AssertUnwindSafe(grade(ctx, index, file_id)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(GradingError::Internal(panic_message(panic))),
    };

    match &outcome {
        Ok(_) => ctx.report(index, file_id, FileState::Completed),
        Err(e) => {
            warn!(file_id, error = %e, "grading failed");
            ctx.report(index, file_id, FileState::Failed);
        }
    }

    ctx.stager.release(file_id).await;
    ctx.report(index, file_id, FileState::Cleaned);

    outcome.map(|mut result| {
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        result
    })
}

async fn grade(
    ctx: &Arc<PipelineContext>,
    index: usize,
    file_id: &str,
) -> Result<GradeResult, GradingError> {
    ctx.report(index, file_id, FileState::Loading);
    let staged = ctx.stager.fetch(file_id).await?;
    debug!(file_id, bytes = staged.bytes.len(), "source fetched");

    let identity = FileIdentity {
        id: file_id.to_string(),
        name: staged.name.clone(),
        source_entry: None,
    };
    let declared = ctx
        .declared_kind
        .or_else(|| staged.name.as_deref().and_then(FileKind::from_file_name));

    // parsing and evaluation are CPU-bound; keep them off the async workers
    let worker = Arc::clone(ctx);
    let file_id = file_id.to_string();
    tokio::task::spawn_blocking(move || -> Result<GradeResult, GradingError> {
        let doc = doc_parser::load(&staged.bytes, declared, &worker.config)?;

        worker.report(index, &file_id, FileState::Extracting);
        let features = worker.extractor.extract(&doc, &worker.config.parsing)?;

        worker.report(index, &file_id, FileState::Evaluating);
        let identity = FileIdentity {
            source_entry: doc.source_entry.clone(),
            ..identity
        };
        Ok(worker
            .engine
            .evaluate(identity, &features, &worker.rubric, &worker.grading))
    })
    .await
    .map_err(|e| match e.try_into_panic() {
        Ok(panic) => GradingError::Internal(panic_message(panic)),
        Err(e) => GradingError::Internal(e.to_string()),
    })?
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryStager, StagedFile};
    use doc_parser::fixtures::DocxBuilder;
    use marker::presets;
    use tokio::sync::mpsc;

    fn context(
        stager: Arc<MemoryStager>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> (Arc<PipelineContext>, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = PipelineContext {
            stager,
            extractor,
            engine: Arc::new(RuleEngine::new()),
            rubric: Arc::new(presets::preset(presets::WORD_BASIC).unwrap()),
            config: Arc::new(GradingConfig::default()),
            grading: Arc::new(EvaluationOptions::default()),
            declared_kind: None,
            events: tx,
        };
        (Arc::new(ctx), rx)
    }

    fn states(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<FileState> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let WorkerMessage::State { state, .. } = msg {
                out.push(state);
            }
        }
        out
    }

    struct Exploding;

    impl FeatureExtractor for Exploding {
        fn extract(&self, _: &LoadedDocument, _: &ParseLimits) -> Result<DocumentFeatures, DocumentError> {
            panic!("extractor exploded")
        }
    }

    #[tokio::test]
    async fn successful_file_walks_every_state() {
        let docx = DocxBuilder::new().heading(1, "Intro").build();
        let stager = Arc::new(MemoryStager::new().with_file("f1", StagedFile::new("essay.docx", docx)));
        let (ctx, mut rx) = context(stager.clone(), Arc::new(DocumentExtractor));

        let result = run_file(&ctx, 0, "f1").await.unwrap();
        assert_eq!(result.file.name.as_deref(), Some("essay.docx"));
        assert_eq!(result.file_type, FileKind::WordProcessor);
        assert_eq!(
            states(&mut rx),
            vec![
                FileState::Loading,
                FileState::Extracting,
                FileState::Evaluating,
                FileState::Completed,
                FileState::Cleaned
            ]
        );
        assert_eq!(stager.released(), vec!["f1".to_string()]);
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_and_still_cleans_up() {
        let docx = DocxBuilder::new().paragraph("x").build();
        let stager = Arc::new(MemoryStager::new().with_file("f1", StagedFile::new("a.docx", docx)));
        let (ctx, mut rx) = context(stager.clone(), Arc::new(Exploding));

        let err = run_file(&ctx, 0, "f1").await.unwrap_err();
        assert!(matches!(&err, GradingError::Internal(msg) if msg.contains("extractor exploded")));
        let seen = states(&mut rx);
        assert_eq!(&seen[seen.len() - 2..], &[FileState::Failed, FileState::Cleaned]);
        assert_eq!(stager.released(), vec!["f1".to_string()]);
    }

    #[tokio::test]
    async fn missing_source_fails_in_loading() {
        let stager = Arc::new(MemoryStager::new());
        let (ctx, mut rx) = context(stager.clone(), Arc::new(DocumentExtractor));

        let err = run_file(&ctx, 3, "ghost").await.unwrap_err();
        assert!(matches!(err, GradingError::Staging(_)));
        assert_eq!(
            states(&mut rx),
            vec![FileState::Loading, FileState::Failed, FileState::Cleaned]
        );
        assert_eq!(stager.released(), vec!["ghost".to_string()]);
    }

    #[tokio::test]
    async fn bad_bytes_are_unsupported() {
        let stager = Arc::new(MemoryStager::new().with_file("f", StagedFile::new("notes.txt", b"plain text".to_vec())));
        let (ctx, _rx) = context(stager, Arc::new(DocumentExtractor));
        let err = run_file(&ctx, 0, "f").await.unwrap_err();
        assert!(matches!(err, GradingError::UnsupportedFormat(_)));
    }
}
