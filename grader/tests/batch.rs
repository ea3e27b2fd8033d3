use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use doc_parser::fixtures::{DocxBuilder, PptxBuilder, SlideSpec};
use doc_parser::{DocumentError, DocumentFeatures, LoadedDocument, PackageHandle};
use grader::error::ErrorKind;
use grader::{
    BatchCoordinator, BatchOptions, DocumentExtractor, FeatureExtractor, FsStager, GradingError,
    JsonFileStore, MemoryStager, ResultStore, StagedFile,
};
use marker::presets;
use marker::report::GradeResult;
use serial_test::serial;
use tokio::sync::watch;
use util::grading_config::{GradingConfig, ParseLimits};
use util::paths;
use util::test_helpers::{build_zip, setup_test_staging_root};

/// Panics while extracting any document whose title property is "boom".
struct FaultyExtractor;

impl FeatureExtractor for FaultyExtractor {
    fn extract(&self, doc: &LoadedDocument, limits: &ParseLimits) -> Result<DocumentFeatures, DocumentError> {
        let core = doc.package.read_part("docProps/core.xml").unwrap_or_default();
        if String::from_utf8_lossy(core).contains("<dc:title>boom</dc:title>") {
            panic!("extractor fault");
        }
        DocumentExtractor.extract(doc, limits)
    }
}

/// Tracks how many extractions run at once.
struct SlowExtractor {
    running: AtomicUsize,
    max_observed: AtomicUsize,
}

impl FeatureExtractor for SlowExtractor {
    fn extract(&self, doc: &LoadedDocument, limits: &ParseLimits) -> Result<DocumentFeatures, DocumentError> {
        let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        self.running.fetch_sub(1, Ordering::SeqCst);
        DocumentExtractor.extract(doc, limits)
    }
}

#[derive(Default)]
struct RecordingStore {
    saved: Mutex<Vec<String>>,
}

#[async_trait]
impl ResultStore for RecordingStore {
    async fn save(&self, result: &GradeResult) -> Result<String, GradingError> {
        self.saved.lock().unwrap().push(result.file.id.clone());
        Ok(format!("stored-{}", result.file.id))
    }
}

fn docx(title: &str) -> Vec<u8> {
    DocxBuilder::new().title(title).heading(1, "Intro").paragraph("Body text").build()
}

fn five_documents() -> Arc<MemoryStager> {
    let stager = MemoryStager::new();
    for i in 1..=5 {
        let title = if i == 3 { "boom" } else { "fine" };
        stager.insert(i.to_string(), StagedFile::new(format!("essay{i}.docx"), docx(title)));
    }
    Arc::new(stager)
}

fn ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

fn options(concurrency: usize) -> BatchOptions {
    BatchOptions {
        concurrency,
        ..BatchOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_faulting_file_does_not_affect_the_others() {
    let stager = five_documents();
    let coordinator = BatchCoordinator::new(stager.clone(), GradingConfig::default())
        .with_extractor(Arc::new(FaultyExtractor));
    let rubric = presets::preset(presets::WORD_BASIC).unwrap();

    let report = coordinator.run(ids(5), &rubric, &options(2)).await;

    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.success, 4);
    assert_eq!(report.summary.failed, 1);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file_id, "3");
    assert_eq!(report.errors[0].error_kind, ErrorKind::Internal);
    assert!(report.errors[0].error_message.contains("extractor fault"));

    let graded: Vec<&str> = report.results.iter().map(|r| r.file.id.as_str()).collect();
    assert_eq!(graded, vec!["1", "2", "4", "5"]);

    let mut released = stager.released();
    released.sort();
    assert_eq!(released, ids(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn respects_max_concurrency() {
    let stager = Arc::new(MemoryStager::new());
    for i in 1..=6 {
        stager.insert(i.to_string(), StagedFile::new("a.docx", docx("fine")));
    }
    let extractor = Arc::new(SlowExtractor {
        running: AtomicUsize::new(0),
        max_observed: AtomicUsize::new(0),
    });
    let coordinator = BatchCoordinator::new(stager, GradingConfig::default()).with_extractor(extractor.clone());
    let rubric = presets::preset(presets::WORD_BASIC).unwrap();

    let report = coordinator.run(ids(6), &rubric, &options(2)).await;

    assert_eq!(report.summary.success, 6);
    let max = extractor.max_observed.load(Ordering::SeqCst);
    assert!(max <= 2, "observed {max} concurrent extractions, limit is 2");
    assert!(max >= 1);
}

#[tokio::test]
async fn cancelled_batch_reports_every_file_as_failed() {
    let stager = five_documents();
    let coordinator = BatchCoordinator::new(stager.clone(), GradingConfig::default());
    let rubric = presets::preset(presets::WORD_BASIC).unwrap();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = coordinator.run_with_cancel(ids(5), &rubric, &options(1), rx).await;

    assert_eq!(report.summary.failed, 5);
    assert_eq!(report.summary.success + report.summary.failed, report.summary.total);
    let failed: Vec<&str> = report.errors.iter().map(|e| e.file_id.as_str()).collect();
    assert_eq!(failed, vec!["1", "2", "3", "4", "5"]);
    assert!(report
        .errors
        .iter()
        .all(|e| e.error_message == "batch cancelled before processing started"));
    assert!(stager.released().is_empty());
}

#[tokio::test]
async fn mixed_inputs_keep_submission_order() {
    let deck = PptxBuilder::new().slide(SlideSpec::titled("Hello")).build();
    let container = build_zip(&[("submission/deck.pptx", deck.as_slice())]);
    let stager = Arc::new(
        MemoryStager::new()
            .with_file("garbage", StagedFile::new("notes.txt", b"not a document".to_vec()))
            .with_file("zipped", StagedFile::new("upload.zip", container))
            .with_file("missing-bytes", StagedFile::new("empty.docx", Vec::new()))
            .with_file("deck", StagedFile::new("deck.pptx", deck)),
    );
    let store = Arc::new(RecordingStore::default());
    let coordinator = BatchCoordinator::new(stager, GradingConfig::default()).with_store(store.clone());
    let rubric = presets::preset(presets::PRESENTATION_BASIC).unwrap();

    let files = vec!["garbage".into(), "zipped".into(), "missing-bytes".into(), "deck".into(), "ghost".into()];
    let report = coordinator.run(files, &rubric, &options(3)).await;

    let graded: Vec<&str> = report.results.iter().map(|r| r.file.id.as_str()).collect();
    assert_eq!(graded, vec!["zipped", "deck"]);
    assert_eq!(
        report.results[0].file.source_entry.as_deref(),
        Some("submission/deck.pptx")
    );

    let kinds: Vec<(&str, ErrorKind)> = report.errors.iter().map(|e| (e.file_id.as_str(), e.error_kind)).collect();
    assert_eq!(kinds[0], ("garbage", ErrorKind::UnsupportedFormat));
    assert_eq!(kinds[1].0, "missing-bytes");
    assert_eq!(kinds[2], ("ghost", ErrorKind::Staging));
    assert_eq!(report.summary.failed, 3);

    coordinator.flush().await;
    let mut saved = store.saved.lock().unwrap().clone();
    saved.sort();
    assert_eq!(saved, vec!["deck".to_string(), "zipped".to_string()]);
}

#[tokio::test]
#[serial]
async fn stages_from_disk_and_stores_json_results() {
    let _root = setup_test_staging_root();
    let batch = "disk";
    for (index, title) in ["first", "second"].iter().enumerate() {
        let path = paths::staged_file_path(batch, index, "essay.docx");
        paths::ensure_parent_dir(&path).unwrap();
        std::fs::write(&path, docx(title)).unwrap();
    }

    let stager = Arc::new(FsStager::new(paths::batch_dir(batch)).remove_on_release(true));
    let store = Arc::new(JsonFileStore::for_batch(batch));
    let coordinator = BatchCoordinator::new(stager, GradingConfig::default()).with_store(store.clone());
    let rubric = presets::preset(presets::WORD_BASIC).unwrap();

    let ids = vec!["file_0/essay.docx".to_string(), "file_1/essay.docx".to_string()];
    let report = coordinator.run(ids, &rubric, &options(2)).await;
    assert_eq!(report.summary.success, 2);
    assert_eq!(report.results[1].file.name.as_deref(), Some("essay.docx"));

    assert!(!paths::staged_file_path(batch, 0, "essay.docx").exists());
    coordinator.flush().await;
    assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 2);
}

#[test]
#[serial]
fn flushed_results_survive_runtime_shutdown() {
    let _root = setup_test_staging_root();
    let stager = MemoryStager::new();
    for i in 0..20 {
        stager.insert(format!("essay-{i:02}"), StagedFile::new("essay.docx", docx("fine")));
    }
    let ids: Vec<String> = (0..20).map(|i| format!("essay-{i:02}")).collect();
    let store = Arc::new(JsonFileStore::for_batch("shutdown"));
    let dir = store.dir().to_path_buf();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let report = runtime.block_on(async {
        let coordinator = BatchCoordinator::new(Arc::new(stager), GradingConfig::default()).with_store(store);
        let report = coordinator.run(ids, &presets::preset(presets::WORD_BASIC).unwrap(), &options(4)).await;
        coordinator.flush().await;
        report
    });
    drop(runtime);

    assert_eq!(report.summary.success, 20);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 20);
}
