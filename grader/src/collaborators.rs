//! Boundaries to the outside world: where source bytes come from, where
//! rubrics come from, and where results go.
//!
//! The coordinator only talks to these traits. The default implementations
//! here are enough for the CLI and for tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use doc_parser::FileKind;
use marker::presets;
use marker::report::GradeResult;
use marker::rubric::Rubric;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GradingError;

/// Bytes of one submitted file.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedFile {
    /// Original file name, when known.
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: Some(name.into()),
            bytes,
        }
    }
}

/// Supplies raw bytes for opaque file identifiers.
///
/// Bytes must stay available until [`FileStager::release`] is called for the
/// same id; the coordinator calls it exactly once per fetched id.
#[async_trait]
pub trait FileStager: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<StagedFile, GradingError>;
    async fn release(&self, file_id: &str);
}

/// Returns a validated rubric for a document kind and a selection key.
#[async_trait]
pub trait RubricSupplier: Send + Sync {
    /// `kind` is `None` when the caller does not know the document kind yet.
    async fn rubric(&self, kind: Option<FileKind>, key: &str) -> Result<Rubric, GradingError>;
}

/// Durably stores a result and returns its generated id.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, result: &GradeResult) -> Result<String, GradingError>;
}

// ─── Staging ────────────────────────────────────────────────────────

/// Reads files below a staging root. Ids are paths relative to the root.
#[derive(Debug, Clone)]
pub struct FsStager {
    root: PathBuf,
    remove_on_release: bool,
}

impl FsStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remove_on_release: false,
        }
    }

    /// A stager over the configured `STAGING_ROOT`.
    pub fn from_config() -> Self {
        Self::new(util::paths::staging_root())
    }

    /// Delete each staged file once it has been graded.
    pub fn remove_on_release(mut self, remove: bool) -> Self {
        self.remove_on_release = remove;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `file_id` below the root, refusing ids that could escape it.
    pub fn resolve(&self, file_id: &str) -> Result<PathBuf, GradingError> {
        let rel = Path::new(file_id);
        let safe = !file_id.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(GradingError::Staging(format!(
                "file id '{file_id}' escapes the staging root"
            )));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl FileStager for FsStager {
    async fn fetch(&self, file_id: &str) -> Result<StagedFile, GradingError> {
        let path = self.resolve(file_id)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| GradingError::Staging(format!("{}: {e}", path.display())))?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(StagedFile { name, bytes })
    }

    async fn release(&self, file_id: &str) {
        if !self.remove_on_release {
            return;
        }
        let Ok(path) = self.resolve(file_id) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file_id, error = %e, "failed to remove staged file");
            }
        }
    }
}

/// In-memory stager. Records every release so callers can check cleanup.
#[derive(Debug, Default)]
pub struct MemoryStager {
    files: Mutex<HashMap<String, StagedFile>>,
    released: Mutex<Vec<String>>,
}

impl MemoryStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: impl Into<String>, file: StagedFile) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(file_id.into(), file);
        }
    }

    pub fn with_file(self, file_id: impl Into<String>, file: StagedFile) -> Self {
        self.insert(file_id, file);
        self
    }

    /// Ids released so far, in release order.
    pub fn released(&self) -> Vec<String> {
        self.released.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FileStager for MemoryStager {
    async fn fetch(&self, file_id: &str) -> Result<StagedFile, GradingError> {
        let files = self
            .files
            .lock()
            .map_err(|_| GradingError::Internal("stager lock poisoned".into()))?;
        files
            .get(file_id)
            .cloned()
            .ok_or_else(|| GradingError::Staging(format!("no staged file '{file_id}'")))
    }

    async fn release(&self, file_id: &str) {
        if let Ok(mut released) = self.released.lock() {
            released.push(file_id.to_string());
        }
    }
}

// ─── Rubrics ────────────────────────────────────────────────────────

/// Built-in presets, plus `<key>.json` files from an optional directory.
///
/// The key `default` selects the built-in preset for the document kind.
#[derive(Debug, Clone, Default)]
pub struct PresetRubricSupplier {
    preset_dir: Option<PathBuf>,
}

pub const DEFAULT_RUBRIC_KEY: &str = "default";

impl PresetRubricSupplier {
    pub fn new(preset_dir: Option<PathBuf>) -> Self {
        Self { preset_dir }
    }

    /// Uses `RUBRIC_PRESET_DIR` from the application config.
    pub fn from_config() -> Self {
        let dir = util::config::AppConfig::global().rubric_preset_dir.clone();
        Self::new(dir.map(PathBuf::from))
    }

    fn custom_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.preset_dir.as_ref()?;
        let simple = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        simple.then(|| dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl RubricSupplier for PresetRubricSupplier {
    async fn rubric(&self, kind: Option<FileKind>, key: &str) -> Result<Rubric, GradingError> {
        let key = if key == DEFAULT_RUBRIC_KEY {
            kind.and_then(presets::default_for).ok_or_else(|| {
                GradingError::Validation("no default rubric without a document kind".into())
            })?
        } else {
            key
        };

        let rubric = if presets::names().any(|n| n == key) {
            presets::preset(key)?
        } else {
            let path = self
                .custom_path(key)
                .filter(|p| p.is_file())
                .ok_or_else(|| GradingError::Validation(format!("unknown rubric '{key}'")))?;
            debug!(rubric = key, path = %path.display(), "loading custom rubric");
            tokio::task::spawn_blocking(move || Rubric::load(path))
                .await
                .map_err(|e| GradingError::Internal(e.to_string()))??
        };

        match (kind, rubric.document_kind) {
            (Some(want), Some(made_for)) if want != made_for => Err(GradingError::Validation(format!(
                "rubric '{key}' is for {made_for} documents, not {want}"
            ))),
            _ => Ok(rubric),
        }
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// Writes each result as `<uuid>.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stores results under the staging results directory for a batch.
    pub fn for_batch(batch_id: &str) -> Self {
        Self::new(util::paths::results_dir(batch_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save(&self, result: &GradeResult) -> Result<String, GradingError> {
        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_vec_pretty(result)
            .map_err(|e| GradingError::Internal(format!("serialize result: {e}")))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(format!("{id}.json")), json).await?;
        Ok(id)
    }
}

/// Discards results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl ResultStore for NullStore {
    async fn save(&self, _result: &GradeResult) -> Result<String, GradingError> {
        Ok(Uuid::new_v4().to_string())
    }
}
