//! # Grader
//!
//! Batch orchestration for document grading: each submitted file goes
//! through load, feature extraction and rubric evaluation on a bounded
//! worker pool, and the batch reports results and failures in submission
//! order.

pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod pipeline;

pub use collaborators::{
    FileStager, FsStager, JsonFileStore, MemoryStager, NullStore, PresetRubricSupplier,
    ResultStore, RubricSupplier, StagedFile,
};
pub use coordinator::{BatchCoordinator, BatchOptions, BatchReport, BatchSummary, FileError};
pub use error::GradingError;
pub use pipeline::{DocumentExtractor, FeatureExtractor, FileState};
