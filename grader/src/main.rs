use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use doc_parser::FileKind;
use grader::collaborators::DEFAULT_RUBRIC_KEY;
use grader::{
    BatchCoordinator, BatchOptions, FsStager, JsonFileStore, NullStore, PresetRubricSupplier,
    ResultStore, RubricSupplier,
};
use marker::detectors::DetectorRegistry;
use marker::rubric::Rubric;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use util::config::AppConfig;
use util::paths;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "grader", version, about = "Grade office documents against a rubric")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade one or more files and print the batch report as JSON
    Grade {
        /// Preset name, custom rubric key, or path to a rubric JSON file
        #[arg(long, default_value = DEFAULT_RUBRIC_KEY)]
        rubric: String,
        /// Treat every file as this kind instead of detecting it
        #[arg(long)]
        kind: Option<FileKind>,
        /// Files graded at once (defaults to the configured concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Only evaluate these criterion ids
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Leave measurement details out of the report
        #[arg(long)]
        no_details: bool,
        /// Write each result as JSON into this directory
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check a rubric file and report problems
    ValidateRubric { path: PathBuf },
    /// Print the features extracted from a file as JSON
    Inspect {
        file: PathBuf,
        #[arg(long)]
        kind: Option<FileKind>,
    },
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("grader=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::global().clone();
    init_tracing(&config.log_level);

    match cli.command {
        Command::Grade {
            rubric,
            kind,
            concurrency,
            only,
            no_details,
            store,
            files,
        } => grade(&config, rubric, kind, concurrency, only, no_details, store, files).await,
        Command::ValidateRubric { path } => validate_rubric(&path),
        Command::Inspect { file, kind } => inspect(&config, &file, kind),
    }
}

#[allow(clippy::too_many_arguments)]
async fn grade(
    config: &AppConfig,
    rubric_key: String,
    kind: Option<FileKind>,
    concurrency: Option<usize>,
    only: Vec<String>,
    no_details: bool,
    store: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let grading_config = config.grading_config().map_err(|e| anyhow!(e))?;
    let rubric = resolve_rubric(&rubric_key, kind.or_else(|| common_kind(&files))).await?;

    // copy inputs into a private staging area so the stager never reads outside it
    let staging_id = Uuid::new_v4().to_string();
    let mut ids = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("file_{index}"));
        let staged = paths::staged_file_path(&staging_id, index, &name);
        paths::ensure_parent_dir(&staged)?;
        fs::copy(file, &staged).with_context(|| format!("cannot read {}", file.display()))?;
        ids.push(format!("file_{index}/{}", paths::sanitize_file_name(&name)));
    }
    let batch_dir = paths::batch_dir(&staging_id);

    let mut options = BatchOptions::from_config(&grading_config);
    options.declared_kind = kind;
    if let Some(n) = concurrency {
        options.concurrency = n.max(1);
    }
    if !only.is_empty() {
        options.grading.only_criteria = Some(only);
    }
    if no_details {
        options.grading.include_details = false;
    }

    let store: Arc<dyn ResultStore> = match store {
        Some(dir) => Arc::new(JsonFileStore::new(dir)),
        None => Arc::new(NullStore),
    };
    let stager = FsStager::new(&batch_dir).remove_on_release(true);
    let coordinator = BatchCoordinator::new(Arc::new(stager), grading_config).with_store(store);

    let report = coordinator.run(ids, &rubric, &options).await;
    coordinator.flush().await;
    paths::remove_dir_if_exists(&batch_dir)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// A single office kind shared by every file name, if there is one.
fn common_kind(files: &[PathBuf]) -> Option<FileKind> {
    let mut kinds = files
        .iter()
        .map(|f| FileKind::from_file_name(&f.to_string_lossy()).filter(FileKind::is_office));
    let first = kinds.next()??;
    kinds.all(|k| k == Some(first)).then_some(first)
}

async fn resolve_rubric(key: &str, kind: Option<FileKind>) -> Result<Rubric> {
    let path = Path::new(key);
    if path.is_file() {
        return Rubric::load(path).with_context(|| format!("loading rubric {}", path.display()));
    }
    let supplier = PresetRubricSupplier::from_config();
    supplier.rubric(kind, key).await.map_err(|e| {
        if key == DEFAULT_RUBRIC_KEY && kind.is_none() {
            anyhow!("{e}; pass --kind or --rubric")
        } else {
            anyhow!(e)
        }
    })
}

fn validate_rubric(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let rubric = Rubric::from_json_str(&text)?;
    let warnings = rubric.validate()?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    let registry = DetectorRegistry::with_builtin();
    let unknown: Vec<&str> = rubric
        .criteria
        .iter()
        .map(|c| c.detector_key.as_str())
        .filter(|key| registry.get(key).is_none())
        .collect();
    for key in &unknown {
        eprintln!("warning: detector '{key}' is not built in and will grade as an error");
    }

    info!(rubric = %rubric.title, "rubric validated");
    println!(
        "ok: '{}' with {} criteria worth {} points ({} warnings)",
        rubric.title,
        rubric.criteria.len(),
        rubric.computed_total(),
        warnings.len() + unknown.len()
    );
    Ok(())
}

fn inspect(config: &AppConfig, file: &Path, kind: Option<FileKind>) -> Result<()> {
    let grading_config = config.grading_config().map_err(|e| anyhow!(e))?;
    let bytes = fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let declared = kind.or_else(|| FileKind::from_file_name(&file.to_string_lossy()));

    let doc = doc_parser::load(&bytes, declared, &grading_config)?;
    let features = doc_parser::extract_features(&doc, &grading_config.parsing)?;
    if features.truncated() {
        warn!(file = %file.display(), "processing limits were hit; features are incomplete");
    }
    println!("{}", serde_json::to_string_pretty(&features)?);
    Ok(())
}
