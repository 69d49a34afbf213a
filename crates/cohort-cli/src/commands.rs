//! Command implementations. Printing is left to the caller.

use std::fs::File;
use std::io::{BufWriter, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, info_span, warn};

use cohort_core::{EngineConfig, SubmissionService, TracingAuditSink, load_definitions};
use cohort_ingest::{Loader, RawUpload};
use cohort_model::{DefinitionSet, FileValidationReport, Submission, SubmissionKey, TaskState};
use cohort_validate::ValidationEngine;

use crate::cli::{CheckArgs, EngineArgs, FileArg, SubmitArgs};
use crate::logging::{redact_value, redact_values};

/// Configuration with CLI overrides applied, plus the definitions.
pub fn load_engine(args: &EngineArgs) -> Result<(EngineConfig, DefinitionSet)> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.spill_dir {
        config.ingest.spill_dir = Some(dir.clone());
    }
    if let Some(columns) = args.max_parallel_columns {
        config.validation.max_parallel_columns = columns;
    }
    config.validate().context("invalid configuration")?;

    let definitions = load_definitions(&args.definitions)
        .with_context(|| format!("load definitions {}", args.definitions.display()))?;
    if definitions.is_empty() {
        return Err(anyhow!(
            "no definitions found in {}",
            args.definitions.display()
        ));
    }
    Ok((config, definitions))
}

pub fn run_definitions(args: &EngineArgs) -> Result<DefinitionSet> {
    let (_, definitions) = load_engine(args)?;
    Ok(definitions)
}

/// Load and validate a single file.
pub fn run_check(args: &CheckArgs) -> Result<FileValidationReport> {
    let (config, definitions) = load_engine(&args.engine)?;
    let definition = definitions
        .get(&args.file_type)
        .ok_or_else(|| anyhow!("no definition for file type '{}'", args.file_type))?;

    let span = info_span!("check", file_type = %args.file_type);
    let _guard = span.enter();
    let start = Instant::now();

    let upload = RawUpload::from_path(&args.file, args.encoding.as_str())
        .with_context(|| format!("read {}", args.file.display()))?;
    let loaded = Loader::new(config.ingest.clone())
        .load(&upload, definition)
        .with_context(|| format!("load {}", args.file.display()))?;
    let engine = ValidationEngine::new(config.validation.clone()).context("start validation")?;
    let report = engine
        .report(&loaded, definition)
        .with_context(|| format!("validate {}", args.file.display()))?;

    for result in report.invalid_results() {
        if let Some(top) = result.invalid_catalog.first() {
            debug!(
                column = %result.column,
                validator = %result.validator,
                value = top.value.as_deref().map_or("null", redact_value),
                count = top.count,
                "most frequent invalid value"
            );
        }
    }
    info!(
        rows = report.row_count,
        strategy = %report.strategy,
        valid = report.is_valid(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "check finished"
    );
    Ok(report)
}

/// Run a full submission in-process and return its final state.
pub async fn run_submit(args: &SubmitArgs) -> Result<Submission> {
    let (config, definitions) = load_engine(&args.engine)?;
    let patient_type = config.submission.patient_file_type.clone();
    let service = SubmissionService::new(config, definitions, Arc::new(TracingAuditSink))
        .context("start submission service")?;
    let key = SubmissionKey::new(args.cohort.as_str(), args.period.as_str())?;

    let spinner = spinner();
    let mut receipts = Vec::with_capacity(args.files.len());
    for file in upload_order(&args.files, &patient_type) {
        spinner.set_message(format!("uploading {}", file.file_type));
        let upload = RawUpload::from_path(&file.path, args.encoding.as_str())
            .with_context(|| format!("read {}", file.path.display()))?;
        let receipt = service
            .upload(&key, &file.file_type, upload, &args.actor)
            .await
            .with_context(|| format!("upload {} ({})", file.file_type, file.path.display()))?;
        debug!(file_type = %file.file_type, file_id = %receipt.file_id, "queued");
        receipts.push((file, receipt));
    }

    for (file, receipt) in &receipts {
        spinner.set_message(format!("validating {} v{}", file.file_type, receipt.version));
        let state = service.wait_for_task(receipt.task_id).await?;
        if state == TaskState::Failed {
            warn!(file_type = %file.file_type, path = %file.path.display(), "load failed");
        }
    }

    if args.acknowledge {
        spinner.set_message("acknowledging");
        for file in service.pending_acknowledgment(&key).await? {
            service
                .acknowledge(file.id, &args.actor, args.comment.clone())
                .await
                .with_context(|| format!("acknowledge {} v{}", file.file_type, file.version))?;
        }
    }
    spinner.finish_and_clear();

    let submission = service
        .submission(&key)
        .await
        .ok_or_else(|| anyhow!("submission {key} was not created"))?;
    for file in &submission.files {
        let Some(report) = &file.report else {
            continue;
        };
        for warning in &report.warnings {
            debug!(
                file_type = %file.file_type,
                unknown = %redact_values(&warning.sample),
                "unknown identifier sample"
            );
        }
    }
    if let Some(path) = &args.report {
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &submission)
            .with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "wrote submission report");
    }
    Ok(submission)
}

/// Patient file first, then the rest in the given order.
pub fn upload_order<'a>(files: &'a [FileArg], patient_type: &str) -> Vec<&'a FileArg> {
    let (mut ordered, rest): (Vec<&FileArg>, Vec<&FileArg>) = files
        .iter()
        .partition(|file| file.file_type == patient_type);
    ordered.extend(rest);
    ordered
}

/// Whether any file of the submission holds invalid values.
pub fn has_invalid_values(submission: &Submission) -> bool {
    submission
        .effective_files()
        .iter()
        .filter_map(|file| file.report.as_ref())
        .any(|report| !report.is_valid())
}

pub fn has_failed_loads(submission: &Submission) -> bool {
    submission
        .files
        .iter()
        .any(|file| file.state == TaskState::Failed)
}

fn spinner() -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
