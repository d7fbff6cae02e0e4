use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::IngestSettings;
use crate::extract::{find_first_tool_result, first_user_text};
use crate::loader::{BatchOutcome, LoaderConfig, LoaderStats, TransactionalLoader, encode_record};
use crate::markup::parse_markup_bytes;
use crate::normalize::normalize_conversation;
use crate::report::{
    FileFailure, KeySource, RunSummary, StoredFile, ToolResultPreview, display_file_name,
};
use crate::store::{ConversationStore, RunStatus, RunTotals, StagedRecord};
use crate::utils::content::{DEFAULT_EXCERPT_MAX_CHARS, derive_excerpt, preview_lines};
use crate::utils::time::now_utc_rfc3339;

pub const INGEST_REPORT_SCHEMA_VERSION: &str = "parley.ingest-report.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub source_dir: PathBuf,
    pub store_path: PathBuf,
    pub settings: IngestSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRunReport {
    pub schema_version: String,
    pub ingest_run_id: String,
    pub source_dir: String,
    pub store_path: String,
    pub status: RunStatus,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub duration_ms: u64,
    pub no_files_found: bool,
    pub records_stored: usize,
    pub files_failed: usize,
    pub failure_counts: BTreeMap<String, usize>,
    pub loader: LoaderStats,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PreparedFile {
    record: StagedRecord,
    stored: StoredFile,
}

/// Regular files in `dir` whose final extension is exactly `extension`,
/// sorted by file name. Later files win when two share a key.
///
/// The match is case-sensitive: every discovered file carries the same
/// suffix, so two distinct file names always have distinct stems.
pub fn discover_conversation_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read source directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read source directory entry: {}", dir.display()))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|value| value.to_str())
            .is_some_and(|value| value == extension);
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(files)
}

/// Uses the conversation id when present, otherwise the file stem.
#[must_use]
pub fn derive_record_key(id: Option<&str>, path: &Path) -> (String, KeySource) {
    if let Some(id) = id {
        return (id.to_string(), KeySource::Id);
    }
    let stem = path
        .file_stem()
        .or_else(|| path.file_name())
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    (stem, KeySource::FileStem)
}

pub fn run_ingest(plan: &IngestPlan) -> Result<IngestRunReport> {
    let started_at_utc = now_utc_rfc3339()?;
    let started_at = std::time::Instant::now();
    let ingest_run_id = build_ingest_run_id();
    let source_dir = plan.source_dir.to_string_lossy().to_string();

    let files = discover_conversation_files(&plan.source_dir, &plan.settings.extension)?;

    let mut store = ConversationStore::open(&plan.store_path)
        .context("failed to open conversation store for ingest")?;
    store.begin_run(&ingest_run_id, &started_at_utc, &source_dir)?;

    let mut summary = RunSummary::default();
    let mut pending = VecDeque::new();
    let mut loader = TransactionalLoader::new(
        &mut store,
        &ingest_run_id,
        LoaderConfig {
            batch_size: plan.settings.batch_size,
        },
    );

    for path in &files {
        summary.record_seen();
        match prepare_file(path, &plan.settings) {
            Ok(prepared) => {
                pending.push_back(prepared.stored);
                if let Some(outcome) = loader.stage(prepared.record) {
                    settle_batch(outcome, &mut pending, &mut summary);
                }
            }
            Err(failure) => summary.record_failure(failure),
        }
    }

    let (last_batch, loader_stats) = loader.finish();
    if let Some(outcome) = last_batch {
        settle_batch(outcome, &mut pending, &mut summary);
    }

    let status = run_status(&summary);
    let failure_counts = summary.failure_counts();
    let finished_at_utc = now_utc_rfc3339()?;
    store.finish_run(
        &ingest_run_id,
        status,
        &finished_at_utc,
        &RunTotals {
            files_seen: summary.files_seen,
            records_stored: summary.records_stored(),
            files_failed: summary.files_failed(),
            failure_counts_json: serde_json::to_string(&failure_counts)
                .context("failed to encode failure counts")?,
        },
    )?;
    store.close()?;

    Ok(IngestRunReport {
        schema_version: INGEST_REPORT_SCHEMA_VERSION.to_string(),
        ingest_run_id,
        source_dir,
        store_path: plan.store_path.to_string_lossy().to_string(),
        status,
        started_at_utc,
        finished_at_utc,
        duration_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        no_files_found: files.is_empty(),
        records_stored: summary.records_stored(),
        files_failed: summary.files_failed(),
        failure_counts: failure_counts
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect(),
        loader: loader_stats,
        summary,
    })
}

fn prepare_file(path: &Path, settings: &IngestSettings) -> Result<PreparedFile, FileFailure> {
    let file_name = display_file_name(path);
    let bytes = std::fs::read(path).map_err(|error| FileFailure::unreadable(path, &error))?;
    let value =
        parse_markup_bytes(&bytes, &file_name).map_err(|error| FileFailure::parse(path, &error))?;

    let normalized = normalize_conversation(&value);
    let conversation = &normalized.conversation;
    let (key, key_source) = derive_record_key(conversation.id.as_deref(), path);
    let record = encode_record(&key, &value, path)?;

    let tool_result = find_first_tool_result(conversation).map(|found| ToolResultPreview {
        message_index: found.message_index,
        item_index: found.item_index,
        shape: found.result.shape().to_string(),
        lines: found
            .content()
            .map(|content| {
                preview_lines(content, settings.preview_lines)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    });

    Ok(PreparedFile {
        record,
        stored: StoredFile {
            file_name,
            path: path.to_string_lossy().to_string(),
            key,
            key_source,
            anomalies: normalized.anomalies.iter().map(ToString::to_string).collect(),
            first_user_text: first_user_text(conversation)
                .and_then(|text| derive_excerpt(text, DEFAULT_EXCERPT_MAX_CHARS)),
            tool_result,
        },
    })
}

fn settle_batch(
    outcome: BatchOutcome,
    pending: &mut VecDeque<StoredFile>,
    summary: &mut RunSummary,
) {
    let settled_len = outcome.records.len().min(pending.len());
    let settled = pending.drain(..settled_len).collect::<Vec<_>>();
    if outcome.committed() {
        for stored in settled {
            summary.record_stored(stored);
        }
    } else {
        for failure in outcome.failures() {
            summary.record_failure(failure);
        }
    }
}

fn run_status(summary: &RunSummary) -> RunStatus {
    if !summary.has_failures() {
        RunStatus::Success
    } else if summary.records_stored() == 0 {
        RunStatus::Failed
    } else {
        RunStatus::PartialFailure
    }
}

fn build_ingest_run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| {
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
        });
    format!("ingest-{nanos:016x}")
}

pub fn write_ingest_report_artifact(path: &Path, report: &IngestRunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create ingest report artifact directory: {}",
                parent.display()
            )
        })?;
    }
    let encoded =
        serde_json::to_vec_pretty(report).context("failed to encode ingest report artifact")?;
    std::fs::write(path, encoded)
        .with_context(|| format!("failed to write ingest report artifact: {}", path.display()))
}
