use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::markup::{ParseError, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureKind {
    #[serde(rename = "not_found")]
    NotFound,
    #[serde(rename = "parse_error")]
    Parse,
    #[serde(rename = "serialization_error")]
    Serialization,
    #[serde(rename = "store_error")]
    Store,
}

impl FailureKind {
    pub const ALL: [Self; 4] = [
        Self::NotFound,
        Self::Parse,
        Self::Serialization,
        Self::Store,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Parse => "parse_error",
            Self::Serialization => "serialization_error",
            Self::Store => "store_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub path: String,
    pub kind: FailureKind,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl FileFailure {
    pub fn new(path: &Path, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            file_name: display_file_name(path),
            path: path.to_string_lossy().to_string(),
            kind,
            detail: detail.into(),
            position: None,
        }
    }

    /// Any read failure counts as not found; the io error is kept as detail.
    pub fn unreadable(path: &Path, error: &std::io::Error) -> Self {
        let detail = if error.kind() == std::io::ErrorKind::NotFound {
            format!("file not found: {error}")
        } else {
            format!("file could not be read: {error}")
        };
        Self::new(path, FailureKind::NotFound, detail)
    }

    pub fn parse(path: &Path, error: &ParseError) -> Self {
        Self {
            position: error.position,
            ..Self::new(
                path,
                FailureKind::Parse,
                format!("{} error: {}", error.kind.as_str(), error.message),
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Id,
    FileStem,
}

impl KeySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FileStem => "file_stem",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResultPreview {
    pub message_index: usize,
    pub item_index: usize,
    pub shape: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub file_name: String,
    pub path: String,
    pub key: String,
    pub key_source: KeySource,
    pub anomalies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_user_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultPreview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Stored(StoredFile),
    Failed(FileFailure),
}

/// Per-run accumulator, outcomes in the order they were settled. Recording a
/// failure never stops the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_seen: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl RunSummary {
    pub fn record_seen(&mut self) {
        self.files_seen += 1;
    }

    pub fn record_stored(&mut self, stored: StoredFile) {
        self.outcomes.push(FileOutcome::Stored(stored));
    }

    pub fn record_failure(&mut self, failure: FileFailure) {
        self.outcomes.push(FileOutcome::Failed(failure));
    }

    pub fn stored(&self) -> impl Iterator<Item = &StoredFile> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Stored(stored) => Some(stored),
            FileOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            FileOutcome::Failed(failure) => Some(failure),
            FileOutcome::Stored(_) => None,
        })
    }

    #[must_use]
    pub fn records_stored(&self) -> usize {
        self.stored().count()
    }

    #[must_use]
    pub fn files_failed(&self) -> usize {
        self.failures().count()
    }

    #[must_use]
    pub fn anomalies_total(&self) -> usize {
        self.stored().map(|stored| stored.anomalies.len()).sum()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Counts keyed by failure kind, every kind present even when zero.
    #[must_use]
    pub fn failure_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> = FailureKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), 0))
            .collect();
        for failure in self.failures() {
            *counts.entry(failure.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn is_empty_run(&self) -> bool {
        self.files_seen == 0
    }
}

#[must_use]
pub fn render_file_outcome(outcome: &FileOutcome) -> Vec<String> {
    match outcome {
        FileOutcome::Stored(stored) => render_stored(stored),
        FileOutcome::Failed(failure) => vec![render_failure(failure)],
    }
}

fn render_stored(stored: &StoredFile) -> Vec<String> {
    let mut lines = vec![format!(
        "ingest: file={} outcome=stored key={} key_source={} anomalies={}",
        stored.file_name,
        stored.key,
        stored.key_source.as_str(),
        stored.anomalies.len()
    )];
    for anomaly in &stored.anomalies {
        lines.push(format!("  anomaly: {anomaly}"));
    }
    if let Some(text) = &stored.first_user_text {
        lines.push(format!("  first_user_text: {text}"));
    }
    match &stored.tool_result {
        Some(preview) if preview.lines.is_empty() => lines.push(format!(
            "  tool_result: message={} item={} shape={} content=none",
            preview.message_index, preview.item_index, preview.shape
        )),
        Some(preview) => {
            lines.push(format!(
                "  tool_result: message={} item={} shape={}",
                preview.message_index, preview.item_index, preview.shape
            ));
            for line in &preview.lines {
                lines.push(format!("  | {line}"));
            }
        }
        None => lines.push("  tool_result: none".to_string()),
    }
    lines
}

fn render_failure(failure: &FileFailure) -> String {
    let position = failure
        .position
        .map(|position| format!(" position=\"{position}\""))
        .unwrap_or_default();
    format!(
        "ingest: file={} outcome={}{} detail={}",
        failure.file_name,
        failure.kind.as_str(),
        position,
        failure.detail
    )
}

#[must_use]
pub fn render_summary(summary: &RunSummary) -> Vec<String> {
    if summary.is_empty_run() {
        return vec!["ingest: no files found; nothing stored".to_string()];
    }

    let counts = summary
        .failure_counts()
        .into_iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    vec![format!(
        "ingest: summary files_seen={} stored={} failed={} anomalies={} {counts}",
        summary.files_seen,
        summary.records_stored(),
        summary.files_failed(),
        summary.anomalies_total(),
    )]
}

#[must_use]
pub fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy())
        .to_string()
}
