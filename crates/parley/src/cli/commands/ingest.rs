use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{IngestSettings, RuntimePaths};
use crate::ingest::{IngestPlan, run_ingest, write_ingest_report_artifact};
use crate::report::{render_file_outcome, render_summary};

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Directory holding the conversation files. Defaults to the working directory.
    #[arg(long, value_name = "PATH")]
    pub source_dir: Option<PathBuf>,

    /// Store file. Defaults to `<out_dir>/conversations.sqlite`.
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// File extension to ingest, matched case-sensitively. Defaults to `yaml`.
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Commit every N records instead of once per run.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    #[arg(long, value_name = "N")]
    pub preview_lines: Option<usize>,

    /// Exit with status 2 when any file failed.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestCommandFailure {
    pub files_failed: usize,
    pub first_failure: Option<String>,
}

impl std::fmt::Display for IngestCommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ingest finished with {} failed file(s).", self.files_failed)?;
        if let Some(failure) = &self.first_failure {
            write!(f, " first: {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IngestCommandFailure {}

pub fn run(args: &IngestArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let source_dir = match &args.source_dir {
        Some(path) => runtime_paths.resolve(path)?,
        None => runtime_paths.cwd.clone(),
    };
    let store_path = match &args.store {
        Some(path) => runtime_paths.resolve(path)?,
        None => runtime_paths.default_store_path(),
    };
    let settings = IngestSettings::new(
        args.extension.as_deref(),
        args.batch_size,
        args.preview_lines,
    )?;
    let batch_mode = settings
        .batch_size
        .map_or_else(|| "per_run".to_string(), |size| size.to_string());
    println!(
        "ingest: start source_dir={} store={} extension={} batch_size={}",
        source_dir.display(),
        store_path.display(),
        settings.extension,
        batch_mode
    );

    let plan = IngestPlan {
        source_dir,
        store_path,
        settings,
    };
    let report = run_ingest(&plan)?;

    for outcome in &report.summary.outcomes {
        for line in render_file_outcome(outcome) {
            println!("{line}");
        }
    }
    for line in render_summary(&report.summary) {
        println!("{line}");
    }

    let artifact_path = runtime_paths.ingest_report_path();
    println!("ingest: stage write_report");
    write_ingest_report_artifact(&artifact_path, &report)?;
    println!(
        "ingest: report status={} run_id={} report={}",
        report.status.as_str(),
        report.ingest_run_id,
        artifact_path.display()
    );

    if args.strict && report.summary.has_failures() {
        return Err(IngestCommandFailure {
            files_failed: report.files_failed,
            first_failure: report
                .summary
                .failures()
                .next()
                .map(|failure| format!("{} ({})", failure.file_name, failure.kind.as_str())),
        }
        .into());
    }

    Ok(())
}
