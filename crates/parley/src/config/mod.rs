use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

use crate::utils::content::DEFAULT_PREVIEW_LINES;

pub const DEFAULT_CONVERSATION_EXTENSION: &str = "yaml";
pub const DEFAULT_STORE_FILE_NAME: &str = "conversations.sqlite";
pub const INGEST_REPORT_FILE_NAME: &str = "ingest-report.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
}

impl RuntimePaths {
    #[must_use]
    pub fn default_store_path(&self) -> PathBuf {
        self.out_dir.join(DEFAULT_STORE_FILE_NAME)
    }

    #[must_use]
    pub fn ingest_report_path(&self) -> PathBuf {
        self.out_dir.join("ingest").join(INGEST_REPORT_FILE_NAME)
    }

    /// Resolves a user-supplied path the same way `--out-dir` is resolved.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_user_path(path, &self.home_dir, &self.cwd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Matched exactly (case included), without the leading dot.
    pub extension: String,
    /// `None` commits the whole run in one transaction.
    pub batch_size: Option<usize>,
    pub preview_lines: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            extension: DEFAULT_CONVERSATION_EXTENSION.to_string(),
            batch_size: None,
            preview_lines: DEFAULT_PREVIEW_LINES,
        }
    }
}

impl IngestSettings {
    pub fn new(
        extension: Option<&str>,
        batch_size: Option<usize>,
        preview_lines: Option<usize>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let extension = match extension {
            Some(raw) => {
                let trimmed = raw.trim().trim_start_matches('.');
                if trimmed.is_empty() {
                    bail!("extension must not be empty");
                }
                trimmed.to_string()
            }
            None => defaults.extension,
        };
        if batch_size == Some(0) {
            bail!("batch size must be at least 1");
        }

        Ok(Self {
            extension,
            batch_size,
            preview_lines: preview_lines.unwrap_or(defaults.preview_lines),
        })
    }
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    out_dir_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let out_dir = match out_dir_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => home_dir.join(".parley").join("output"),
    };

    Ok(RuntimePaths {
        home_dir,
        cwd,
        out_dir: normalize_lexical(&out_dir),
    })
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
