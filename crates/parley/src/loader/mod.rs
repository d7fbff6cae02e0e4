//! Staging and batched commits into the [`ConversationStore`].
//!
//! Records are encoded before they are staged, so an encoding failure only
//! costs its own file. A batch is all or nothing: when its transaction fails
//! every file in it is reported as a store error and later batches still run.

use std::path::Path;

use serde::Serialize;

use crate::models::GenericValue;
use crate::report::{FailureKind, FileFailure};
use crate::store::{ConversationStore, StagedRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderConfig {
    /// `None` commits everything in one transaction when the loader finishes.
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub records_committed: usize,
}

/// Result of one flushed batch. `records` keeps staging order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub records: Vec<StagedRecord>,
    pub error: Option<String>,
}

impl BatchOutcome {
    #[must_use]
    pub fn committed(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<FileFailure> {
        let Some(error) = &self.error else {
            return Vec::new();
        };
        self.records
            .iter()
            .map(|record| {
                FileFailure::new(
                    Path::new(&record.source_path),
                    FailureKind::Store,
                    format!("batch rolled back: {error}"),
                )
            })
            .collect()
    }
}

/// Canonically encodes `value` and pairs it with its key. The encoding is
/// decoded again before staging, so nothing that cannot be read back is ever
/// written.
pub fn encode_record(
    key: &str,
    value: &GenericValue,
    source_path: &Path,
) -> Result<StagedRecord, FileFailure> {
    let serialization_failure =
        |detail: String| FileFailure::new(source_path, FailureKind::Serialization, detail);

    let encoded = value
        .to_canonical_bytes()
        .map_err(|error| serialization_failure(format!("{error:#}")))?;
    let decoded = GenericValue::from_canonical_bytes(&encoded)
        .map_err(|error| serialization_failure(format!("{error:#}")))?;
    let expected = value
        .canonicalized()
        .map_err(|error| serialization_failure(format!("{error:#}")))?;
    if decoded != expected {
        return Err(serialization_failure(
            "encoded record does not decode back to the parsed value".to_string(),
        ));
    }

    Ok(StagedRecord {
        key: key.to_string(),
        value: encoded,
        source_path: source_path.to_string_lossy().to_string(),
    })
}

pub struct TransactionalLoader<'store> {
    store: &'store mut ConversationStore,
    ingest_run_id: String,
    batch_size: Option<usize>,
    staged: Vec<StagedRecord>,
    stats: LoaderStats,
}

impl<'store> TransactionalLoader<'store> {
    pub fn new(
        store: &'store mut ConversationStore,
        ingest_run_id: &str,
        config: LoaderConfig,
    ) -> Self {
        Self {
            store,
            ingest_run_id: ingest_run_id.to_string(),
            batch_size: config.batch_size.map(|size| size.max(1)),
            staged: Vec::new(),
            stats: LoaderStats::default(),
        }
    }

    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Stages one record and flushes when the batch is full.
    pub fn stage(&mut self, record: StagedRecord) -> Option<BatchOutcome> {
        self.staged.push(record);
        match self.batch_size {
            Some(size) if self.staged.len() >= size => self.flush(),
            _ => None,
        }
    }

    /// Commits whatever is staged. `None` when nothing was pending.
    pub fn flush(&mut self) -> Option<BatchOutcome> {
        if self.staged.is_empty() {
            return None;
        }

        let records = std::mem::take(&mut self.staged);
        let error = match self.store.put_batch(&self.ingest_run_id, &records) {
            Ok(written) => {
                self.stats.batches_committed += 1;
                self.stats.records_committed += written;
                None
            }
            Err(error) => {
                self.stats.batches_failed += 1;
                Some(format!("{error:#}"))
            }
        };
        Some(BatchOutcome { records, error })
    }

    pub fn finish(mut self) -> (Option<BatchOutcome>, LoaderStats) {
        let outcome = self.flush();
        (outcome, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::{LoaderConfig, TransactionalLoader, encode_record};
    use crate::models::{GenericValue, Number};
    use crate::report::FailureKind;
    use crate::store::ConversationStore;

    fn record(key: &str) -> crate::store::StagedRecord {
        let value = GenericValue::Mapping(BTreeMap::from([(
            "id".to_string(),
            GenericValue::String(key.to_string()),
        )]));
        encode_record(key, &value, Path::new(&format!("/data/{key}.yaml")))
            .expect("mapping should encode")
    }

    #[test]
    fn batch_size_flushes_on_boundaries() {
        let mut store = ConversationStore::open_in_memory().expect("store should open");
        let mut loader = TransactionalLoader::new(
            &mut store,
            "run-test",
            LoaderConfig {
                batch_size: Some(2),
            },
        );

        assert!(loader.stage(record("a")).is_none());
        let flushed = loader.stage(record("b")).expect("second record fills the batch");
        assert!(flushed.committed());
        assert_eq!(flushed.records.len(), 2);
        assert!(loader.stage(record("c")).is_none());

        let (last, stats) = loader.finish();
        assert_eq!(last.expect("remainder should flush").records.len(), 1);
        assert_eq!(stats.batches_committed, 2);
        assert_eq!(stats.records_committed, 3);
        assert_eq!(store.count().expect("count should succeed"), 3);
    }

    #[test]
    fn unbatched_loader_commits_once_at_finish() {
        let mut store = ConversationStore::open_in_memory().expect("store should open");
        let mut loader = TransactionalLoader::new(&mut store, "run-test", LoaderConfig::default());

        for key in ["a", "b", "c"] {
            assert!(loader.stage(record(key)).is_none());
        }
        assert_eq!(loader.staged_len(), 3);

        let (outcome, stats) = loader.finish();
        assert!(outcome.expect("finish should flush").committed());
        assert_eq!(stats.batches_committed, 1);
    }

    #[test]
    fn finish_without_records_is_a_no_op() {
        let mut store = ConversationStore::open_in_memory().expect("store should open");
        let loader = TransactionalLoader::new(&mut store, "run-test", LoaderConfig::default());

        let (outcome, stats) = loader.finish();
        assert!(outcome.is_none());
        assert_eq!(stats.batches_committed, 0);
    }

    #[test]
    fn non_finite_floats_fail_to_encode() {
        let value = GenericValue::Number(Number::Float(f64::INFINITY));
        let failure = encode_record("k", &value, Path::new("/data/k.yaml"))
            .expect_err("infinity has no canonical form");

        assert_eq!(failure.kind, FailureKind::Serialization);
        assert_eq!(failure.file_name, "k.yaml");
    }

    #[test]
    fn nesting_past_the_decoder_limit_fails_to_encode() {
        let mut value = GenericValue::Null;
        for _ in 0..200 {
            value = GenericValue::Sequence(vec![value]);
        }
        let failure = encode_record("deep", &value, Path::new("/data/deep.yaml"))
            .expect_err("the stored form would not decode");

        assert_eq!(failure.kind, FailureKind::Serialization);
        assert!(failure.detail.contains("decode"), "{}", failure.detail);
    }
}
