//! Results from earlier runs
//!
//! The ledger is read once at startup from the output path of the run and
//! decides which tasks can be skipped because a result for their id already
//! exists.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::record::ResultRecord;
use crate::task::TaskRecord;

/// Errors loading the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Cannot read previous results from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tasks split by whether they already have a result
#[derive(Debug, Default)]
pub struct Partition {
    /// Earlier results, in task input order
    pub processed: Vec<ResultRecord>,
    /// Tasks still to run, in task input order
    pub pending: Vec<TaskRecord>,
}

/// Previously persisted results keyed by task id
#[derive(Debug, Default)]
pub struct ResultLedger {
    records: HashMap<String, ResultRecord>,
}

impl ResultLedger {
    /// An empty ledger
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load earlier results from `path`.
    ///
    /// Returns an empty ledger when `enabled` is false or the file does not
    /// exist. Lines that do not parse as a result record are skipped; when an
    /// id appears more than once the last occurrence wins.
    pub fn load(path: &Path, enabled: bool) -> Result<Self, LedgerError> {
        if !enabled {
            debug!("result preloading disabled");
            return Ok(Self::empty());
        }
        if !path.exists() {
            debug!(path = %path.display(), "no previous results");
            return Ok(Self::empty());
        }

        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_err)?);

        let mut records = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResultRecord>(&line) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping unreadable result line"
                    );
                }
            }
        }

        if !records.is_empty() {
            info!(count = records.len(), "loaded existing results");
        }
        Ok(Self { records })
    }

    /// Build a ledger from records, later ids replacing earlier ones
    pub fn from_records(records: impl IntoIterator<Item = ResultRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ResultRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Split `tasks` into those with an earlier result and those still to run.
    ///
    /// Ledger entries whose id is not among `tasks` are not carried over.
    pub fn partition(mut self, tasks: impl IntoIterator<Item = TaskRecord>) -> Partition {
        let mut partition = Partition::default();
        for task in tasks {
            match self.records.remove(&task.id) {
                Some(record) => {
                    debug!(task = %task.id, "already processed, skipping");
                    partition.processed.push(record);
                }
                None => partition.pending.push(task),
            }
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EvalResult;
    use std::io::Write;
    use tempfile::TempDir;

    fn record(id: &str, corr: u8) -> String {
        serde_json::json!({
            "id": id,
            "session": {},
            "eval": {"pred": "x", "gold": "x", "corr": corr}
        })
        .to_string()
    }

    fn write_lines(dir: &TempDir, lines: &[String]) -> PathBuf {
        let path = dir.path().join("out.jsonl");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_load_disabled_or_missing() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, &[record("task0000", 1)]);

        assert!(ResultLedger::load(&path, false).unwrap().is_empty());
        assert!(ResultLedger::load(&dir.path().join("nope.jsonl"), true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_load_skips_malformed_and_last_wins() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            &dir,
            &[
                record("task0000", 0),
                "{\"truncated\": ".to_string(),
                String::new(),
                "{\"no_id\": true}".to_string(),
                record("task0001", 1),
                record("task0000", 1),
            ],
        );

        let ledger = ResultLedger::load(&path, true).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("task0000").unwrap().eval.corr, 1);
        assert!(ledger.contains("task0001"));
    }

    #[test]
    fn test_partition_preserves_task_order() {
        let done = |id: &str| ResultRecord {
            eval: EvalResult::failed("p", "g"),
            ..serde_json::from_value(serde_json::json!({ "id": id })).unwrap()
        };
        let ledger = ResultLedger::from_records(vec![
            done("task0002"),
            done("task0000"),
            done("task0099"),
        ]);

        let tasks: Vec<_> = (0..4).map(|i| TaskRecord::new(i, format!("q{}", i))).collect();
        let partition = ledger.partition(tasks);

        let processed: Vec<_> = partition.processed.iter().map(|r| r.id.as_str()).collect();
        let pending: Vec<_> = partition.pending.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(processed, vec!["task0000", "task0002"]);
        assert_eq!(pending, vec!["task0001", "task0003"]);
    }
}
