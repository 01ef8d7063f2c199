//! Append-only result journal

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::record::ResultRecord;

/// Errors writing or reading the journal
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Cannot open journal {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write result {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize result {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Journal IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for finished records.
///
/// A failed append is reported to the caller and never stops the run.
pub trait ResultSink: Send + Sync {
    fn append(&self, record: &ResultRecord) -> Result<(), JournalError>;
}

impl ResultSink for OutputJournal {
    fn append(&self, record: &ResultRecord) -> Result<(), JournalError> {
        OutputJournal::append(self, record)
    }
}

/// Line-delimited JSON writer shared by every worker of a run.
///
/// Each record is written as one line and flushed before `append` returns.
pub struct OutputJournal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl OutputJournal {
    /// Rewrite `path` to contain exactly `already_processed`, then keep it open
    /// for appending.
    pub fn create(path: &Path, already_processed: &[ResultRecord]) -> Result<Self, JournalError> {
        let open_err = |source| JournalError::Open {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }

        {
            let mut writer = BufWriter::new(File::create(path).map_err(open_err)?);
            for record in already_processed {
                write_line(&mut writer, record)?;
            }
            writer.flush()?;
        }
        debug!(
            path = %path.display(),
            records = already_processed.len(),
            "journal compacted"
        );

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(open_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record and flush it
    pub fn append(&self, record: &ResultRecord) -> Result<(), JournalError> {
        let mut writer = self.lock();
        write_line(&mut *writer, record)?;
        writer.flush().map_err(|source| JournalError::Write {
            id: record.id.clone(),
            source,
        })
    }

    /// Flush and sync the file to disk
    pub fn close(self) -> Result<(), JournalError> {
        let mut writer = self.lock();
        writer.flush()?;
        writer.get_ref().sync_all()?;
        debug!(path = %self.path.display(), "journal closed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_line(writer: &mut impl Write, record: &ResultRecord) -> Result<(), JournalError> {
    let line = serde_json::to_string(record).map_err(|source| JournalError::Serialize {
        id: record.id.clone(),
        source,
    })?;
    writeln!(writer, "{}", line).map_err(|source| JournalError::Write {
        id: record.id.clone(),
        source,
    })
}

/// Read every parsable record from a journal, in file order
pub fn read_all(path: &Path) -> Result<Vec<ResultRecord>, JournalError> {
    let file = File::open(path).map_err(|source| JournalError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ResultRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = line_no + 1, error = %e, "skipping unreadable journal line"),
        }
    }
    Ok(records)
}

/// Correct and total counts over a set of results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        records.into_iter().fold(Self::default(), |acc, r| Self {
            correct: acc.correct + usize::from(r.is_correct()),
            total: acc.total + 1,
        })
    }

    /// Fraction correct, or 0 when there are no results
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final Accuracy = {}/{}={:.4}",
            self.correct,
            self.total,
            self.ratio()
        )
    }
}

/// Re-read a journal and compute its accuracy
pub fn summarize(path: &Path) -> Result<Accuracy, JournalError> {
    Ok(Accuracy::from_records(&read_all(path)?))
}
