//! Offline re-scoring of a result journal
//!
//! Reads every line of a journal, scores `eval.pred` against `eval.gold` and
//! optionally splits the journal into one file per record, writes a CSV report
//! or rewrites it with only the correct records (after taking a timestamped
//! backup).

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::journal::JournalError;
use crate::scorer;

/// Verdict for one journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    /// The line is not valid JSON
    InvalidJson,
    /// The record lacks a prediction or gold answer
    Unscorable,
}

impl Verdict {
    /// Label used in the CSV report
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InvalidJson => "INVALID_JSON",
            Self::Unscorable => "UNSCORABLE",
        }
    }
}

/// One re-scored line
#[derive(Debug, Clone, Serialize)]
pub struct RescoredRow {
    pub id: String,
    pub gold: Option<String>,
    pub pred: Option<String>,
    pub verdict: Verdict,
}

/// What to do besides scoring
#[derive(Debug, Clone, Default)]
pub struct RescoreOptions {
    /// Write each record as `<dir>/<id>.json`
    pub split_dir: Option<PathBuf>,
    /// Rewrite the journal with only the correct records
    pub keep_correct: bool,
    /// Write one CSV row per scored line to this file
    pub report: Option<PathBuf>,
    /// Backup directory name, relative to the journal's directory
    pub backup_dir_name: String,
}

impl RescoreOptions {
    pub fn new() -> Self {
        Self {
            backup_dir_name: "backup".to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of [`rescore`]
#[derive(Debug, Clone, Serialize)]
pub struct RescoreReport {
    pub rows: Vec<RescoredRow>,
    /// Lines read, including blank ones
    pub total_lines: usize,
    pub files_written: usize,
    pub backup: Option<PathBuf>,
}

impl RescoreReport {
    pub fn successes(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.verdict == Verdict::Success)
            .count()
    }

    /// Percentage of rows scored correct
    pub fn success_rate(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.successes() as f64 / self.rows.len() as f64 * 100.0
        }
    }
}

/// Re-score the journal at `path`
pub fn rescore(path: &Path, options: &RescoreOptions) -> Result<RescoreReport, JournalError> {
    let open_err = |source| JournalError::Open {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(open_err)?);

    let backup = if options.keep_correct {
        Some(backup_journal(path, &options.backup_dir_name)?)
    } else {
        None
    };

    if let Some(dir) = &options.split_dir {
        fs::create_dir_all(dir)?;
    }

    let mut correct_lines = Vec::new();
    let mut report = RescoreReport {
        rows: Vec::new(),
        total_lines: 0,
        files_written: 0,
        backup,
    };

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        report.total_lines = line_no;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let data: Value = match serde_json::from_str(trimmed) {
            Ok(data) => data,
            Err(e) => {
                warn!(line = line_no, error = %e, "line is not valid JSON, skipping");
                report.rows.push(RescoredRow {
                    id: format!("line_{}", line_no),
                    gold: None,
                    pred: None,
                    verdict: Verdict::InvalidJson,
                });
                continue;
            }
        };

        let id = data
            .get("id")
            .map(render)
            .unwrap_or_else(|| format!("line_{}", line_no));
        let gold = data.pointer("/eval/gold").filter(|v| !v.is_null()).map(render);
        let pred = data.pointer("/eval/pred").filter(|v| !v.is_null()).map(render);

        let verdict = match (&pred, &gold) {
            (Some(p), Some(g)) if scorer::score(p, g) => Verdict::Success,
            (Some(_), Some(_)) => Verdict::Failure,
            _ => Verdict::Unscorable,
        };
        if verdict == Verdict::Success {
            correct_lines.push(trimmed.to_string());
        }

        if let Some(dir) = &options.split_dir {
            match split_file_name(&id) {
                Some(name) => {
                    let pretty = serde_json::to_string_pretty(&data).map_err(|source| {
                        JournalError::Serialize {
                            id: id.clone(),
                            source,
                        }
                    })?;
                    fs::write(dir.join(name), pretty)?;
                    report.files_written += 1;
                }
                None => {
                    warn!(line = line_no, id = %id, "id is not a safe file name, not splitting");
                }
            }
        }

        report.rows.push(RescoredRow {
            id,
            gold,
            pred,
            verdict,
        });
    }

    if let Some(csv_path) = &options.report {
        if report.rows.is_empty() {
            warn!("no lines scored, report not written");
        } else {
            write_report(csv_path, &report.rows)?;
        }
    }

    if options.keep_correct {
        replace_with_lines(path, &correct_lines)?;
        info!(kept = correct_lines.len(), "journal rewritten with correct records only");
    }

    Ok(report)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `<id>.json`, or `None` when the id could escape the split directory
fn split_file_name(id: &str) -> Option<String> {
    let unsafe_id = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    (!unsafe_id).then(|| format!("{}.json", id))
}

#[derive(Serialize)]
struct ReportRow<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Gold")]
    gold: Option<&'a str>,
    #[serde(rename = "Prediction")]
    pred: Option<&'a str>,
    #[serde(rename = "Result")]
    result: &'static str,
}

/// Write the per-line CSV report (`ID,Gold,Prediction,Result`)
fn write_report(path: &Path, rows: &[RescoredRow]) -> Result<(), JournalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let report_err = |source| JournalError::Report {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    for row in rows {
        writer
            .serialize(ReportRow {
                id: &row.id,
                gold: row.gold.as_deref(),
                pred: row.pred.as_deref(),
                result: row.verdict.label(),
            })
            .map_err(report_err)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "report written");
    Ok(())
}

/// Copy `path` to `<dir>/<backup_dir_name>/<timestamp>_<file name>`
fn backup_journal(path: &Path, backup_dir_name: &str) -> Result<PathBuf, JournalError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let backup_dir = parent.join(backup_dir_name);
    fs::create_dir_all(&backup_dir)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "journal.jsonl".to_string());
    let backup = backup_dir.join(format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), name));
    fs::copy(path, &backup)?;
    debug!(backup = %backup.display(), "journal backed up");
    Ok(backup)
}

/// Atomically replace `path` with `lines`
fn replace_with_lines(path: &Path, lines: &[String]) -> Result<(), JournalError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = (|| -> Result<(), JournalError> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() && tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JOURNAL: &str = concat!(
        "{\"id\": \"task0000\", \"eval\": {\"pred\": \"Paris\", \"gold\": \"paris\", \"corr\": 0}}\n",
        "{\"id\": \"task0001\", \"eval\": {\"pred\": \"3\", \"gold\": \"4\", \"corr\": 1}}\n",
        "\n",
        "{not json\n",
        "{\"id\": \"task0003\", \"eval\": {\"pred\": \"$1,000\", \"gold\": 1000}}\n",
        "{\"id\": \"task0004\", \"session\": {}}\n",
    );

    fn journal(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("out.jsonl");
        fs::write(&path, JOURNAL).unwrap();
        path
    }

    #[test]
    fn test_rescore_verdicts() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);

        let report = rescore(&path, &RescoreOptions::new()).unwrap();

        let verdicts: Vec<_> = report.rows.iter().map(|r| r.verdict).collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Success,
                Verdict::Failure,
                Verdict::InvalidJson,
                Verdict::Success,
                Verdict::Unscorable,
            ]
        );
        assert_eq!(report.rows[2].id, "line_4");
        assert_eq!(report.total_lines, 6);
        assert_eq!(report.successes(), 2);
        assert!((report.success_rate() - 40.0).abs() < 1e-9);
        // Untouched without --keep-correct
        assert_eq!(fs::read_to_string(&path).unwrap(), JOURNAL);
    }

    #[test]
    fn test_split_dir() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);
        let split = dir.path().join("split");

        let report = rescore(
            &path,
            &RescoreOptions {
                split_dir: Some(split.clone()),
                ..RescoreOptions::new()
            },
        )
        .unwrap();

        assert_eq!(report.files_written, 4);
        let content = fs::read_to_string(split.join("task0000.json")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["eval"]["pred"], "Paris");
        assert!(content.contains('\n'));
    }

    #[test]
    fn test_keep_correct_backs_up_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);

        let report = rescore(
            &path,
            &RescoreOptions {
                keep_correct: true,
                ..RescoreOptions::new()
            },
        )
        .unwrap();

        let backup = report.backup.unwrap();
        assert!(backup.starts_with(dir.path().join("backup")));
        assert!(backup.to_string_lossy().ends_with("_out.jsonl"));
        assert_eq!(fs::read_to_string(&backup).unwrap(), JOURNAL);

        let kept = fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = kept
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["task0000", "task0003"]);
    }

    #[test]
    fn test_split_dir_rejects_escaping_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"id\": \"../escaped\", \"eval\": {\"pred\": \"1\", \"gold\": \"1\"}}\n",
                "{\"id\": \"task0001\", \"eval\": {\"pred\": \"1\", \"gold\": \"1\"}}\n",
            ),
        )
        .unwrap();
        let split = dir.path().join("split");

        let report = rescore(
            &path,
            &RescoreOptions {
                split_dir: Some(split.clone()),
                ..RescoreOptions::new()
            },
        )
        .unwrap();

        assert_eq!(report.files_written, 1);
        assert_eq!(report.rows.len(), 2);
        assert!(!dir.path().join("escaped.json").exists());
        assert!(split.join("task0001.json").exists());
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("task0000").as_deref(), Some("task0000.json"));
        assert_eq!(split_file_name("a/b"), None);
        assert_eq!(split_file_name("..\\x"), None);
        assert_eq!(split_file_name(".."), None);
        assert_eq!(split_file_name(""), None);
    }

    #[test]
    fn test_csv_report() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);
        let csv_path = dir.path().join("result").join("evaluation.csv");

        rescore(
            &path,
            &RescoreOptions {
                report: Some(csv_path.clone()),
                ..RescoreOptions::new()
            },
        )
        .unwrap();

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["ID", "Gold", "Prediction", "Result"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(&rows[0][0], "task0000");
        assert_eq!(&rows[0][1], "paris");
        assert_eq!(&rows[0][2], "Paris");
        assert_eq!(&rows[0][3], "SUCCESS");
        assert_eq!(&rows[1][3], "FAILURE");
        assert_eq!(&rows[2][3], "INVALID_JSON");
        assert_eq!(&rows[4][1], "");
        assert_eq!(&rows[4][3], "UNSCORABLE");
    }

    #[test]
    fn test_missing_journal() {
        let dir = TempDir::new().unwrap();
        assert!(rescore(&dir.path().join("none.jsonl"), &RescoreOptions::new()).is_err());
    }
}
