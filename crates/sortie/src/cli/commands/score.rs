//! Score command: re-score an existing result journal offline

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use sortie_core::{RunError, SortieError};
use sortie_tasks::{rescore, RescoreOptions, RescoreReport, Verdict};

use crate::cli::{output, Cli, OutputFormat};

/// Re-score an existing result journal
#[derive(Debug, Args)]
pub struct ScoreCommand {
    /// Result journal to score
    pub journal: PathBuf,

    /// Write each record as a pretty-printed `<id>.json` into this directory
    #[arg(long)]
    pub split_dir: Option<PathBuf>,

    /// Rewrite the journal keeping only correct records (a backup is taken first)
    #[arg(long)]
    pub keep_correct: bool,

    /// Backup directory, relative to the journal's directory
    #[arg(long, default_value = "backup")]
    pub backup_dir: String,

    /// Write a per-line CSV report (ID, Gold, Prediction, Result)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl ScoreCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            journal = %self.journal.display(),
            keep_correct = self.keep_correct,
            "executing score command"
        );

        if !self.journal.exists() {
            return Err(SortieError::Run(RunError::InputNotFound(self.journal.clone())).into());
        }

        let report = rescore(&self.journal, &self.options())?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        if cli.quiet {
            return Ok(());
        }

        self.print_text(&report);
        Ok(())
    }

    fn options(&self) -> RescoreOptions {
        RescoreOptions {
            split_dir: self.split_dir.clone(),
            keep_correct: self.keep_correct,
            backup_dir_name: self.backup_dir.clone(),
            report: self.report.clone(),
        }
    }

    fn print_text(&self, report: &RescoreReport) {
        for row in &report.rows {
            let mark = match row.verdict {
                Verdict::Success => style("✓").green(),
                Verdict::Failure => style("✗").red(),
                Verdict::InvalidJson | Verdict::Unscorable => style("?").yellow(),
            };
            println!(
                "  {} {} {}",
                mark,
                row.id,
                style(format!(
                    "pred={} gold={}",
                    row.pred.as_deref().unwrap_or("-"),
                    row.gold.as_deref().unwrap_or("-")
                ))
                .dim()
            );
        }
        println!();

        let invalid = report
            .rows
            .iter()
            .filter(|r| r.verdict == Verdict::InvalidJson)
            .count();
        if invalid > 0 {
            output::warning(&format!(
                "{} line{} could not be parsed",
                invalid,
                if invalid == 1 { "" } else { "s" }
            ));
        }

        println!("{}", output::header("Score"));
        println!("{}", output::key_value("Journal", &output::path(&self.journal)));
        println!("{}", output::key_value("Lines", &report.total_lines.to_string()));
        println!("{}", output::key_value("Records", &report.rows.len().to_string()));
        println!("{}", output::key_value("Correct", &report.successes().to_string()));
        println!(
            "{}",
            output::key_value("Success rate", &format!("{:.2}%", report.success_rate()))
        );

        if let Some(dir) = &self.split_dir {
            output::info(&format!(
                "Wrote {} record file{} to {}",
                report.files_written,
                if report.files_written == 1 { "" } else { "s" },
                output::path(dir)
            ));
        }
        if let Some(csv_path) = &self.report {
            output::info(&format!("Wrote report to {}", output::path(csv_path)));
        }
        if let Some(backup) = &report.backup {
            output::info(&format!("Backed up journal to {}", output::path(backup)));
            output::success(&format!(
                "Kept {} correct record{}",
                report.successes(),
                if report.successes() == 1 { "" } else { "s" }
            ));
        }
    }
}
