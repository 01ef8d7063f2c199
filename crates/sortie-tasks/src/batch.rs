//! A full resumable run: ledger, journal, scheduler and final accuracy

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::info;

use crate::journal::{self, Accuracy, JournalError, OutputJournal};
use crate::ledger::{LedgerError, ResultLedger};
use crate::reporter::TaskEvent;
use crate::scheduler::{ExecutionSummary, TaskScheduler};
use crate::task::TaskRecord;

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Where results go and how earlier results are reused
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Output journal; also read back as the ledger
    pub output: PathBuf,
    /// Reuse results already in `output`
    pub preload_output: bool,
    /// Tasks at positions below this are not run; their earlier results are kept
    pub starting_index: usize,
}

impl BatchOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            preload_output: true,
            starting_index: 0,
        }
    }
}

/// Result of [`run_batch`]
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Tasks with a result after this run: kept plus newly run
    pub total: usize,
    /// Tasks whose earlier result was kept
    pub already_processed: usize,
    pub execution: ExecutionSummary,
    /// Accuracy over the whole journal after the run
    pub accuracy: Accuracy,
}

/// Run every task that has no earlier result and return the final accuracy
/// read back from the journal.
pub async fn run_batch(
    tasks: Vec<TaskRecord>,
    options: &BatchOptions,
    scheduler: &TaskScheduler,
) -> Result<BatchSummary, BatchError> {
    // Earlier results are kept whatever their position; only new work honours
    // the starting index.
    let before_start: HashSet<String> = tasks
        .iter()
        .take(options.starting_index)
        .map(|t| t.id.clone())
        .collect();

    let ledger = ResultLedger::load(&options.output, options.preload_output)?;
    let mut partition = ledger.partition(tasks);
    partition.pending.retain(|t| !before_start.contains(&t.id));

    let already_processed = partition.processed.len();
    let total = already_processed + partition.pending.len();

    scheduler.reporter().report(&TaskEvent::BatchStarted {
        total,
        already_processed,
        pending: partition.pending.len(),
    });

    let journal = OutputJournal::create(&options.output, &partition.processed)?;
    let execution = scheduler.execute(partition.pending, &journal).await;
    journal.close()?;

    let accuracy = journal::summarize(&options.output)?;
    info!(
        correct = accuracy.correct,
        total = accuracy.total,
        "run finished"
    );

    Ok(BatchSummary {
        total,
        already_processed,
        execution,
        accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptController, AttemptPolicy};
    use crate::journal::read_all;
    use crate::reporter::CollectingReporter;
    use crate::scheduler::SchedulerOptions;
    use crate::session::{CallStats, Session};
    use crate::solver::{Solver, SolverError};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Answers with the prompt and records which prompts it saw
    #[derive(Default)]
    struct EchoSolver {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Solver for EchoSolver {
        async fn run(&self, prompt: &str) -> Result<Session, SolverError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(serde_json::from_value(serde_json::json!({
                "steps": [{"end": {"final_results": {"output": prompt}}}]
            }))
            .unwrap())
        }

        fn call_stats(&self, _clear: bool) -> CallStats {
            CallStats::default()
        }
    }

    fn setup(solver: Arc<EchoSolver>) -> (TaskScheduler, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let controller = AttemptController::new(solver, AttemptPolicy::default())
            .with_reporter(reporter.clone());
        let scheduler = TaskScheduler::new(
            SchedulerOptions { concurrency: 2 },
            Arc::new(controller),
            reporter.clone(),
        );
        (scheduler, reporter)
    }

    /// Task `i` asks for `a{i}`; gold is `a{i}` only for even `i`
    fn tasks(n: usize) -> Vec<TaskRecord> {
        (0..n)
            .map(|i| {
                let gold = if i % 2 == 0 { format!("a{}", i) } else { "other".to_string() };
                TaskRecord::new(i, format!("a{}", i)).with_gold_answer(gold)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_run() {
        let dir = TempDir::new().unwrap();
        let options = BatchOptions::new(dir.path().join("out.jsonl"));
        let (scheduler, _) = setup(Arc::new(EchoSolver::default()));

        let summary = run_batch(tasks(4), &options, &scheduler).await.unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.already_processed, 0);
        assert_eq!(summary.accuracy, Accuracy { correct: 2, total: 4 });
    }

    #[tokio::test]
    async fn test_resume_skips_processed_and_compacts() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let options = BatchOptions::new(&output);

        run_batch(tasks(2), &options, &setup(Arc::new(EchoSolver::default())).0)
            .await
            .unwrap();

        // Simulate an interrupted write and a stale record from another input
        let mut content = std::fs::read_to_string(&output).unwrap();
        content.push_str("{\"id\": \"task0099\"}\n{\"id\": \"task00");
        std::fs::write(&output, content).unwrap();

        let solver = Arc::new(EchoSolver::default());
        let (scheduler, reporter) = setup(solver.clone());
        let summary = run_batch(tasks(4), &options, &scheduler).await.unwrap();

        assert_eq!(summary.already_processed, 2);
        assert_eq!(summary.execution.total, 2);
        let mut seen = solver.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a2", "a3"]);

        let records = read_all(&output).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(&ids[..2], &["task0000", "task0001"]);
        assert_eq!(records.len(), 4);
        assert_eq!(summary.accuracy, Accuracy { correct: 2, total: 4 });

        assert!(matches!(
            reporter.events().first(),
            Some(TaskEvent::BatchStarted {
                total: 4,
                already_processed: 2,
                pending: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_no_preload_reruns_everything() {
        let dir = TempDir::new().unwrap();
        let mut options = BatchOptions::new(dir.path().join("out.jsonl"));
        run_batch(tasks(3), &options, &setup(Arc::new(EchoSolver::default())).0)
            .await
            .unwrap();

        options.preload_output = false;
        let solver = Arc::new(EchoSolver::default());
        let summary = run_batch(tasks(3), &options, &setup(solver.clone()).0)
            .await
            .unwrap();

        assert_eq!(solver.seen.lock().unwrap().len(), 3);
        assert_eq!(summary.accuracy.total, 3);
    }

    #[tokio::test]
    async fn test_starting_index() {
        let dir = TempDir::new().unwrap();
        let options = BatchOptions {
            starting_index: 3,
            ..BatchOptions::new(dir.path().join("out.jsonl"))
        };
        let solver = Arc::new(EchoSolver::default());

        let summary = run_batch(tasks(5), &options, &setup(solver.clone()).0)
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        let ids: Vec<_> = read_all(&options.output)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(ids, vec!["task0003", "task0004"]);
    }

    #[tokio::test]
    async fn test_resume_with_starting_index_keeps_earlier_results() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");

        let first = BatchOptions::new(&output);
        run_batch(tasks(3), &first, &setup(Arc::new(EchoSolver::default())).0)
            .await
            .unwrap();

        let options = BatchOptions {
            starting_index: 3,
            ..BatchOptions::new(&output)
        };
        let solver = Arc::new(EchoSolver::default());
        let summary = run_batch(tasks(5), &options, &setup(solver.clone()).0)
            .await
            .unwrap();

        assert_eq!(summary.already_processed, 3);
        assert_eq!(summary.execution.total, 2);
        assert_eq!(summary.total, 5);
        let mut seen = solver.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a3", "a4"]);

        let ids: Vec<_> = read_all(&output).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(&ids[..3], &["task0000", "task0001", "task0002"]);
        assert_eq!(summary.accuracy, Accuracy { correct: 3, total: 5 });
    }

    #[tokio::test]
    async fn test_repeated_runs_never_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let options = BatchOptions::new(dir.path().join("out.jsonl"));
        for _ in 0..3 {
            run_batch(tasks(3), &options, &setup(Arc::new(EchoSolver::default())).0)
                .await
                .unwrap();
        }
        let records = read_all(&options.output).unwrap();
        let unique: std::collections::HashSet<_> = records.iter().map(|r| &r.id).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(unique.len(), 3);
    }
}
