//! Task scheduler: bounded async worker pool using tokio

use std::sync::Arc;
use std::time::{Duration, Instant};

use sortie_core::config::RunConfig;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::attempt::AttemptController;
use crate::journal::ResultSink;
use crate::record::{ResultRecord, SKIPPED_PREDICTION};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::TaskRecord;

/// Default number of tasks in flight
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Options for the task scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum concurrent tasks
    pub concurrency: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl From<&RunConfig> for SchedulerOptions {
    fn from(run: &RunConfig) -> Self {
        Self {
            concurrency: run.concurrency.max(1),
        }
    }
}

/// Counts for one scheduler pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionSummary {
    /// Tasks that produced a record
    pub total: usize,
    /// Records scored correct
    pub correct: usize,
    /// Records from critical failures
    pub failed: usize,
    /// Hard tasks skipped without solving
    pub skipped: usize,
    /// Records that could not be written to the journal
    pub write_errors: usize,
    pub duration: Duration,
}

impl ExecutionSummary {
    fn tally(&mut self, record: &ResultRecord) {
        self.total += 1;
        if record.is_correct() {
            self.correct += 1;
        }
        if record.is_critical() {
            self.failed += 1;
        }
        let skipped = record.skip_hard
            && record.eval.pred == SKIPPED_PREDICTION
            && record.session.steps.is_empty();
        if skipped {
            self.skipped += 1;
        }
    }
}

/// Runs pending tasks through the attempt controller with bounded concurrency
pub struct TaskScheduler {
    options: SchedulerOptions,
    controller: Arc<AttemptController>,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(
        options: SchedulerOptions,
        controller: Arc<AttemptController>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            options,
            controller,
            reporter,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// Process every task, appending each record to `sink` as soon as it
    /// completes. Returns once all tasks have a record.
    pub async fn execute<S>(&self, tasks: Vec<TaskRecord>, sink: &S) -> ExecutionSummary
    where
        S: ResultSink + ?Sized,
    {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        debug!(
            tasks = tasks.len(),
            concurrency = self.options.concurrency,
            "scheduling tasks"
        );

        for task in tasks {
            let semaphore = semaphore.clone();
            let controller = self.controller.clone();
            let reporter = self.reporter.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let worker_task = task.clone();

                // Run in its own tokio task so a panic is caught as a JoinError
                let handle =
                    tokio::spawn(async move { controller.process(&worker_task).await });
                match handle.await {
                    Ok(record) => record,
                    Err(e) => {
                        let message = format!("Task panicked: {}", e);
                        reporter.report(&TaskEvent::Failed {
                            id: task.id.clone(),
                            duration: started.elapsed(),
                            error: message.clone(),
                        });
                        ResultRecord::critical(&task, message)
                    }
                }
            });
        }

        let mut summary = ExecutionSummary::default();
        while let Some(joined) = join_set.join_next().await {
            let record = match joined {
                Ok(record) => record,
                Err(e) => {
                    error!(error = %e, "worker task aborted");
                    continue;
                }
            };

            summary.tally(&record);
            if let Err(e) = sink.append(&record) {
                error!(task = %record.id, error = %e, "failed to write result");
                summary.write_errors += 1;
            }
        }

        summary.duration = start.elapsed();
        self.reporter.report(&TaskEvent::AllCompleted {
            total: summary.total,
            correct: summary.correct,
            failed: summary.failed,
            skipped: summary.skipped,
            duration: summary.duration,
        });
        summary
    }
}
