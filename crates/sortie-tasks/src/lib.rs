//! Sortie Tasks - Batch task execution engine
//!
//! This crate drives a batch of independent tasks through an external solver
//! with bounded concurrency, per-task retries, reflection and ensembling,
//! a resumable result journal and an answer-equivalence scorer.

pub mod attempt;
pub mod batch;
pub mod evaluator;
pub mod journal;
pub mod ledger;
pub mod record;
pub mod reporter;
pub mod rescore;
pub mod scheduler;
pub mod scorer;
pub mod session;
pub mod solver;
pub mod source;
pub mod task;

pub use attempt::{AttemptController, AttemptError, AttemptPolicy};
pub use batch::{run_batch, BatchError, BatchOptions, BatchSummary};
pub use evaluator::{AnswerEvaluator, CommandEvaluator, Evaluator, EvaluatorError};
pub use journal::{Accuracy, JournalError, OutputJournal, ResultSink};
pub use ledger::{LedgerError, Partition, ResultLedger};
pub use record::{EvalResult, ResultRecord};
pub use reporter::{
    CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter,
};
pub use rescore::{rescore, RescoreOptions, RescoreReport, Verdict};
pub use scheduler::{ExecutionSummary, SchedulerOptions, TaskScheduler};
pub use scorer::score;
pub use session::{CallStats, Session};
pub use solver::{CommandSolver, Solver, SolverError};
pub use source::{SourceError, TaskSource};
pub use task::TaskRecord;
