//! Per-task attempt controller
//!
//! Drives one [`TaskRecord`] to a [`ResultRecord`] using the solver and,
//! depending on the policy, the evaluator:
//!
//! - **direct**: one solver call
//! - **retry/ensemble**: up to `max_retries` attempts per candidate slot,
//!   optionally feeding the last failure back into the prompt; with an
//!   ensemble method several slots are filled and the evaluator picks one
//! - **sampling**: up to `max_retries` attempts on the plain prompt until the
//!   completion check passes
//!
//! Any error while processing a task becomes a critical record; it never
//! escapes to the caller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use sortie_core::config::{EvaluationMethod, InferenceEvaluation, RunConfig};
use tracing::{debug, info, warn};

use crate::evaluator::{Evaluator, EvaluatorError};
use crate::record::ResultRecord;
use crate::reporter::{TaskEvent, TaskReporter, TracingReporter};
use crate::scorer;
use crate::session::Session;
use crate::solver::{Solver, SolverError};
use crate::task::TaskRecord;

/// Timestamp format written to `session.info`
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Errors that turn a task into a critical record
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error("No evaluator configured for `{0}`")]
    NoEvaluator(String),
}

/// Knobs controlling how a task is attempted
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptPolicy {
    pub skip_hard_query: bool,
    pub sampling_mode: bool,
    pub evaluation_method: EvaluationMethod,
    pub inference_evaluation: InferenceEvaluation,
    pub max_retries: u32,
    pub reflection: bool,
    pub save_failed_tries: bool,
    pub ensemble_size: usize,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for AttemptPolicy {
    fn from(run: &RunConfig) -> Self {
        Self {
            skip_hard_query: run.skip_hard_query,
            sampling_mode: run.sampling_mode,
            evaluation_method: run.evaluation_method,
            inference_evaluation: run.inference_evaluation,
            max_retries: run.max_retries.max(1),
            reflection: run.reflection,
            save_failed_tries: run.save_failed_tries,
            ensemble_size: run.ensemble_size.max(1),
        }
    }
}

impl AttemptPolicy {
    /// Number of candidate slots
    pub fn candidate_slots(&self) -> usize {
        if self.inference_evaluation.uses_ensemble() {
            self.ensemble_size
        } else {
            1
        }
    }

    /// Whether this policy needs an evaluator
    pub fn needs_evaluator(&self) -> bool {
        if self.sampling_mode {
            matches!(
                self.evaluation_method,
                EvaluationMethod::LlmScore | EvaluationMethod::StopWithAnswer
            )
        } else {
            self.inference_evaluation.is_enabled()
        }
    }
}

/// Prompt for a retry carrying the feedback of the previous failure
pub fn reflection_prompt(prompt: &str, feedback: &str) -> String {
    format!(
        "{}. Here is a feedback for a previous try that failed:\n\n{}",
        prompt, feedback
    )
}

/// What the attempt loop produced
#[derive(Debug, Default)]
struct Outcome {
    /// Every session the solver returned, in order
    attempts: Vec<Session>,
    /// The session chosen as the task's result
    chosen: Option<Session>,
    /// Feedback for each failed evaluation (retry mode only)
    feedback: Option<Vec<String>>,
}

/// Drives tasks through the solver and evaluator
pub struct AttemptController {
    solver: Arc<dyn Solver>,
    evaluator: Option<Arc<dyn Evaluator>>,
    policy: AttemptPolicy,
    file_base_dir: Option<PathBuf>,
    reporter: Arc<dyn TaskReporter>,
}

impl AttemptController {
    pub fn new(solver: Arc<dyn Solver>, policy: AttemptPolicy) -> Self {
        Self {
            solver,
            evaluator: None,
            policy,
            file_base_dir: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Directory attached file names are resolved against
    pub fn with_file_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_base_dir = Some(dir.into());
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Process one task. Errors are folded into a critical record.
    pub async fn process(&self, task: &TaskRecord) -> ResultRecord {
        let started = Instant::now();

        if self.policy.skip_hard_query && task.skip {
            info!(task = %task.id, "skipping hard task");
            self.reporter.report(&TaskEvent::Skipped {
                id: task.id.clone(),
                reason: "hard query".to_string(),
            });
            return ResultRecord::skipped(task);
        }

        self.reporter.report(&TaskEvent::Started {
            id: task.id.clone(),
        });

        match self.run(task).await {
            Ok(record) => {
                self.reporter.report(&TaskEvent::Completed {
                    id: task.id.clone(),
                    duration: started.elapsed(),
                    correct: record.is_correct(),
                });
                record
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "task failed with a critical error");
                self.reporter.report(&TaskEvent::Failed {
                    id: task.id.clone(),
                    duration: started.elapsed(),
                    error: e.to_string(),
                });
                ResultRecord::critical(task, e.to_string())
            }
        }
    }

    async fn run(&self, task: &TaskRecord) -> Result<ResultRecord, AttemptError> {
        let prompt = task.solver_prompt(self.file_base_dir.as_deref());
        let started = Instant::now();
        let start_time = Local::now();

        let outcome = if self.policy.sampling_mode {
            self.run_sampling(task, &prompt).await?
        } else if self.policy.inference_evaluation.is_enabled() {
            self.run_with_retries(task, &prompt).await?
        } else {
            Outcome {
                attempts: Vec::new(),
                chosen: Some(self.solver.run(&prompt).await?),
                feedback: None,
            }
        };

        let Outcome {
            mut attempts,
            chosen,
            feedback,
        } = outcome;

        let mut record = match chosen {
            None => {
                debug!(task = %task.id, "no successful attempt");
                ResultRecord::for_task(task, Session::error_placeholder())
            }
            Some(mut session) => {
                let call_stat = self.solver.call_stats(true);
                let duration = started.elapsed().as_secs_f64();
                session.set_info(
                    "call_stat",
                    serde_json::to_value(&call_stat).unwrap_or_default(),
                );
                session.set_info("start_time", ctime(&start_time));
                session.set_info("end_time", ctime(&Local::now()));
                session.set_info("duration", duration);
                info!(
                    task = %task.id,
                    duration_secs = duration,
                    calls = call_stat.calls,
                    "task finished"
                );

                let record = ResultRecord::for_task(task, session);
                if self.policy.save_failed_tries && attempts.len() > 1 {
                    attempts.pop();
                    record.with_failed_sessions(attempts)
                } else {
                    record
                }
            }
        };

        if let Some(feedback) = feedback {
            record = record.with_feedback(feedback);
        }
        Ok(record)
    }

    fn evaluator(&self, method: &str) -> Result<&dyn Evaluator, AttemptError> {
        self.evaluator
            .as_deref()
            .ok_or_else(|| AttemptError::NoEvaluator(method.to_string()))
    }

    fn report_retry(&self, task: &TaskRecord, attempt: u32, feedback: Option<&str>) {
        debug!(task = %task.id, attempt, "retrying");
        self.reporter.report(&TaskEvent::Retrying {
            id: task.id.clone(),
            attempt,
            feedback: feedback.map(str::to_string),
        });
    }

    async fn run_with_retries(
        &self,
        task: &TaskRecord,
        prompt: &str,
    ) -> Result<Outcome, AttemptError> {
        let method = self.policy.inference_evaluation.as_str();
        let evaluator = self.evaluator(method)?;
        let ensembling = self.policy.inference_evaluation.uses_ensemble();

        let mut attempts: Vec<Session> = Vec::new();
        let mut candidates: Vec<usize> = Vec::new();
        let mut feedback_log: Vec<String> = Vec::new();

        for slot in 0..self.policy.candidate_slots() {
            let mut feedback: Option<String> = None;
            let mut success = None;

            for attempt in 0..self.policy.max_retries {
                let attempt_prompt = match feedback.as_deref() {
                    Some(fb) if self.policy.reflection && !fb.is_empty() => {
                        reflection_prompt(prompt, fb)
                    }
                    _ => prompt.to_string(),
                };

                let session = self.solver.run(&attempt_prompt).await?;
                let (failed, new_feedback) = evaluator.detect_failure(&session, method).await?;
                attempts.push(session);

                if !failed {
                    success = Some(attempts.len() - 1);
                    break;
                }

                self.report_retry(task, attempt + 1, new_feedback.as_deref());
                feedback_log.push(new_feedback.clone().unwrap_or_default());
                feedback = new_feedback;
            }

            match success {
                Some(index) => {
                    debug!(task = %task.id, slot, "candidate found");
                    candidates.push(index);
                    if !ensembling {
                        break;
                    }
                }
                None => debug!(task = %task.id, slot, "retries exhausted"),
            }
        }

        let chosen = if candidates.is_empty() {
            None
        } else if ensembling {
            let sessions: Vec<Session> =
                candidates.iter().map(|&i| attempts[i].clone()).collect();
            let picked = evaluator.ensemble(&sessions).await?;
            let len = sessions.len();
            let session = sessions
                .into_iter()
                .nth(picked)
                .ok_or(EvaluatorError::IndexOutOfRange { index: picked, len })?;
            debug!(task = %task.id, picked, candidates = len, "ensemble picked candidate");
            Some(session)
        } else {
            Some(attempts[candidates[0]].clone())
        };

        Ok(Outcome {
            attempts,
            chosen,
            feedback: Some(feedback_log),
        })
    }

    async fn run_sampling(&self, task: &TaskRecord, prompt: &str) -> Result<Outcome, AttemptError> {
        let method = self.policy.evaluation_method;
        let max_attempts = match method {
            EvaluationMethod::Disabled => 1,
            _ => self.policy.max_retries,
        };

        let mut outcome = Outcome::default();
        for attempt in 0..max_attempts {
            let session = self.solver.run(prompt).await?;
            let finished = match method {
                EvaluationMethod::Disabled => true,
                EvaluationMethod::Em => {
                    scorer::score(&session.predicted_answer(), &task.gold_or_unknown())
                }
                EvaluationMethod::LlmScore | EvaluationMethod::StopWithAnswer => {
                    let evaluator = self.evaluator(method.as_str())?;
                    let (failed, _) = evaluator.detect_failure(&session, method.as_str()).await?;
                    !failed
                }
            };

            if finished {
                outcome.chosen = Some(session.clone());
                outcome.attempts.push(session);
                break;
            }
            outcome.attempts.push(session);
            if attempt + 1 < max_attempts {
                self.report_retry(task, attempt + 1, None);
            }
        }
        Ok(outcome)
    }
}

fn ctime(time: &DateTime<Local>) -> String {
    time.format(CTIME_FORMAT).to_string()
}
