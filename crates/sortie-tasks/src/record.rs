//! Persisted per-task results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scorer;
use crate::session::Session;
use crate::task::TaskRecord;

/// Prediction used for hard tasks that were skipped
pub const SKIPPED_PREDICTION: &str = "NA";

/// Prediction used for tasks that failed with a critical error
pub const CRITICAL_PREDICTION: &str = "critical_error";

/// Scoring verdict for one task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResult {
    pub pred: String,
    pub gold: String,
    /// 1 when `pred` matched `gold`, 0 otherwise
    pub corr: u8,
}

impl EvalResult {
    /// Score `pred` against `gold`
    pub fn scored(pred: impl Into<String>, gold: impl Into<String>) -> Self {
        let pred = pred.into();
        let gold = gold.into();
        let corr = u8::from(scorer::score(&pred, &gold));
        Self { pred, gold, corr }
    }

    /// A verdict that is incorrect regardless of the answers
    pub fn failed(pred: impl Into<String>, gold: impl Into<String>) -> Self {
        Self {
            pred: pred.into(),
            gold: gold.into(),
            corr: 0,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.corr > 0
    }
}

/// One line of the output journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,

    /// Prompt as read from the input
    #[serde(default)]
    pub task: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Gold answer as read from the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default)]
    pub skip_hard: bool,

    #[serde(rename = "_orig", default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Value>,

    #[serde(default)]
    pub session: Session,

    #[serde(default)]
    pub eval: EvalResult,

    /// Evaluator feedback for every failed attempt, in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_failed_sessions: Option<Vec<Session>>,
}

impl ResultRecord {
    fn echo(task: &TaskRecord, session: Session, eval: EvalResult) -> Self {
        Self {
            id: task.id.clone(),
            task: task.prompt.clone(),
            file: task.file_ref.clone(),
            answer: task.gold_answer.clone(),
            skip_hard: task.skip,
            original: task.original.clone(),
            session,
            eval,
            feedback: None,
            previous_failed_sessions: None,
        }
    }

    /// Record for a task that ran, scored from the session's final output
    pub fn for_task(task: &TaskRecord, session: Session) -> Self {
        let eval = EvalResult::scored(session.predicted_answer(), task.gold_or_unknown());
        Self::echo(task, session, eval)
    }

    /// Record for a hard task skipped without running the solver
    pub fn skipped(task: &TaskRecord) -> Self {
        let eval = EvalResult::failed(SKIPPED_PREDICTION, task.gold_or_unknown());
        Self::echo(task, Session::default(), eval)
    }

    /// Record for a task that failed with an unrecoverable error
    pub fn critical(task: &TaskRecord, message: impl Into<String>) -> Self {
        let eval = EvalResult::failed(CRITICAL_PREDICTION, task.gold_or_unknown());
        Self::echo(task, Session::critical(message), eval)
    }

    pub fn with_feedback(mut self, feedback: Vec<String>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_failed_sessions(mut self, sessions: Vec<Session>) -> Self {
        self.previous_failed_sessions = Some(sessions);
        self
    }

    pub fn is_correct(&self) -> bool {
        self.eval.is_correct()
    }

    pub fn is_critical(&self) -> bool {
        self.eval.pred == CRITICAL_PREDICTION
    }
}
