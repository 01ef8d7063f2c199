//! Evaluator seam
//!
//! An [`Evaluator`] decides whether a session failed (driving retries) and
//! picks one session out of several candidates (ensembling).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scorer::normalize_str;
use crate::session::{Session, ERROR_ANSWER};
use crate::solver::{run_shell, SolverError};

/// Errors from an evaluator
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Evaluator command failed: {0}")]
    Command(#[from] SolverError),

    #[error("Evaluator returned an invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("No candidates to ensemble")]
    NoCandidates,

    #[error("Ensemble picked index {index} out of {len} candidates")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Judges solver sessions
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Returns `(has_failure, feedback)`
    async fn detect_failure(
        &self,
        session: &Session,
        evaluation_type: &str,
    ) -> Result<(bool, Option<String>), EvaluatorError>;

    /// Index of the preferred session
    async fn ensemble(&self, sessions: &[Session]) -> Result<usize, EvaluatorError>;
}

/// Built-in evaluator that only checks for a usable final answer.
///
/// A session fails when its final output is missing, empty, `"error"` or
/// `"NA"`. Ensembling is a majority vote over normalized answers; ties go to
/// the answer seen first.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnswerEvaluator;

const PLACEHOLDER_ANSWERS: &[&str] = &[ERROR_ANSWER, "NA"];

#[async_trait]
impl Evaluator for AnswerEvaluator {
    async fn detect_failure(
        &self,
        session: &Session,
        evaluation_type: &str,
    ) -> Result<(bool, Option<String>), EvaluatorError> {
        debug!(evaluation_type, "checking for a final answer");
        let verdict = match session.final_output() {
            None => (
                true,
                Some("The previous attempt ended without a final answer.".to_string()),
            ),
            Some(output) if output.trim().is_empty() => (
                true,
                Some("The previous attempt returned an empty answer.".to_string()),
            ),
            Some(output) if PLACEHOLDER_ANSWERS.contains(&output.trim()) => (
                true,
                Some(format!(
                    "The previous attempt returned `{}` instead of an answer.",
                    output.trim()
                )),
            ),
            Some(_) => (false, None),
        };
        Ok(verdict)
    }

    async fn ensemble(&self, sessions: &[Session]) -> Result<usize, EvaluatorError> {
        if sessions.is_empty() {
            return Err(EvaluatorError::NoCandidates);
        }

        let answers: Vec<String> = sessions
            .iter()
            .map(|s| normalize_str(&s.predicted_answer(), true))
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for answer in &answers {
            *counts.entry(answer.as_str()).or_default() += 1;
        }

        // First index holding the highest count
        let mut best = 0;
        for (i, answer) in answers.iter().enumerate() {
            if counts[answer.as_str()] > counts[answers[best].as_str()] {
                best = i;
            }
        }
        debug!(picked = best, votes = counts[answers[best].as_str()], "ensemble vote");
        Ok(best)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CommandRequest<'a> {
    DetectFailure {
        evaluation_type: &'a str,
        session: &'a Session,
    },
    Ensemble {
        sessions: &'a [Session],
    },
}

#[derive(Debug, Deserialize)]
struct FailureResponse {
    has_failure: bool,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnsembleResponse {
    index: usize,
}

/// Evaluator backed by an external command.
///
/// Each call runs the command once with a JSON request on stdin:
/// `{"op": "detect_failure", "evaluation_type": .., "session": ..}` expecting
/// `{"has_failure": bool, "feedback": string|null}`, or
/// `{"op": "ensemble", "sessions": [..]}` expecting `{"index": n}`.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    command: String,
    env: HashMap<String, String>,
}

impl CommandEvaluator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    async fn call(&self, request: &CommandRequest<'_>) -> Result<Vec<u8>, EvaluatorError> {
        let input = serde_json::to_vec(request)?;
        Ok(run_shell(&self.command, &input, &self.env, None).await?)
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn detect_failure(
        &self,
        session: &Session,
        evaluation_type: &str,
    ) -> Result<(bool, Option<String>), EvaluatorError> {
        let stdout = self
            .call(&CommandRequest::DetectFailure {
                evaluation_type,
                session,
            })
            .await?;
        let response: FailureResponse = serde_json::from_slice(&stdout)?;
        Ok((response.has_failure, response.feedback))
    }

    async fn ensemble(&self, sessions: &[Session]) -> Result<usize, EvaluatorError> {
        if sessions.is_empty() {
            return Err(EvaluatorError::NoCandidates);
        }
        let stdout = self.call(&CommandRequest::Ensemble { sessions }).await?;
        let response: EnsembleResponse = serde_json::from_slice(&stdout)?;
        Ok(response.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answered(output: serde_json::Value) -> Session {
        serde_json::from_value(json!({
            "steps": [{"end": {"final_results": {"output": output}}}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_answer_evaluator_failures() {
        let evaluator = AnswerEvaluator;

        for session in [
            Session::default(),
            answered(json!("")),
            answered(json!("  ")),
            answered(json!("error")),
            answered(json!("NA")),
            Session::error_placeholder(),
        ] {
            let (failed, feedback) = evaluator.detect_failure(&session, "no_answer").await.unwrap();
            assert!(failed);
            assert!(feedback.is_some());
        }
    }

    #[tokio::test]
    async fn test_answer_evaluator_success() {
        let (failed, feedback) = AnswerEvaluator
            .detect_failure(&answered(json!("Paris")), "no_answer+no_ask_llm")
            .await
            .unwrap();
        assert!(!failed);
        assert!(feedback.is_none());
    }

    #[tokio::test]
    async fn test_majority_vote() {
        let sessions = vec![
            answered(json!("Rome")),
            answered(json!("paris")),
            answered(json!("Berlin")),
            answered(json!("Paris.")),
        ];
        assert_eq!(AnswerEvaluator.ensemble(&sessions).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_vote_tie_goes_to_first() {
        let sessions = vec![
            answered(json!("a")),
            answered(json!("b")),
            answered(json!("b")),
            answered(json!("a")),
        ];
        assert_eq!(AnswerEvaluator.ensemble(&sessions).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensemble_empty() {
        assert!(matches!(
            AnswerEvaluator.ensemble(&[]).await,
            Err(EvaluatorError::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn test_command_evaluator_protocol() {
        let evaluator = CommandEvaluator::new(
            r#"req=$(cat); case "$req" in
                 *'"op":"ensemble"'*) echo '{"index": 2}' ;;
                 *'"evaluation_type":"gpt_judge"'*) echo '{"has_failure": true, "feedback": "wrong"}' ;;
                 *) echo '{"has_failure": false}' ;;
               esac"#,
        );

        let (failed, feedback) = evaluator
            .detect_failure(&Session::default(), "gpt_judge")
            .await
            .unwrap();
        assert!(failed);
        assert_eq!(feedback.as_deref(), Some("wrong"));

        let (failed, _) = evaluator
            .detect_failure(&Session::default(), "llm_score")
            .await
            .unwrap();
        assert!(!failed);

        let sessions = vec![Session::default(); 3];
        assert_eq!(evaluator.ensemble(&sessions).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_command_evaluator_bad_response() {
        let evaluator = CommandEvaluator::new("cat > /dev/null; echo nope");
        assert!(matches!(
            evaluator.detect_failure(&Session::default(), "gpt_judge").await,
            Err(EvaluatorError::InvalidResponse(_))
        ));
    }
}
