//! Solver session model
//!
//! A [`Session`] is whatever the solver returns for one prompt. The engine
//! treats it as opaque apart from two places: it reads the final answer from
//! the last step, and it writes timing and usage data into `info`. Every other
//! field is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Answer string used when a session has no readable final output
pub const ERROR_ANSWER: &str = "error";

/// Structured result of one solver invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Recorded steps, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Value>,

    /// Run metadata (timing, call statistics)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub info: Map<String, Value>,

    /// Fields the engine does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    /// Session standing in for a task where no attempt succeeded
    pub fn error_placeholder() -> Self {
        Self {
            steps: vec![serde_json::json!({
                "step_idx": -1,
                "end": {
                    "final_results": {
                        "output": ERROR_ANSWER,
                        "log": ERROR_ANSWER,
                    }
                }
            })],
            ..Default::default()
        }
    }

    /// Session recording a task-level failure
    pub fn critical(message: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("error".to_string(), Value::String(message.into()));
        Self {
            extra,
            ..Default::default()
        }
    }

    /// Error message of a [`Session::critical`] session
    pub fn error_message(&self) -> Option<&str> {
        self.extra.get("error").and_then(Value::as_str)
    }

    /// Terminal output of the last step, if present
    pub fn final_output(&self) -> Option<String> {
        let output = self.steps.last()?.pointer("/end/final_results/output")?;
        match output {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Predicted answer used for scoring
    pub fn predicted_answer(&self) -> String {
        self.final_output()
            .unwrap_or_else(|| ERROR_ANSWER.to_string())
    }

    /// Insert or replace an `info` entry
    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.info.insert(key.into(), value.into());
    }
}

/// Usage statistics reported by a solver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    /// Solver invocations
    pub calls: u64,
    /// Invocations that returned an error
    pub failures: u64,
    /// Wall-clock seconds spent inside the solver
    pub elapsed_secs: f64,
    /// Solver-specific counters (tokens, cost, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_with_output(output: Value) -> Session {
        serde_json::from_value(json!({
            "steps": [
                {"step_idx": 0, "action": "search"},
                {"step_idx": 1, "end": {"final_results": {"output": output, "log": "done"}}}
            ],
            "task": "q"
        }))
        .unwrap()
    }

    #[test]
    fn test_final_output_string() {
        let session = session_with_output(json!("Paris"));
        assert_eq!(session.final_output().as_deref(), Some("Paris"));
        assert_eq!(session.predicted_answer(), "Paris");
    }

    #[test]
    fn test_final_output_number() {
        let session = session_with_output(json!(42));
        assert_eq!(session.predicted_answer(), "42");
    }

    #[test]
    fn test_missing_output_is_error() {
        let session: Session =
            serde_json::from_value(json!({"steps": [{"step_idx": 0}]})).unwrap();
        assert_eq!(session.predicted_answer(), "error");
        assert_eq!(Session::default().predicted_answer(), "error");
        assert_eq!(session_with_output(Value::Null).predicted_answer(), "error");
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let session = session_with_output(json!("x"));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["task"], "q");
    }

    #[test]
    fn test_error_placeholder_shape() {
        let session = Session::error_placeholder();
        assert_eq!(session.predicted_answer(), "error");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["steps"][0]["step_idx"], -1);
        assert_eq!(value["steps"][0]["end"]["final_results"]["log"], "error");
    }

    #[test]
    fn test_critical_session() {
        let session = Session::critical("boom");
        assert_eq!(session.error_message(), Some("boom"));
        assert_eq!(serde_json::to_value(&session).unwrap(), json!({"error": "boom"}));
    }

    #[test]
    fn test_empty_session_serializes_to_empty_object() {
        assert_eq!(serde_json::to_value(Session::default()).unwrap(), json!({}));
    }
}
