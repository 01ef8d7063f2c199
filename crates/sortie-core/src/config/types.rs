//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Main configuration for Sortie
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Solver configuration
    pub solver: SolverConfig,

    /// Evaluator configuration
    pub evaluator: EvaluatorConfig,

    /// Batch run configuration
    pub run: RunConfig,
}

/// How to reach the external solver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Shell command invoked once per attempt; receives the prompt on stdin
    /// and must print a session JSON object on stdout
    pub command: Option<String>,

    /// Extra environment variables for the solver process
    pub env: HashMap<String, String>,

    /// Working directory for the solver process
    pub working_dir: Option<PathBuf>,
}

/// How to reach the external evaluator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Shell command for judge-style evaluation. When unset, the built-in
    /// answer-presence evaluator is used.
    pub command: Option<String>,
}

/// Batch run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of tasks processed concurrently
    pub concurrency: usize,

    /// Load an existing output file and skip tasks already recorded there
    pub preload_output: bool,

    /// Tasks whose position in the input is below this index are not run
    pub starting_index: usize,

    /// Skip tasks flagged as hard (`skip: "1"`) without calling the solver
    pub skip_hard_query: bool,

    /// Sampling (trajectory) mode
    pub sampling_mode: bool,

    /// Completion check used in sampling mode
    pub evaluation_method: EvaluationMethod,

    /// Inference-time evaluator driving retries and ensembling
    pub inference_evaluation: InferenceEvaluation,

    /// Maximum attempts per candidate
    pub max_retries: u32,

    /// Append the last failure feedback to the prompt on retry
    pub reflection: bool,

    /// Keep every attempt but the last on the result record
    pub save_failed_tries: bool,

    /// Candidates sought when ensembling
    pub ensemble_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            preload_output: true,
            starting_index: 0,
            skip_hard_query: false,
            sampling_mode: false,
            evaluation_method: EvaluationMethod::Disabled,
            inference_evaluation: InferenceEvaluation::Disabled,
            max_retries: 3,
            reflection: false,
            save_failed_tries: false,
            ensemble_size: 5,
        }
    }
}

/// Completion check applied in sampling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    /// No check; one attempt
    #[default]
    Disabled,
    /// Exact match of the predicted answer against the gold answer
    Em,
    /// Judge score from the external evaluator
    LlmScore,
    /// The session simply has to end with an answer
    StopWithAnswer,
}

impl EvaluationMethod {
    /// All accepted values
    pub fn all() -> &'static [EvaluationMethod] {
        &[
            Self::Disabled,
            Self::Em,
            Self::LlmScore,
            Self::StopWithAnswer,
        ]
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Em => "em",
            Self::LlmScore => "llm_score",
            Self::StopWithAnswer => "stop_with_answer",
        }
    }
}

impl fmt::Display for EvaluationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::all().iter().map(|m| m.as_str()).collect();
                format!("unknown evaluation method '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Inference-time evaluator selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferenceEvaluation {
    /// Run the solver once, no retries
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// Retry while the session has no answer
    #[serde(rename = "no_answer")]
    NoAnswer,
    /// Retry while the session has no answer or asked for help
    #[serde(rename = "no_answer+no_ask_llm")]
    NoAnswerNoAskLlm,
    /// Retry while an external judge rejects the session
    #[serde(rename = "gpt_judge")]
    GptJudge,
    /// Answer-presence retries plus ensembling
    #[serde(rename = "ensemble")]
    Ensemble,
    /// Judge retries plus ensembling
    #[serde(rename = "gpt_judge+ensemble")]
    GptJudgeEnsemble,
}

impl InferenceEvaluation {
    /// All accepted values
    pub fn all() -> &'static [InferenceEvaluation] {
        &[
            Self::Disabled,
            Self::NoAnswer,
            Self::NoAnswerNoAskLlm,
            Self::GptJudge,
            Self::Ensemble,
            Self::GptJudgeEnsemble,
        ]
    }

    /// Wire name, also passed to the evaluator as the evaluation type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::NoAnswer => "no_answer",
            Self::NoAnswerNoAskLlm => "no_answer+no_ask_llm",
            Self::GptJudge => "gpt_judge",
            Self::Ensemble => "ensemble",
            Self::GptJudgeEnsemble => "gpt_judge+ensemble",
        }
    }

    /// Whether an evaluator is consulted after each attempt
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether several candidates are collected and ensembled
    pub fn uses_ensemble(&self) -> bool {
        matches!(self, Self::Ensemble | Self::GptJudgeEnsemble)
    }

    /// Whether the method needs an external judge
    pub fn uses_judge(&self) -> bool {
        matches!(self, Self::GptJudge | Self::GptJudgeEnsemble)
    }
}

impl fmt::Display for InferenceEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceEvaluation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::all().iter().map(|m| m.as_str()).collect();
                format!(
                    "unknown inference-time evaluation method '{}' (expected one of: {})",
                    s,
                    names.join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let run = RunConfig::default();
        assert_eq!(run.concurrency, 10);
        assert!(run.preload_output);
        assert_eq!(run.max_retries, 3);
        assert_eq!(run.ensemble_size, 5);
        assert_eq!(run.inference_evaluation, InferenceEvaluation::Disabled);
    }

    #[test]
    fn test_inference_evaluation_roundtrip_names() {
        for method in InferenceEvaluation::all() {
            assert_eq!(method.as_str().parse::<InferenceEvaluation>().unwrap(), *method);
        }
        assert!("judge".parse::<InferenceEvaluation>().is_err());
    }

    #[test]
    fn test_inference_evaluation_flags() {
        assert!(!InferenceEvaluation::Disabled.is_enabled());
        assert!(InferenceEvaluation::Ensemble.uses_ensemble());
        assert!(InferenceEvaluation::GptJudgeEnsemble.uses_ensemble());
        assert!(InferenceEvaluation::GptJudgeEnsemble.uses_judge());
        assert!(!InferenceEvaluation::NoAnswer.uses_ensemble());
    }

    #[test]
    fn test_deserialize_plus_names() {
        let run: RunConfig =
            serde_yaml::from_str("inference_evaluation: \"gpt_judge+ensemble\"\n").unwrap();
        assert_eq!(run.inference_evaluation, InferenceEvaluation::GptJudgeEnsemble);
        assert_eq!(run.concurrency, 10);
    }

    #[test]
    fn test_evaluation_method_parse() {
        assert_eq!("em".parse::<EvaluationMethod>().unwrap(), EvaluationMethod::Em);
        assert_eq!(
            "stop_with_answer".parse::<EvaluationMethod>().unwrap(),
            EvaluationMethod::StopWithAnswer
        );
        assert!("exact".parse::<EvaluationMethod>().is_err());
    }
}
