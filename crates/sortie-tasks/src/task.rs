//! Task types

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Placeholder gold answer for tasks that carry none
pub const UNKNOWN_GOLD: &str = "UNK";

/// One unit of work read from the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Sequential identifier (`task0000`, `task0001`, ...)
    pub id: String,
    /// Prompt text handed to the solver
    pub prompt: String,
    /// Attached input file, relative to the file base directory
    pub file_ref: Option<String>,
    /// Expected answer, if known
    pub gold_answer: Option<String>,
    /// Marked as hard; may be skipped without solving
    pub skip: bool,
    /// The raw input object the task was built from
    pub original: Option<serde_json::Value>,
}

impl TaskRecord {
    /// Create a task for the given emitted index
    pub fn new(index: usize, prompt: impl Into<String>) -> Self {
        Self {
            id: Self::format_id(index),
            prompt: prompt.into(),
            file_ref: None,
            gold_answer: None,
            skip: false,
            original: None,
        }
    }

    /// Format the id for an emitted index
    pub fn format_id(index: usize) -> String {
        format!("task{:04}", index)
    }

    /// Set the attached file
    pub fn with_file_ref(mut self, file: impl Into<String>) -> Self {
        self.file_ref = Some(file.into());
        self
    }

    /// Set the gold answer
    pub fn with_gold_answer(mut self, answer: impl Into<String>) -> Self {
        self.gold_answer = Some(answer.into());
        self
    }

    /// Mark the task as skippable
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Keep the raw input object
    pub fn with_original(mut self, original: serde_json::Value) -> Self {
        self.original = Some(original);
        self
    }

    /// Gold answer used for scoring
    pub fn gold_or_unknown(&self) -> String {
        self.gold_answer
            .clone()
            .unwrap_or_else(|| UNKNOWN_GOLD.to_string())
    }

    /// Prompt sent to the solver: trimmed, with the attached file path appended
    pub fn solver_prompt(&self, file_base_dir: Option<&Path>) -> String {
        let prompt = self.prompt.trim();
        match self.file_ref.as_deref().filter(|f| !f.is_empty()) {
            Some(file) => {
                let path = match file_base_dir {
                    Some(dir) => dir.join(file),
                    None => Path::new(file).to_path_buf(),
                };
                format!(
                    "{}\n(* You are given the following input file: {})",
                    prompt,
                    path.display()
                )
            }
            None => prompt.to_string(),
        }
    }
}
