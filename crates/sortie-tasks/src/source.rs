//! Task input
//!
//! [`TaskSource`] lazily turns line-delimited JSON into [`TaskRecord`]s, or
//! reads prompts one per line from an interactive session when no input file
//! is given.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::task::TaskRecord;

/// Keys searched, in order, for the prompt text
pub const PROMPT_KEYS: &[&str] = &[
    "question",
    "Question",
    "task",
    "Task",
    "query",
    "Query",
    "instruction",
    "Instruction",
];

/// Keys searched, in order, for the gold answer
pub const ANSWER_KEYS: &[&str] = &["Final answer", "answer", "true_answer"];

/// Key holding the attached file name
pub const FILE_KEY: &str = "file_name";

/// Key marking a task as hard
pub const SKIP_KEY: &str = "skip";

/// Line that ends an interactive session
pub const END_SENTINEL: &str = "__END__";

/// Prompt shown in interactive mode
pub const INTERACTIVE_PROMPT: &str = "Input your task prompt >> ";

/// Errors reading task input
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The input file does not exist or cannot be opened
    #[error("Cannot open task input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from the input failed mid-stream
    #[error("Task input IO error: {0}")]
    Io(#[from] std::io::Error),
}

enum Mode {
    Records {
        reader: Box<dyn BufRead + Send>,
        line_no: usize,
    },
    Interactive {
        reader: Box<dyn BufRead + Send>,
        prompt: Box<dyn Write + Send>,
    },
}

/// Lazy sequence of tasks
pub struct TaskSource {
    mode: Mode,
    next_index: usize,
    done: bool,
}

impl TaskSource {
    /// Read tasks from a line-delimited JSON file
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "reading tasks from file");
        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Read tasks from any line-delimited JSON reader
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            mode: Mode::Records {
                reader: Box::new(reader),
                line_no: 0,
            },
            next_index: 0,
            done: false,
        }
    }

    /// Read prompts interactively, writing the prompt marker to `prompt`
    pub fn interactive(
        reader: impl BufRead + Send + 'static,
        prompt: impl Write + Send + 'static,
    ) -> Self {
        Self {
            mode: Mode::Interactive {
                reader: Box::new(reader),
                prompt: Box::new(prompt),
            },
            next_index: 0,
            done: false,
        }
    }

    /// Interactive source on the process stdin/stdout
    pub fn stdin() -> Self {
        Self::interactive(BufReader::new(std::io::stdin()), std::io::stdout())
    }

    /// File source when a path is given, interactive otherwise
    pub fn from_path(path: Option<&Path>) -> Result<Self, SourceError> {
        match path {
            Some(p) => Self::open(p),
            None => Ok(Self::stdin()),
        }
    }

    fn emit(&mut self, build: impl FnOnce(usize) -> TaskRecord) -> TaskRecord {
        let task = build(self.next_index);
        self.next_index += 1;
        task
    }

    fn next_record(&mut self) -> Option<Result<TaskRecord, SourceError>> {
        loop {
            let Mode::Records { reader, line_no } = &mut self.mode else {
                return None;
            };

            let mut bytes = Vec::new();
            match reader.read_until(b'\n', &mut bytes) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            *line_no += 1;
            let current_line = *line_no;

            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        line = current_line,
                        error = %e,
                        "skipping task line that is not UTF-8"
                    );
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(line.trim()) {
                Ok(v) => v,
                Err(e) => {
                    warn!(line = current_line, error = %e, "skipping malformed task line");
                    continue;
                }
            };

            let index = self.next_index;
            match task_from_value(value, index) {
                Some(task) => return Some(Ok(self.emit(|_| task))),
                None => {
                    warn!(line = current_line, "cannot find task prompt, skipping line");
                }
            }
        }
    }

    fn next_interactive(&mut self) -> Option<Result<TaskRecord, SourceError>> {
        loop {
            let Mode::Interactive { reader, prompt } = &mut self.mode else {
                return None;
            };

            if let Err(e) = prompt.write_all(INTERACTIVE_PROMPT.as_bytes()) {
                return Some(Err(e.into()));
            }
            if let Err(e) = prompt.flush() {
                return Some(Err(e.into()));
            }

            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if text == END_SENTINEL {
                return None;
            }
            let text = text.to_string();
            return Some(Ok(self.emit(|index| TaskRecord::new(index, text))));
        }
    }
}

impl Iterator for TaskSource {
    type Item = Result<TaskRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.mode {
            Mode::Records { .. } => self.next_record(),
            Mode::Interactive { .. } => self.next_interactive(),
        };
        if item.is_none() {
            self.done = true;
        }
        item
    }
}

/// Build a task from one input object. Returns `None` when no prompt is found.
pub fn task_from_value(value: Value, index: usize) -> Option<TaskRecord> {
    let fields = match value.get("info") {
        Some(Value::Object(info)) => info,
        Some(_) => return None,
        None => value.as_object()?,
    };

    let prompt = first_hit(fields, PROMPT_KEYS).filter(|p| !p.is_empty())?;
    let file_ref = first_hit(fields, &[FILE_KEY]);
    let gold_answer = first_hit(fields, ANSWER_KEYS);
    let skip = first_hit(fields, &[SKIP_KEY]).is_some_and(|s| s == "1");

    let mut task = TaskRecord::new(index, prompt).with_skip(skip);
    task.file_ref = file_ref;
    task.gold_answer = gold_answer;
    Some(task.with_original(value))
}

fn first_hit(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.is_null())
        .map(value_to_string)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
