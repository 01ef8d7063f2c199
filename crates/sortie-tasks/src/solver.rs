//! Solver seam
//!
//! The engine reaches the external agent only through [`Solver`]. The
//! [`CommandSolver`] adapter runs a shell command per attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use sortie_core::config::SolverConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::session::{CallStats, Session};

/// Errors from a solver invocation
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Solver exited with code {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("Solver produced invalid session JSON: {0}")]
    InvalidOutput(#[source] serde_json::Error),

    #[error("Solver IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// An agent that turns a prompt into a session
#[async_trait]
pub trait Solver: Send + Sync {
    /// Solve one prompt
    async fn run(&self, prompt: &str) -> Result<Session, SolverError>;

    /// Usage statistics since the last clear
    fn call_stats(&self, clear: bool) -> CallStats;
}

/// Solver that runs a shell command per attempt.
///
/// The prompt is written to the command's stdin; stdout must be a session
/// JSON object.
pub struct CommandSolver {
    command: String,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    stats: Mutex<CallStats>,
}

impl CommandSolver {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
            working_dir: None,
            stats: Mutex::new(CallStats::default()),
        }
    }

    /// Build from the `solver` config section; `None` when no command is set
    pub fn from_config(config: &SolverConfig) -> Option<Self> {
        let command = config.command.as_deref()?;
        let mut solver = Self::new(command);
        solver.env = config.env.clone();
        solver.working_dir = config.working_dir.clone();
        Some(solver)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn record_call(&self, elapsed_secs: f64, failed: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.calls += 1;
        stats.elapsed_secs += elapsed_secs;
        if failed {
            stats.failures += 1;
        }
    }
}

#[async_trait]
impl Solver for CommandSolver {
    async fn run(&self, prompt: &str) -> Result<Session, SolverError> {
        let start = Instant::now();
        let result = run_shell(
            &self.command,
            prompt.as_bytes(),
            &self.env,
            self.working_dir.as_deref(),
        )
        .await
        .and_then(|stdout| {
            serde_json::from_slice::<Session>(&stdout).map_err(SolverError::InvalidOutput)
        });

        self.record_call(start.elapsed().as_secs_f64(), result.is_err());
        result
    }

    fn call_stats(&self, clear: bool) -> CallStats {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        if clear {
            std::mem::take(&mut *stats)
        } else {
            stats.clone()
        }
    }
}

/// Run `sh -c command`, feed `input` on stdin and return stdout
pub(crate) async fn run_shell(
    command: &str,
    input: &[u8],
    env: &HashMap<String, String>,
    working_dir: Option<&Path>,
) -> Result<Vec<u8>, SolverError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| SolverError::Spawn {
        command: command.to_string(),
        source,
    })?;

    // Feed stdin while stdout and stderr are drained; a child that fills an
    // output pipe before reading all of its input would otherwise stall.
    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(input).await {
            // A command that never reads stdin closes the pipe early
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            result => result,
        }
        // stdin dropped here, closing the pipe
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    fed?;
    debug!(
        command,
        status = ?output.status.code(),
        stdout_bytes = output.stdout.len(),
        "subprocess finished"
    );

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(SolverError::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
