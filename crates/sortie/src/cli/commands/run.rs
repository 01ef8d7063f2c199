//! Run command: drive a batch of tasks through the solver

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sortie_core::config::{
    apply_overrides, load_config, load_config_or_default, Config, EvaluationMethod,
    InferenceEvaluation, RunConfig, FILE_BASE_DIR_ENV,
};
use sortie_core::{RunError, SortieError};
use sortie_tasks::{
    run_batch, AnswerEvaluator, AttemptController, AttemptPolicy, BatchError, BatchOptions,
    BatchSummary, CommandEvaluator, CommandSolver, Evaluator, SchedulerOptions, TaskEvent,
    TaskRecord, TaskReporter, TaskReporterRegistry, TaskScheduler, TaskSource,
};

use crate::cli::{output, Cli, OutputFormat};

/// Run a batch of tasks through the solver
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Configuration file (default: discovered from the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override a configuration value, e.g. `run.max_retries=5` (repeatable)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Line-delimited JSON task file; prompts are read from stdin when omitted
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Result journal; existing results in it are reused
    #[arg(short, long)]
    pub output: PathBuf,

    /// Maximum concurrent tasks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Skip tasks before this position in the input
    #[arg(long = "starting-idx")]
    pub starting_idx: Option<usize>,

    /// Skip tasks marked as hard without running them
    #[arg(long)]
    pub skip_hard_query: bool,

    /// Sample until the completion check passes
    #[arg(long)]
    pub sampling_mode: bool,

    /// Completion check in sampling mode
    #[arg(long)]
    pub evaluation_method: Option<EvaluationMethod>,

    /// Evaluator used for retries and ensembling
    #[arg(long = "inference-time-evaluation-method")]
    pub inference_evaluation: Option<InferenceEvaluation>,

    /// Maximum attempts per candidate
    #[arg(long = "max-retry-num")]
    pub max_retries: Option<u32>,

    /// Feed the last failure back into the prompt on retry
    #[arg(long)]
    pub reflection: bool,

    /// Keep failed attempts in the result
    #[arg(long)]
    pub save_failed_tries: bool,

    /// Ignore results already in the output journal
    #[arg(long)]
    pub no_preload: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let config = self.resolve_config(&cwd)?;
        info!(
            output = %self.output.display(),
            concurrency = config.run.concurrency,
            inference_evaluation = %config.run.inference_evaluation,
            sampling_mode = config.run.sampling_mode,
            "executing run command"
        );

        // Read all tasks up front; interactive input must finish before the run starts
        let tasks = self.read_tasks()?;

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli, &cwd, config, tasks))
    }

    async fn execute_async(
        &self,
        cli: &Cli,
        cwd: &Path,
        config: Config,
        tasks: Vec<TaskRecord>,
    ) -> anyhow::Result<()> {
        let solver = CommandSolver::from_config(&config.solver)
            .ok_or(SortieError::Run(RunError::NoSolver))?;
        let policy = AttemptPolicy::from(&config.run);

        let mut registry = TaskReporterRegistry::new();
        if cli.show_text() {
            registry.register(ConsoleReporter::new(cli.verbose));
        }
        let reporter: Arc<dyn TaskReporter> = Arc::new(registry);

        let mut controller = AttemptController::new(Arc::new(solver), policy.clone())
            .with_reporter(reporter.clone());
        if let Some(dir) = self.file_base_dir(cwd) {
            controller = controller.with_file_base_dir(dir);
        }
        if policy.needs_evaluator() {
            let evaluator: Arc<dyn Evaluator> = match &config.evaluator.command {
                Some(command) => Arc::new(
                    CommandEvaluator::new(command.clone()).with_env(config.solver.env.clone()),
                ),
                None => Arc::new(AnswerEvaluator),
            };
            controller = controller.with_evaluator(evaluator);
        }

        let scheduler = TaskScheduler::new(
            SchedulerOptions::from(&config.run),
            Arc::new(controller),
            reporter,
        );
        let options = BatchOptions {
            output: self.output.clone(),
            preload_output: config.run.preload_output,
            starting_index: config.run.starting_index,
        };

        let summary = run_batch(tasks, &options, &scheduler)
            .await
            .map_err(|e| match e {
                BatchError::Journal(e) => anyhow::Error::from(SortieError::Run(
                    RunError::JournalUnavailable {
                        path: self.output.clone(),
                        reason: e.to_string(),
                    },
                )),
                other => anyhow::Error::from(other),
            })
            .with_context(|| format!("Run over {} failed", self.output.display()))?;

        self.print_summary(cli, &summary)
    }

    /// Load the configuration file, then apply flags and `--set` overrides
    fn resolve_config(&self, cwd: &Path) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => load_config_or_default(cwd).0,
        };
        self.apply_flags(&mut config.run);
        apply_overrides(&mut config, &self.overrides)?;
        Ok(config)
    }

    fn apply_flags(&self, run: &mut RunConfig) {
        if let Some(concurrency) = self.concurrency {
            run.concurrency = concurrency;
        }
        if let Some(index) = self.starting_idx {
            run.starting_index = index;
        }
        if let Some(method) = self.evaluation_method {
            run.evaluation_method = method;
        }
        if let Some(method) = self.inference_evaluation {
            run.inference_evaluation = method;
        }
        if let Some(retries) = self.max_retries {
            run.max_retries = retries;
        }
        run.skip_hard_query |= self.skip_hard_query;
        run.sampling_mode |= self.sampling_mode;
        run.reflection |= self.reflection;
        run.save_failed_tries |= self.save_failed_tries;
        if self.no_preload {
            run.preload_output = false;
        }
    }

    fn read_tasks(&self) -> anyhow::Result<Vec<TaskRecord>> {
        if let Some(input) = &self.input {
            if !input.exists() {
                return Err(SortieError::Run(RunError::InputNotFound(input.clone())).into());
            }
        }
        let source = TaskSource::from_path(self.input.as_deref())?;
        let tasks = source
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read tasks")?;
        info!(count = tasks.len(), "tasks loaded");
        Ok(tasks)
    }

    /// `FILE_BASE_DIR`, or the input file's directory
    fn file_base_dir(&self, cwd: &Path) -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os(FILE_BASE_DIR_ENV) {
            return Some(PathBuf::from(dir));
        }
        let input = self.input.as_ref()?;
        let absolute = if input.is_absolute() {
            input.clone()
        } else {
            cwd.join(input)
        };
        absolute.parent().map(Path::to_path_buf)
    }

    fn print_summary(&self, cli: &Cli, summary: &BatchSummary) -> anyhow::Result<()> {
        let execution = &summary.execution;

        if cli.format == OutputFormat::Json {
            let report = serde_json::json!({
                "output": self.output,
                "total": summary.total,
                "already_processed": summary.already_processed,
                "executed": execution.total,
                "correct": execution.correct,
                "failed": execution.failed,
                "skipped": execution.skipped,
                "write_errors": execution.write_errors,
                "duration_secs": execution.duration.as_secs_f64(),
                "accuracy": {
                    "correct": summary.accuracy.correct,
                    "total": summary.accuracy.total,
                    "ratio": summary.accuracy.ratio(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if execution.write_errors > 0 {
            output::warning(&format!(
                "{} result{} could not be written to {}",
                execution.write_errors,
                if execution.write_errors == 1 { "" } else { "s" },
                self.output.display()
            ));
        }

        if summary.accuracy.total > 0 {
            if cli.quiet {
                println!("{}", summary.accuracy);
            } else {
                println!(
                    "Final Accuracy = {}/{}={}",
                    summary.accuracy.correct,
                    summary.accuracy.total,
                    output::accuracy(summary.accuracy.ratio())
                );
            }
        }
        Ok(())
    }
}

/// Console reporter with a progress bar
struct ConsoleReporter {
    verbose: bool,
    bar: ProgressBar,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { verbose, bar }
    }

    fn line(&self, text: String) {
        self.bar.println(text);
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::BatchStarted {
                total,
                already_processed,
                pending,
            } => {
                self.line(format!(
                    "{} {} task{}, {} already processed, {} to run",
                    style("→").blue(),
                    total,
                    if *total == 1 { "" } else { "s" },
                    already_processed,
                    pending
                ));
                self.bar.set_length(*pending as u64);
                self.bar.enable_steady_tick(std::time::Duration::from_millis(120));
            }
            TaskEvent::Started { id } => {
                if self.verbose {
                    self.line(format!("  {} {}", style("▸").dim(), style(id).bold()));
                }
                self.bar.set_message(id.clone());
            }
            TaskEvent::Retrying {
                id,
                attempt,
                feedback,
            } => {
                if self.verbose {
                    self.line(format!(
                        "  {} {} attempt {} failed{}",
                        style("↻").yellow(),
                        style(id).yellow(),
                        attempt,
                        feedback
                            .as_deref()
                            .map(|f| style(format!(": {}", f)).dim().to_string())
                            .unwrap_or_default()
                    ));
                }
            }
            TaskEvent::Completed {
                id,
                duration,
                correct,
            } => {
                self.bar.inc(1);
                if self.verbose {
                    let mark = if *correct {
                        style("✓").green()
                    } else {
                        style("✗").red()
                    };
                    self.line(format!(
                        "  {} {} {}",
                        mark,
                        id,
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    ));
                }
            }
            TaskEvent::Skipped { id, reason } => {
                self.bar.inc(1);
                if self.verbose {
                    self.line(format!(
                        "  {} {} {}",
                        style("○").yellow(),
                        style(id).yellow(),
                        style(format!("({})", reason)).dim()
                    ));
                }
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => {
                self.bar.inc(1);
                self.line(format!(
                    "  {} {} {} {}",
                    style("✗").red().bold(),
                    style(id).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                ));
            }
            TaskEvent::AllCompleted {
                total,
                correct,
                failed,
                skipped,
                duration,
            } => {
                self.bar.finish_and_clear();
                println!(
                    "  {} {}/{} correct, {} failed, {} skipped ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    correct,
                    total,
                    failed,
                    skipped,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
