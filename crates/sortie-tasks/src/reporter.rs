//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events emitted during a batch run
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// The batch is about to start
    BatchStarted {
        total: usize,
        already_processed: usize,
        pending: usize,
    },
    /// A task is starting
    Started { id: String },
    /// An attempt failed evaluation and another will follow
    Retrying {
        id: String,
        attempt: u32,
        feedback: Option<String>,
    },
    /// A task finished and was scored
    Completed {
        id: String,
        duration: Duration,
        correct: bool,
    },
    /// A task was not run
    Skipped { id: String, reason: String },
    /// A task failed with a critical error
    Failed {
        id: String,
        duration: Duration,
        error: String,
    },
    /// Every pending task has a result
    AllCompleted {
        total: usize,
        correct: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
}

/// Receives progress events from the attempt controller and the scheduler.
///
/// Called from worker tasks, so implementations must be cheap and must not block.
pub trait TaskReporter: Send + Sync {
    fn report(&self, event: &TaskEvent);
}

/// Writes every event to the `tracing` log
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        use tracing::{error, info};

        match event {
            TaskEvent::BatchStarted {
                total,
                already_processed,
                pending,
            } => info!(total, already_processed, pending, "batch started"),
            TaskEvent::Started { id } => info!(task = %id, "task started"),
            TaskEvent::Retrying {
                id,
                attempt,
                feedback,
            } => info!(
                task = %id,
                attempt,
                feedback = feedback.as_deref().unwrap_or(""),
                "attempt rejected, retrying"
            ),
            TaskEvent::Completed {
                id,
                duration,
                correct,
            } => info!(
                task = %id,
                duration_secs = duration.as_secs_f64(),
                corr = u8::from(*correct),
                "task finished"
            ),
            TaskEvent::Skipped { id, reason } => {
                info!(task = %id, reason = %reason, "task skipped")
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => error!(
                task = %id,
                duration_secs = duration.as_secs_f64(),
                error = %error,
                "task hit a critical error"
            ),
            TaskEvent::AllCompleted {
                total,
                correct,
                failed,
                skipped,
                duration,
            } => info!(
                total,
                correct,
                failed,
                skipped,
                duration_secs = duration.as_secs_f64(),
                "all pending tasks have a result"
            ),
        }
    }
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<TaskEvent> {
        self.lock().clone()
    }

    /// Ids of the tasks that reported `Retrying`, one entry per retry
    pub fn retried_ids(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Retrying { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TaskEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.lock().push(event.clone());
    }
}

/// Fans each event out to several reporters.
///
/// Starts with a [`TracingReporter`] so a run is always logged; the CLI adds
/// its console reporter on top.
pub struct TaskReporterRegistry {
    sinks: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(TracingReporter)],
        }
    }

    /// A registry with no reporters at all
    pub fn empty() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.sinks.push(Arc::new(reporter));
    }

    /// Add a reporter the caller keeps a handle to
    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.sinks.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.sinks.iter().for_each(|sink| sink.report(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrying(id: &str, attempt: u32) -> TaskEvent {
        TaskEvent::Retrying {
            id: id.to_string(),
            attempt,
            feedback: Some("no answer".to_string()),
        }
    }

    #[test]
    fn test_collecting_keeps_order() {
        let reporter = CollectingReporter::default();
        reporter.report(&TaskEvent::Started {
            id: "task0000".to_string(),
        });
        reporter.report(&retrying("task0000", 1));
        reporter.report(&TaskEvent::Completed {
            id: "task0000".to_string(),
            duration: Duration::from_millis(1500),
            correct: true,
        });

        let events = reporter.events();
        assert!(matches!(events[0], TaskEvent::Started { .. }));
        assert!(matches!(events[2], TaskEvent::Completed { correct: true, .. }));
        assert_eq!(reporter.retried_ids(), vec!["task0000"]);
    }

    #[test]
    fn test_tracing_reporter_handles_every_event() {
        let reporter = TracingReporter;
        let events = [
            TaskEvent::BatchStarted {
                total: 3,
                already_processed: 1,
                pending: 2,
            },
            retrying("task0001", 2),
            TaskEvent::Skipped {
                id: "task0002".to_string(),
                reason: "hard query".to_string(),
            },
            TaskEvent::Failed {
                id: "task0003".to_string(),
                duration: Duration::ZERO,
                error: "solver exited with code 2".to_string(),
            },
            TaskEvent::AllCompleted {
                total: 3,
                correct: 1,
                failed: 1,
                skipped: 1,
                duration: Duration::from_secs(4),
            },
        ];
        for event in &events {
            reporter.report(event);
        }
    }

    #[test]
    fn test_registry_fans_out() {
        let first = Arc::new(CollectingReporter::default());
        let second = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        assert!(registry.is_empty());
        registry.register_shared(first.clone());
        registry.register_shared(second.clone());

        let shared: Arc<dyn TaskReporter> = Arc::new(registry);
        shared.report(&retrying("task0004", 1));
        shared.report(&retrying("task0005", 3));

        assert_eq!(first.retried_ids(), vec!["task0004", "task0005"]);
        assert_eq!(first.events(), second.events());
    }

    #[test]
    fn test_new_registry_logs_by_default() {
        let mut registry = TaskReporterRegistry::new();
        assert_eq!(registry.len(), 1);
        registry.register(CollectingReporter::default());
        assert_eq!(registry.len(), 2);
    }
}
