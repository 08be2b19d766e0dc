//! Progress reporting: a narrow protocol implemented by a silent no-op
//! reporter (default) and a terminal reporter with a background render
//! loop. No component instantiates a global singleton; a reporter is
//! threaded through constructors instead.

#[cfg(feature = "cli")]
pub mod terminal;

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "cli")]
pub use terminal::TerminalReporter;

/// The kind of work a task represents, used for namespacing task IDs and
/// for choosing which rendering lane a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ApiFetching,
    Download,
    Verification,
    IconExtraction,
    Installation,
    Update,
}

impl TaskKind {
    /// Short slug used in namespaced task IDs (`dl_<n>_<slug>`).
    pub fn prefix(self) -> &'static str {
        match self {
            TaskKind::ApiFetching => "api",
            TaskKind::Download => "dl",
            TaskKind::Verification => "vf",
            TaskKind::IconExtraction => "ic",
            TaskKind::Installation => "in",
            TaskKind::Update => "up",
        }
    }

    /// Which visible lane this task kind renders under.
    pub fn lane(self) -> Lane {
        match self {
            TaskKind::ApiFetching => Lane::Api,
            TaskKind::Download => Lane::Downloads,
            TaskKind::Verification
            | TaskKind::IconExtraction
            | TaskKind::Installation
            | TaskKind::Update => Lane::PostProcessing,
        }
    }
}

/// The three visible rendering lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Api,
    Downloads,
    PostProcessing,
}

/// Opaque, namespaced task identifier (`dl_3_obsidian`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Allocates the next namespaced task id for `kind`/`name`. IDs are unique
/// per process for the lifetime of the counter; a session boundary does
/// not reset it (see [`reset_ids`] for the test-only escape hatch).
pub fn next_task_id(kind: TaskKind, name: &str) -> TaskId {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    TaskId(format!("{}_{}_{}", kind.prefix(), n, slugify(name)))
}

/// Resets the ID counter. Intended for tests that need deterministic IDs
/// across otherwise-isolated cases; not used by production code paths.
#[doc(hidden)]
pub fn reset_ids() {
    NEXT_ID.store(0, Ordering::Relaxed);
}

/// A snapshot of one task's progress, returned by [`ProgressReporter::get_task_info`].
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub completed: u64,
    pub total: Option<u64>,
    pub description: Option<String>,
}

/// The narrow protocol every component observes the progress reporter
/// through. A no-op implementation is the default; a terminal
/// implementation renders to the console.
pub trait ProgressReporter: Send + Sync {
    /// Whether this reporter is actively rendering (vs. a no-op / piped
    /// output context).
    fn is_active(&self) -> bool;

    /// Registers a new task and returns its id.
    fn add_task(
        &self,
        name: &str,
        kind: TaskKind,
        total: Option<u64>,
        description: Option<String>,
        parent_task_id: Option<&TaskId>,
        phase: Option<u32>,
        total_phases: Option<u32>,
    ) -> TaskId;

    /// Updates a task's progress. Safe to call from any task.
    fn update_task(
        &self,
        task_id: &TaskId,
        completed: Option<u64>,
        total: Option<u64>,
        description: Option<String>,
    );

    /// Marks a task finished. Idempotent: a second call is a no-op.
    fn finish_task(&self, task_id: &TaskId, success: bool, description: Option<String>);

    /// Cheap, non-blocking read of a task's current state.
    fn get_task_info(&self, task_id: &TaskId) -> Option<TaskInfo>;
}

/// A reporter that records nothing and returns stable placeholder task
/// IDs. Used for scripts, piping, and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn is_active(&self) -> bool {
        false
    }

    fn add_task(
        &self,
        name: &str,
        kind: TaskKind,
        _total: Option<u64>,
        _description: Option<String>,
        _parent_task_id: Option<&TaskId>,
        _phase: Option<u32>,
        _total_phases: Option<u32>,
    ) -> TaskId {
        TaskId(format!("{}_noop_{}", kind.prefix(), slugify(name)))
    }

    fn update_task(
        &self,
        _task_id: &TaskId,
        _completed: Option<u64>,
        _total: Option<u64>,
        _description: Option<String>,
    ) {
    }

    fn finish_task(&self, _task_id: &TaskId, _success: bool, _description: Option<String>) {}

    fn get_task_info(&self, _task_id: &TaskId) -> Option<TaskInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_under_heavy_load() {
        reset_ids();
        let mut seen = std::collections::HashSet::new();
        for i in 0..10_000 {
            let id = next_task_id(TaskKind::Download, &format!("item{i}"));
            assert!(seen.insert(id.0));
        }
    }

    #[test]
    fn reset_ids_changes_subsequent_allocations() {
        reset_ids();
        let first = next_task_id(TaskKind::Download, "same");
        let second = next_task_id(TaskKind::Download, "same");
        assert_ne!(first, second);
    }
}
