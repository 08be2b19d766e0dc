//! Terminal progress reporter: three rendering lanes (API / Downloads /
//! Post-processing), a single background render loop, log suppression
//! while active.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing_subscriber::reload;
use tracing_subscriber::{EnvFilter, Registry};

use super::{Lane, ProgressReporter, TaskId, TaskInfo, TaskKind, next_task_id};

const REFRESH_HZ: u64 = 4;
const PROGRESS_CHARS: &str = "=> ";

fn style_for(lane: Lane) -> ProgressStyle {
    match lane {
        Lane::Api => ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("template is valid")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓"),
        Lane::Downloads => ProgressStyle::with_template(
            "{msg:.bold} [{bar:30.blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta} left)",
        )
        .expect("template is valid")
        .progress_chars(PROGRESS_CHARS),
        Lane::PostProcessing => ProgressStyle::with_template("{spinner:.green} {msg}")
            .expect("template is valid")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓"),
    }
}

struct TaskEntry {
    bar: ProgressBar,
    completed: u64,
    total: Option<u64>,
    description: Option<String>,
    finished: bool,
}

struct Inner {
    multi: MultiProgress,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

/// A `ProgressReporter` backed by `indicatif`. Owns a background render
/// loop ticking at a fixed refresh rate and mutes `tracing` output at
/// `INFO` and below for the duration of the session.
pub struct TerminalReporter {
    inner: Arc<Inner>,
    reload_handle: Option<reload::Handle<EnvFilter, Registry>>,
    previous_filter: Mutex<Option<EnvFilter>>,
    render_loop: Mutex<Option<JoinHandle<()>>>,
    interactive: bool,
}

impl TerminalReporter {
    /// Builds a reporter. `reload_handle` lets the session mute ambient
    /// logging while active; pass `None` to skip suppression (tests, or a
    /// binary that didn't install a reload layer).
    pub fn new(reload_handle: Option<reload::Handle<EnvFilter, Registry>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                multi: MultiProgress::new(),
                tasks: Mutex::new(HashMap::new()),
            }),
            reload_handle,
            previous_filter: Mutex::new(None),
            render_loop: Mutex::new(None),
            interactive: std::io::stderr().is_terminal(),
        }
    }

    /// Starts the session: spawns the render loop and mutes logging.
    pub fn start_session(&self, _total_operations: Option<u64>) {
        if let Some(handle) = &self.reload_handle {
            let quiet = EnvFilter::new("warn");
            if let Ok(current) = handle.with_current(|f| f.to_string()) {
                *self.previous_filter.lock().unwrap() = Some(EnvFilter::new(current));
            }
            let _ = handle.reload(quiet);
        }

        let inner = self.inner.clone();
        let handle = tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(1000 / REFRESH_HZ));
            loop {
                interval.tick().await;
                let tasks = inner.tasks.lock().unwrap();
                if tasks.values().all(|t| t.finished) && !tasks.is_empty() {
                    break;
                }
            }
        });

        *self.render_loop.lock().unwrap() = Some(handle);
    }

    /// Stops the session: cancels the render loop, does a final cleanup
    /// render, and restores the previous logging filter.
    pub fn stop_session(&self) {
        if let Some(handle) = self.render_loop.lock().unwrap().take() {
            handle.abort();
        }

        self.inner.multi.clear().ok();

        if let Some(handle) = &self.reload_handle
            && let Some(previous) = self.previous_filter.lock().unwrap().take()
        {
            let _ = handle.reload(previous);
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn is_active(&self) -> bool {
        self.render_loop.lock().unwrap().is_some()
    }

    fn add_task(
        &self,
        name: &str,
        kind: TaskKind,
        total: Option<u64>,
        description: Option<String>,
        _parent_task_id: Option<&TaskId>,
        phase: Option<u32>,
        total_phases: Option<u32>,
    ) -> TaskId {
        let id = next_task_id(kind, name);
        let lane = kind.lane();

        let bar = if self.interactive {
            self.inner.multi.add(ProgressBar::new(total.unwrap_or(0)))
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(style_for(lane));

        let msg = match (phase, total_phases) {
            (Some(p), Some(t)) => format!("({p}/{t}) {}", description.clone().unwrap_or_else(|| name.to_string())),
            _ => description.clone().unwrap_or_else(|| name.to_string()),
        };
        bar.set_message(msg);
        if matches!(lane, Lane::PostProcessing | Lane::Api) {
            bar.enable_steady_tick(Duration::from_millis(120));
        }

        self.inner.tasks.lock().unwrap().insert(
            id.clone(),
            TaskEntry {
                bar,
                completed: 0,
                total,
                description,
                finished: false,
            },
        );

        id
    }

    fn update_task(
        &self,
        task_id: &TaskId,
        completed: Option<u64>,
        total: Option<u64>,
        description: Option<String>,
    ) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(task_id) {
            if let Some(c) = completed {
                entry.completed = c;
                entry.bar.set_position(c);
            }
            if let Some(t) = total {
                entry.total = Some(t);
                entry.bar.set_length(t);
            }
            if let Some(d) = description {
                entry.bar.set_message(d.clone());
                entry.description = Some(d);
            }
        }
    }

    fn finish_task(&self, task_id: &TaskId, success: bool, description: Option<String>) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(task_id) {
            if entry.finished {
                return;
            }
            entry.finished = true;
            let msg = description.unwrap_or_else(|| {
                if success { "done".to_string() } else { "failed".to_string() }
            });
            if success {
                entry.bar.finish_with_message(msg);
            } else {
                entry.bar.abandon_with_message(msg);
            }
        }
    }

    fn get_task_info(&self, task_id: &TaskId) -> Option<TaskInfo> {
        let tasks = self.inner.tasks.lock().unwrap();
        tasks.get(task_id).map(|entry| TaskInfo {
            completed: entry.completed,
            total: entry.total,
            description: entry.description.clone(),
        })
    }
}
