//! The pipeline command surface and its single-writer state.
//!
//! [`Pipeline`] accepts start/cancel/reset commands and hands out
//! [`PipelineState`] snapshots; [`RunTracker`] is the handle the run task
//! mutates state through. No collaborator ever holds a reference into live
//! state — polling reads are clones taken under the lock.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sheetgrader_rubric::GraderRegistry;
use sheetgrader_shared::{
    PipelinePhase, PipelineState, Result, RunConfig, RunId, RunRequest, RunStatus,
    SheetGraderError,
};

use crate::pipeline::{self, RunArgs};

// ---------------------------------------------------------------------------
// RunTracker
// ---------------------------------------------------------------------------

struct TrackerInner {
    state: Mutex<PipelineState>,
    cancel: AtomicBool,
}

/// Cloneable handle to the pipeline state. The run task is the only writer;
/// everyone else calls [`RunTracker::snapshot`].
#[derive(Clone)]
pub struct RunTracker {
    inner: Arc<TrackerInner>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                state: Mutex::new(PipelineState::default()),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        // The lock is only ever held for field updates, never across await.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transition to Running if no run is active. Clears the previous run's
    /// transcript and resets the cancel flag. Returns false when a run is
    /// already in flight.
    pub(crate) fn try_begin(&self) -> bool {
        let mut state = self.state();
        if state.status == RunStatus::Running {
            return false;
        }
        *state = PipelineState {
            status: RunStatus::Running,
            ..PipelineState::default()
        };
        self.inner.cancel.store(false, Ordering::SeqCst);
        true
    }

    /// Unconditional begin, for driving the run task directly in tests.
    pub fn begin(&self) {
        if !self.try_begin() {
            warn!("begin called while a run was active");
        }
    }

    /// Cooperative cancellation: sets the flag the run task checks at phase
    /// and per-student boundaries.
    pub fn request_cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    /// Record phase entry: bumps `progress`, sets `phase`, appends the
    /// transcript line.
    pub fn enter_phase(&self, phase: PipelinePhase) {
        let mut state = self.state();
        state.phase = Some(phase);
        state.progress = state.progress.max(phase.number());
        state
            .logs
            .push(format!("[{}/8] {}", phase.number(), phase.title()));
        debug!(phase = phase.number(), title = phase.title(), "phase entered");
    }

    /// Append one line to the run transcript.
    pub fn log(&self, line: impl Into<String>) {
        self.state().logs.push(line.into());
    }

    pub fn set_output_path(&self, path: &Path) {
        self.state().output_path = Some(path.to_path_buf());
    }

    /// Terminal transition. `error` is set only for [`RunStatus::Error`].
    pub fn finish(&self, status: RunStatus, error: Option<String>) {
        let mut state = self.state();
        state.status = status;
        state.phase = None;
        state.error = error;
    }

    /// Return to Idle, dropping logs, error, and output path. Refused while
    /// a run is active.
    pub(crate) fn reset(&self) -> Result<()> {
        let mut state = self.state();
        if state.status == RunStatus::Running {
            return Err(SheetGraderError::validation(
                "cannot reset while a run is active",
            ));
        }
        *state = PipelineState::default();
        self.inner.cancel.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Immutable copy of the current state.
    pub fn snapshot(&self) -> PipelineState {
        self.state().clone()
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The grading pipeline: one instance per process, at most one run at a time.
pub struct Pipeline {
    config: RunConfig,
    tracker: RunTracker,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            tracker: RunTracker::new(),
            handle: Mutex::new(None),
        }
    }

    /// Validate the request and start the run task. Rejects synchronously
    /// with [`SheetGraderError::Validation`] when the request is bad or a
    /// run is already active; the run itself proceeds in the background.
    pub fn start(&self, request: RunRequest) -> Result<RunId> {
        validate_request(&request)?;

        if !self.tracker.try_begin() {
            return Err(SheetGraderError::validation(
                "a grading run is already active",
            ));
        }

        let run_id = RunId::new();
        self.tracker.log(format!(
            "run {run_id} started: {} / {}",
            request.course_label, request.assignment_type
        ));
        info!(%run_id, course = %request.course_label, assignment = %request.assignment_type, "run started");

        let args = RunArgs {
            run_id,
            request,
            config: self.config.clone(),
            tracker: self.tracker.clone(),
        };
        let handle = tokio::spawn(pipeline::execute(args));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(run_id)
    }

    /// Request cooperative cancellation. Idempotent; a no-op unless Running.
    pub fn cancel(&self) {
        if self.tracker.snapshot().status != RunStatus::Running {
            debug!("cancel ignored, no run active");
            return;
        }
        self.tracker.request_cancel();
        self.tracker.log("cancellation requested");
        info!("cancellation requested");
    }

    /// Return to Idle. Valid only when no run is active.
    pub fn reset(&self) -> Result<()> {
        self.tracker.reset()
    }

    /// Immutable copy of the current pipeline state.
    pub fn snapshot(&self) -> PipelineState {
        self.tracker.snapshot()
    }

    /// Wait for the in-flight run task to finish, if any.
    pub async fn wait(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "run task did not complete cleanly");
            }
        }
    }
}

fn validate_request(request: &RunRequest) -> Result<()> {
    if request.course_label.trim().is_empty() {
        return Err(SheetGraderError::validation("course label is empty"));
    }
    if !request.archive_path.is_file() {
        return Err(SheetGraderError::validation(format!(
            "archive not found: {}",
            request.archive_path.display()
        )));
    }
    // Resolving the grader here keeps unknown types out of the run task.
    GraderRegistry::new().get(&request.assignment_type)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
