//! Progress tracking for query execution
//!
//! Stages advance `idle -> extracting -> searching -> analyzing ->
//! generating -> completed`; `error` is reachable from any non-terminal
//! stage. The percentage never decreases within one execution and resets
//! to 0 when the next execution begins.
//!
//! State is published over a watch channel so callers can either poll
//! `snapshot()` or follow `subscribe()`. Every execution writes through its
//! own `ProgressHandle`; handles from a superseded or cancelled execution
//! are inert.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Percentage bands per stage
pub mod bands {
    pub const EXTRACTING_START: u8 = 5;
    pub const EXTRACTING_END: u8 = 15;
    pub const SEARCHING_START: u8 = 20;
    pub const PLAN_READY: u8 = 25;
    pub const SEARCHING_END: u8 = 60;
    pub const ANALYZING_START: u8 = 65;
    pub const ANALYZING_END: u8 = 80;
    pub const GENERATING: u8 = 90;
    pub const COMPLETED: u8 = 100;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Extracting,
    Searching,
    Analyzing,
    Generating,
    Completed,
    Error,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting",
            Stage::Searching => "searching",
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-specific details, kept on error for diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressDetails {
    pub message: String,
    pub papers_considered: usize,
    pub sections_planned: usize,
    pub sections_extracted: usize,
    pub current_section: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub query_id: Option<Uuid>,
    pub stage: Stage,
    pub percentage: u8,
    pub details: ProgressDetails,
    pub is_processing: bool,
    pub error: Option<String>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            query_id: None,
            stage: Stage::Idle,
            percentage: 0,
            details: ProgressDetails::default(),
            is_processing: false,
            error: None,
        }
    }
}

struct TrackerInner {
    sender: watch::Sender<ProgressState>,
    generation: AtomicU64,
}

/// Progress of the current execution for one conversation
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(ProgressState::default());
        Self {
            inner: Arc::new(TrackerInner {
                sender,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> ProgressState {
        self.inner.sender.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.inner.sender.subscribe()
    }

    /// Start a new execution: resets to idle/0 and invalidates older handles
    pub fn begin(&self, query_id: Uuid, cancel: CancellationToken) -> ProgressHandle {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.sender.send_replace(ProgressState {
            query_id: Some(query_id),
            is_processing: true,
            ..ProgressState::default()
        });

        ProgressHandle {
            tracker: self.clone(),
            generation,
            cancel,
        }
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

/// Write access to the tracker for exactly one execution
#[derive(Clone)]
pub struct ProgressHandle {
    tracker: ProgressTracker,
    generation: u64,
    cancel: CancellationToken,
}

impl ProgressHandle {
    /// Still the execution the tracker is following
    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.tracker.current_generation() == self.generation
    }

    /// Move to `stage` at `percentage`, then apply `update` to the details.
    ///
    /// A percentage below the current one is raised to it. Moving to an
    /// earlier stage, or out of a terminal stage, is rejected.
    pub fn advance<F>(&self, stage: Stage, percentage: u8, update: F) -> Result<()>
    where
        F: FnOnce(&mut ProgressDetails),
    {
        if stage == Stage::Error {
            return Err(AppError::InvalidTransition {
                from: "any".to_string(),
                to: "error via advance".to_string(),
            });
        }

        let mut outcome = Ok(());
        let generation = self.generation;
        let tracker = &self.tracker;
        let cancelled = self.cancel.is_cancelled();

        tracker.inner.sender.send_if_modified(|state| {
            if cancelled || tracker.current_generation() != generation {
                return false;
            }
            if state.stage.is_terminal() || stage < state.stage {
                outcome = Err(AppError::InvalidTransition {
                    from: state.stage.to_string(),
                    to: stage.to_string(),
                });
                return false;
            }
            if percentage < state.percentage {
                debug!(
                    requested = percentage,
                    current = state.percentage,
                    "Clamping progress percentage"
                );
            }
            state.stage = stage;
            state.percentage = percentage.clamp(state.percentage, 100);
            update(&mut state.details);
            true
        });

        outcome
    }

    /// Terminal success
    pub fn complete(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.advance(Stage::Completed, bands::COMPLETED, |details| {
            details.message = message;
            details.current_section = None;
        })?;
        self.finish_processing();
        Ok(())
    }

    /// Terminal failure. Details are kept; stage and error are overwritten.
    pub fn fail(&self, error: impl Into<String>) {
        if self.is_current() {
            self.write_error(error.into());
        }
    }

    /// Record cancellation. Called before the token fires, since a
    /// cancelled handle can no longer write.
    pub fn mark_cancelled(&self) {
        if self.tracker.current_generation() == self.generation {
            self.write_error("Query cancelled".to_string());
        }
    }

    fn write_error(&self, error: String) {
        let generation = self.generation;
        let tracker = &self.tracker;
        tracker.inner.sender.send_if_modified(|state| {
            if tracker.current_generation() != generation || state.stage.is_terminal() {
                return false;
            }
            state.stage = Stage::Error;
            state.error = Some(error);
            state.is_processing = false;
            true
        });
    }

    fn finish_processing(&self) {
        let generation = self.generation;
        let tracker = &self.tracker;
        tracker.inner.sender.send_if_modified(|state| {
            if tracker.current_generation() != generation || !state.is_processing {
                return false;
            }
            state.is_processing = false;
            true
        });
    }
}
