//! # Task Model
//!
//! Defines what the scheduler knows about a unit of work. A task is a plain
//! function pointer registered once at start-up; its identity is the slot it
//! was registered into. Tasks never block: a task that wants to run again
//! later signals itself (or arms a timer) and returns.
//!
//! ## Run Model
//!
//! ```text
//!   register()            signal(id, source)         run_pending_if_any()
//!  ┌──────────┐  TaskId  ┌───────────────────┐ FIFO ┌─────────────────────┐
//!  │ TaskFn   │ ───────► │ RunEntry{id, src} │ ───► │ task(ctx, queue)    │
//!  └──────────┘          └───────────────────┘      └─────────────────────┘
//!                              ▲        ▲                     │
//!                   timer tick │        │ rx interrupt        │ self re-signal
//!                              │        └─────────────────────┘
//! ```

use crate::scheduler::RunQueue;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Stable identifier of a registered task: its index in the task table.
///
/// Ids are handed out in registration order starting at zero and are never
/// reused. [`TaskId::NONE`] stands for "no task configured" and is accepted
/// by every signalling path as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(u8);

impl TaskId {
    /// Sentinel for "no task". Signalling it does nothing.
    pub const NONE: TaskId = TaskId(0xFF);

    /// Build the id for task-table slot `index`.
    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        TaskId(index as u8)
    }

    /// Slot index in the task table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the [`TaskId::NONE`] sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

// ---------------------------------------------------------------------------
// Trigger source
// ---------------------------------------------------------------------------

/// Why a run of a task was queued.
///
/// Recorded with every run-queue entry and readable by the task through
/// [`RunQueue::current_trigger_source`] while it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerSource {
    /// Nothing is running (or the entry has already been consumed).
    #[default]
    NotTriggered,
    /// A software timer expired.
    Timer,
    /// A task signalled work for itself or a sibling task.
    SelfTriggered,
    /// The serial transport received data.
    Data,
}

// ---------------------------------------------------------------------------
// Run queue entry
// ---------------------------------------------------------------------------

/// One pending run: which task, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunEntry {
    /// Task to invoke.
    pub task: TaskId,
    /// Reason it was queued.
    pub source: TriggerSource,
}

// ---------------------------------------------------------------------------
// Task callback
// ---------------------------------------------------------------------------

/// A registered task body.
///
/// `C` is the application context owned by the main loop; the run queue is
/// handed in so the task can read its trigger source and signal follow-up
/// work. The function must return promptly: it runs to completion with
/// every other task waiting behind it.
pub type TaskFn<C> = fn(&mut C, &RunQueue);

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
