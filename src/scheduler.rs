//! # Scheduler
//!
//! Cooperative run-to-completion scheduler. Work is expressed as signals:
//! interrupt handlers and tasks push `(task, trigger source)` entries onto a
//! FIFO run queue, and the main loop pops and runs them one at a time.
//!
//! ## Split of Responsibilities
//!
//! - [`RunQueue`] is the only part touched from interrupt context. It is
//!   `Sync`, lives in a `static` on target, and guards its state with a
//!   critical section held just long enough to update the deque.
//! - [`Scheduler`] owns the task table. It is built and filled during
//!   start-up and then only read by the main loop, so it needs no locking.
//!
//! ## Scheduling Algorithm
//!
//! Each call to [`Scheduler::run_pending_if_any`]:
//! 1. Pops the oldest entry (inside a critical section) and records its
//!    trigger source as "current"
//! 2. Calls the task with the application context (no lock held)
//! 3. Resets the current trigger source to `NotTriggered`
//!
//! At most one task runs per call, so a task that keeps re-signalling
//! itself is appended behind everything already queued and cannot starve
//! its peers or live-lock the main loop.

use heapless::{Deque, Vec};

use crate::config::{MAX_TASKS, RUN_QUEUE_DEPTH};
use crate::error::KernelError;
use crate::sync::{self, Shared};
use crate::task::{RunEntry, TaskFn, TaskId, TriggerSource};

// ---------------------------------------------------------------------------
// Signal seam
// ---------------------------------------------------------------------------

/// Anything that can queue a task run.
///
/// Implemented by [`RunQueue`] and [`Scheduler`]; consumed by the timer
/// engine, the serial transport and the protocol tasks so that they can be
/// exercised against a recording double in tests.
pub trait Signal {
    /// Queue one run of `task`. Signalling [`TaskId::NONE`] is a no-op.
    fn signal(&self, task: TaskId, source: TriggerSource) -> Result<(), KernelError>;
}

// ---------------------------------------------------------------------------
// Run queue (interrupt-shared)
// ---------------------------------------------------------------------------

/// Diagnostics for the run queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunQueueStats {
    /// Largest number of entries ever pending at once.
    pub high_water: usize,
    /// Signals rejected because the queue was full.
    pub dropped: u32,
}

struct QueueState {
    entries: Deque<RunEntry, RUN_QUEUE_DEPTH>,
    current: TriggerSource,
    stats: RunQueueStats,
}

impl QueueState {
    const fn new() -> Self {
        Self {
            entries: Deque::new(),
            current: TriggerSource::NotTriggered,
            stats: RunQueueStats { high_water: 0, dropped: 0 },
        }
    }
}

/// FIFO of pending task runs, safe to signal from interrupt context.
pub struct RunQueue {
    state: Shared<QueueState>,
}

impl RunQueue {
    /// Create an empty run queue.
    pub const fn new() -> Self {
        Self {
            state: sync::shared(QueueState::new()),
        }
    }

    /// Discard every pending entry and reset the statistics.
    pub fn clear(&self) {
        sync::with_shared(&self.state, |state| *state = QueueState::new());
    }

    /// Number of runs waiting to be executed.
    pub fn pending(&self) -> usize {
        sync::with_shared(&self.state, |state| state.entries.len())
    }

    /// Trigger source of the task currently executing, or `NotTriggered`
    /// when called outside a task.
    pub fn current_trigger_source(&self) -> TriggerSource {
        sync::with_shared(&self.state, |state| state.current)
    }

    /// Queue diagnostics.
    pub fn stats(&self) -> RunQueueStats {
        sync::with_shared(&self.state, |state| state.stats)
    }

    /// Pop the oldest entry and mark its source as current.
    fn begin_next(&self) -> Option<RunEntry> {
        sync::with_shared(&self.state, |state| {
            let entry = state.entries.pop_front()?;
            state.current = entry.source;
            Some(entry)
        })
    }

    /// Clear the current source once the task has returned.
    fn finish(&self) {
        sync::with_shared(&self.state, |state| state.current = TriggerSource::NotTriggered);
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for RunQueue {
    fn signal(&self, task: TaskId, source: TriggerSource) -> Result<(), KernelError> {
        if task.is_none() {
            return Ok(());
        }

        let queued = sync::with_shared(&self.state, |state| {
            if state.entries.push_back(RunEntry { task, source }).is_err() {
                state.stats.dropped = state.stats.dropped.saturating_add(1);
                return false;
            }
            state.stats.high_water = state.stats.high_water.max(state.entries.len());
            true
        });

        if queued {
            Ok(())
        } else {
            crate::log_warn!("run queue full, dropped signal for task {}", task.index());
            Err(KernelError::RunQueueFull)
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler (main-loop owned)
// ---------------------------------------------------------------------------

/// Task table plus the run queue it drains.
///
/// `C` is the application context passed to every task.
pub struct Scheduler<'q, C> {
    queue: &'q RunQueue,
    tasks: Vec<TaskFn<C>, MAX_TASKS>,
}

impl<'q, C> Scheduler<'q, C> {
    /// Create a scheduler with an empty task table draining `queue`.
    pub const fn new(queue: &'q RunQueue) -> Self {
        Self {
            queue,
            tasks: Vec::new(),
        }
    }

    /// Register a task and return its id.
    ///
    /// Ids are assigned in registration order starting at zero.
    ///
    /// # Errors
    /// `KernelError::TaskTableFull` once `MAX_TASKS` tasks are registered;
    /// the table is left untouched.
    pub fn register(&mut self, task: TaskFn<C>) -> Result<TaskId, KernelError> {
        let id = TaskId::from_index(self.tasks.len());
        if self.tasks.push(task).is_err() {
            crate::log_error!("task table full ({} tasks)", MAX_TASKS);
            return Err(KernelError::TaskTableFull);
        }
        Ok(id)
    }

    /// Queue a run of `task`, checking that it was registered here.
    ///
    /// # Errors
    /// - `KernelError::UnknownTask` if `task` is not in this table
    /// - `KernelError::RunQueueFull` if the queue has no room
    pub fn signal(&self, task: TaskId, source: TriggerSource) -> Result<(), KernelError> {
        if task.is_none() {
            return Ok(());
        }
        if task.index() >= self.tasks.len() {
            return Err(KernelError::UnknownTask);
        }
        self.queue.signal(task, source)
    }

    /// Run the oldest pending task, if any.
    ///
    /// Returns `true` if a task was run. Never runs more than one task, so
    /// the main loop regains control after every task.
    pub fn run_pending_if_any(&self, ctx: &mut C) -> bool {
        let Some(entry) = self.queue.begin_next() else {
            return false;
        };

        match self.tasks.get(entry.task.index()) {
            Some(task) => task(ctx, self.queue),
            None => {
                crate::log_warn!("skipping run of unregistered task {}", entry.task.index());
            }
        }

        self.queue.finish();
        true
    }

    /// Trigger source of the task currently executing.
    pub fn current_trigger_source(&self) -> TriggerSource {
        self.queue.current_trigger_source()
    }

    /// Number of runs waiting.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// The run queue this scheduler drains.
    pub fn queue(&self) -> &'q RunQueue {
        self.queue
    }
}

impl<C> Signal for Scheduler<'_, C> {
    fn signal(&self, task: TaskId, source: TriggerSource) -> Result<(), KernelError> {
        Scheduler::signal(self, task, source)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        runs: std::vec::Vec<(usize, TriggerSource)>,
        resignals_left: u32,
        self_id: Option<TaskId>,
    }

    fn task_0(ctx: &mut Recorder, queue: &RunQueue) {
        ctx.runs.push((0, queue.current_trigger_source()));
    }

    fn task_1(ctx: &mut Recorder, queue: &RunQueue) {
        ctx.runs.push((1, queue.current_trigger_source()));
    }

    fn task_2(ctx: &mut Recorder, queue: &RunQueue) {
        ctx.runs.push((2, queue.current_trigger_source()));
    }

    fn noop(_ctx: &mut Recorder, _queue: &RunQueue) {}

    fn resignaller(ctx: &mut Recorder, queue: &RunQueue) {
        ctx.runs.push((9, queue.current_trigger_source()));
        if ctx.resignals_left > 0 {
            ctx.resignals_left -= 1;
            if let Some(id) = ctx.self_id {
                queue.signal(id, TriggerSource::SelfTriggered).unwrap();
            }
        }
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let queue = RunQueue::new();
        let mut sched: Scheduler<'_, Recorder> = Scheduler::new(&queue);

        for expected in 0..MAX_TASKS {
            let id = sched.register(noop).unwrap();
            assert_eq!(id.index(), expected);
        }
        assert_eq!(sched.register(noop), Err(KernelError::TaskTableFull));
        assert_eq!(sched.task_count(), MAX_TASKS);

        // The table still works after the rejected registration
        sched.signal(TaskId::from_index(MAX_TASKS - 1), TriggerSource::Data).unwrap();
        let mut ctx = Recorder::default();
        assert!(sched.run_pending_if_any(&mut ctx));
    }

    #[test]
    fn test_fifo_order_and_trigger_sources() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let a = sched.register(task_0).unwrap();
        let b = sched.register(task_1).unwrap();
        let c = sched.register(task_2).unwrap();

        sched.signal(b, TriggerSource::Timer).unwrap();
        sched.signal(a, TriggerSource::Data).unwrap();
        sched.signal(c, TriggerSource::SelfTriggered).unwrap();
        sched.signal(a, TriggerSource::Timer).unwrap();
        assert_eq!(sched.pending(), 4);

        let mut ctx = Recorder::default();
        while sched.run_pending_if_any(&mut ctx) {}

        assert_eq!(
            ctx.runs,
            [
                (1, TriggerSource::Timer),
                (0, TriggerSource::Data),
                (2, TriggerSource::SelfTriggered),
                (0, TriggerSource::Timer),
            ]
        );
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_run_pending_runs_at_most_one() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let a = sched.register(task_0).unwrap();
        sched.signal(a, TriggerSource::Data).unwrap();
        sched.signal(a, TriggerSource::Data).unwrap();

        let mut ctx = Recorder::default();
        assert!(sched.run_pending_if_any(&mut ctx));
        assert_eq!(ctx.runs.len(), 1);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn test_empty_queue_runs_nothing() {
        let queue = RunQueue::new();
        let sched: Scheduler<'_, Recorder> = Scheduler::new(&queue);
        let mut ctx = Recorder::default();
        assert!(!sched.run_pending_if_any(&mut ctx));
    }

    #[test]
    fn test_trigger_source_cleared_outside_task() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let a = sched.register(task_0).unwrap();

        assert_eq!(sched.current_trigger_source(), TriggerSource::NotTriggered);
        sched.signal(a, TriggerSource::Timer).unwrap();
        let mut ctx = Recorder::default();
        sched.run_pending_if_any(&mut ctx);
        assert_eq!(ctx.runs, [(0, TriggerSource::Timer)]);
        assert_eq!(sched.current_trigger_source(), TriggerSource::NotTriggered);
    }

    #[test]
    fn test_none_task_is_ignored() {
        let queue = RunQueue::new();
        let sched: Scheduler<'_, Recorder> = Scheduler::new(&queue);
        assert_eq!(sched.signal(TaskId::NONE, TriggerSource::Data), Ok(()));
        assert_eq!(queue.signal(TaskId::NONE, TriggerSource::Data), Ok(()));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_unknown_task_rejected() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        sched.register(task_0).unwrap();
        assert_eq!(
            sched.signal(TaskId::from_index(1), TriggerSource::Data),
            Err(KernelError::UnknownTask)
        );
    }

    #[test]
    fn test_queue_full_is_reported() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let a = sched.register(task_0).unwrap();

        for _ in 0..RUN_QUEUE_DEPTH {
            sched.signal(a, TriggerSource::Data).unwrap();
        }
        assert_eq!(sched.signal(a, TriggerSource::Data), Err(KernelError::RunQueueFull));

        let stats = queue.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.high_water, RUN_QUEUE_DEPTH);

        // Existing entries are intact
        let mut ctx = Recorder::default();
        while sched.run_pending_if_any(&mut ctx) {}
        assert_eq!(ctx.runs.len(), RUN_QUEUE_DEPTH);
    }

    #[test]
    fn test_self_resignal_goes_to_back_of_queue() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let looper = sched.register(resignaller).unwrap();
        let other = sched.register(task_1).unwrap();

        let mut ctx = Recorder {
            resignals_left: 2,
            self_id: Some(looper),
            ..Default::default()
        };

        sched.signal(looper, TriggerSource::Data).unwrap();
        sched.signal(other, TriggerSource::Timer).unwrap();
        while sched.run_pending_if_any(&mut ctx) {}

        assert_eq!(
            ctx.runs,
            [
                (9, TriggerSource::Data),
                (1, TriggerSource::Timer),
                (9, TriggerSource::SelfTriggered),
                (9, TriggerSource::SelfTriggered),
            ]
        );
    }

    #[test]
    fn test_clear_discards_pending() {
        let queue = RunQueue::new();
        let mut sched = Scheduler::new(&queue);
        let a = sched.register(task_0).unwrap();
        sched.signal(a, TriggerSource::Data).unwrap();
        queue.clear();
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.stats(), RunQueueStats::default());
    }
}
