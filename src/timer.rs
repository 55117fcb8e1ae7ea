//! # Software Timer Engine
//!
//! Turns the fixed-period hardware tick into task signals. Each timer slot
//! counts down once per tick and, on reaching zero, signals its task with
//! `TriggerSource::Timer`. One-shot timers then free their slot; periodic
//! timers reload.
//!
//! ## Slot State Machine
//!
//! ```text
//!              arm()                 expiry, reload = Some(r)
//!  ┌──────────┐ ────► ┌────────┐ ◄──────────────────────────┐
//!  │ Inactive │       │ Active │ ───────────────────────────┘
//!  └──────────┘ ◄──── └────────┘
//!          expiry, reload = None
//! ```
//!
//! `on_tick` runs in interrupt context at `TICK_HZ`; its cost is one pass
//! over `MAX_TIMERS` slots.

use crate::config::MAX_TIMERS;
use crate::error::KernelError;
use crate::scheduler::Signal;
use crate::sync::{self, Shared};
use crate::task::{TaskId, TriggerSource};

/// Index of an armed timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(u8);

impl TimerId {
    /// Slot index in the timer pool.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Timer engine diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerStats {
    /// Ticks processed since `init`.
    pub ticks: u32,
    /// Expiries whose signal was rejected by the run queue.
    pub missed: u32,
}

#[derive(Debug, Clone, Copy)]
struct SoftTimer {
    active: bool,
    /// Ticks left until expiry. Always >= 1 while active.
    count: u16,
    /// `None` for one-shot timers.
    reload: Option<u16>,
    task: TaskId,
}

impl SoftTimer {
    const IDLE: SoftTimer = SoftTimer {
        active: false,
        count: 0,
        reload: None,
        task: TaskId::NONE,
    };
}

struct TimerState {
    slots: [SoftTimer; MAX_TIMERS],
    stats: TimerStats,
}

impl TimerState {
    const fn new() -> Self {
        Self {
            slots: [SoftTimer::IDLE; MAX_TIMERS],
            stats: TimerStats { ticks: 0, missed: 0 },
        }
    }
}

/// Pool of software timers driven by the hardware tick.
pub struct TimerEngine {
    state: Shared<TimerState>,
}

impl TimerEngine {
    /// Create an engine with every slot inactive.
    pub const fn new() -> Self {
        Self {
            state: sync::shared(TimerState::new()),
        }
    }

    /// Deactivate every slot and reset the statistics.
    ///
    /// Starting the hardware tick itself is the arch port's job
    /// (`arch::cortex_m4::configure_systick`).
    pub fn init(&self) {
        sync::with_shared(&self.state, |state| *state = TimerState::new());
    }

    /// Arm the first free slot to signal `task` after `initial_ticks`, then
    /// every `reload` ticks if `reload` is `Some`.
    ///
    /// # Errors
    /// - `KernelError::ZeroTicks` if `initial_ticks` or the reload is zero
    /// - `KernelError::TimerPoolFull` if every slot is active
    pub fn arm(
        &self,
        task: TaskId,
        initial_ticks: u16,
        reload: Option<u16>,
    ) -> Result<TimerId, KernelError> {
        if initial_ticks == 0 || reload == Some(0) {
            return Err(KernelError::ZeroTicks);
        }

        let slot = sync::with_shared(&self.state, |state| {
            let index = state.slots.iter().position(|slot| !slot.active)?;
            state.slots[index] = SoftTimer {
                active: true,
                count: initial_ticks,
                reload,
                task,
            };
            Some(index)
        });

        match slot {
            Some(index) => Ok(TimerId(index as u8)),
            None => {
                crate::log_error!("timer pool full, task {} not armed", task.index());
                Err(KernelError::TimerPoolFull)
            }
        }
    }

    /// Advance every active timer by one tick. Call from the tick interrupt.
    pub fn on_tick(&self, signal: &impl Signal) {
        sync::with_shared(&self.state, |state| {
            state.stats.ticks = state.stats.ticks.wrapping_add(1);

            for slot in state.slots.iter_mut().filter(|slot| slot.active) {
                slot.count -= 1;
                if slot.count != 0 {
                    continue;
                }

                if signal.signal(slot.task, TriggerSource::Timer).is_err() {
                    state.stats.missed = state.stats.missed.saturating_add(1);
                }

                match slot.reload {
                    Some(reload) => slot.count = reload,
                    None => *slot = SoftTimer::IDLE,
                }
            }
        });
    }

    /// Whether the slot behind `timer` is still armed.
    ///
    /// A one-shot that has fired reports `false`; its slot may since have
    /// been handed to another timer.
    pub fn is_active(&self, timer: TimerId) -> bool {
        sync::with_shared(&self.state, |state| {
            state
                .slots
                .get(timer.index())
                .is_some_and(|slot| slot.active)
        })
    }

    /// Number of armed slots.
    pub fn active_count(&self) -> usize {
        sync::with_shared(&self.state, |state| {
            state.slots.iter().filter(|slot| slot.active).count()
        })
    }

    /// Engine diagnostics.
    pub fn stats(&self) -> TimerStats {
        sync::with_shared(&self.state, |state| state.stats)
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
