//! # Kernel
//!
//! Main-loop driver for CoopOS.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset handler (cortex-m-rt)
//!   └─► main()
//!         ├─► TimerEngine::init()          ← clear timer slots
//!         ├─► SerialTransport::init()      ← rings + UART line settings
//!         ├─► Comms::install()             ← register protocol tasks
//!         ├─► Scheduler::register() (×N)   ← application tasks
//!         ├─► TimerEngine::arm()           ← periodic work
//!         ├─► configure_systick()          ← start the tick
//!         └─► kernel::run()                ← main loop (no return)
//! ```
//!
//! The loop runs one task per pass and calls `idle` with the application
//! context whenever the run queue is empty. On target `idle` first lets
//! [`Comms::recover`](crate::comms::Comms::recover) re-issue any signal a
//! full run queue rejected, then sleeps in `wfi` if nothing was queued.
//! Every other producer of work is an interrupt, and the SysTick period
//! bounds how long a signal raised just before the sleep can wait.

use crate::scheduler::Scheduler;

/// Run tasks forever. **Does not return.**
pub fn run<C>(scheduler: &Scheduler<'_, C>, ctx: &mut C, mut idle: impl FnMut(&mut C)) -> ! {
    loop {
        if !scheduler.run_pending_if_any(ctx) {
            idle(ctx);
        }
    }
}

/// Run tasks until the run queue is empty and return how many ran.
///
/// A task that re-signals itself forever keeps this from returning.
pub fn run_until_idle<C>(scheduler: &Scheduler<'_, C>, ctx: &mut C) -> usize {
    let mut runs = 0;
    while scheduler.run_pending_if_any(ctx) {
        runs += 1;
    }
    runs
}

// ---------------------------------------------------------------------------
// End-to-end tests (host-only)
// ---------------------------------------------------------------------------
