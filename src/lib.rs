//! # CoopOS: Cooperative Operating System
//!
//! A run-to-completion task kernel with a framed serial command protocol,
//! for small single-core microcontrollers.
//!
//! ## Overview
//!
//! There are no threads and no per-task stacks. Interrupt handlers and tasks
//! *signal* work onto a FIFO run queue; the main loop pops one entry at a
//! time and calls the task to completion. A task that wants more time
//! signals itself and returns.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Application (main.rs)                     │
//! │          diagnostics task · app context · wiring            │
//! ├────────────────────────────────────────────────────────────┤
//! │             Communications (comms.rs, packet.rs)            │
//! │   populate task ─► RxSlot pool ─► parse task ─► dispatch    │
//! ├───────────────────┬──────────────────┬─────────────────────┤
//! │  Scheduler        │  Timer Engine    │  Serial Transport   │
//! │  scheduler.rs     │  timer.rs        │  serial.rs          │
//! │  ─ register()     │  ─ arm()         │  ─ enqueue_transmit │
//! │  ─ signal()       │  ─ on_tick()     │  ─ on_interrupt()   │
//! │  ─ run_pending()  │                  │                     │
//! ├───────────────────┴──────────────────┴─────────────────────┤
//! │        Task Model (task.rs) · Sync (sync.rs)                │
//! ├────────────────────────────────────────────────────────────┤
//! │     Arch Port (arch/cortex_m4.rs): SysTick · USART2         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: every table, queue and buffer has a compile-time size
//!   (see [`config`])
//! - **Interrupt-shared state** lives in `critical_section::Mutex<RefCell<_>>`
//!   cells, so the run queue, timer engine and transport can be `static`
//! - **Tasks never run inside a critical section**
//!
//! ## Host Testing
//!
//! Everything except `arch` builds on the host. Unit tests run against
//! `critical-section`'s std implementation and a mock UART.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod logging;
pub mod sync;
pub mod task;
pub mod scheduler;
pub mod timer;
pub mod link;
pub mod serial;
pub mod packet;
pub mod comms;
pub mod kernel;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;

pub use comms::{Comms, CommsHost, CommsStats};
pub use error::{FrameError, KernelError, LinkError, SerialError};
pub use link::{LinkConfig, SerialLink};
pub use scheduler::{RunQueue, Scheduler, Signal};
pub use serial::{SerialStats, SerialTransport};
pub use task::{TaskId, TriggerSource};
pub use timer::{TimerEngine, TimerId};
