//! # CoopOS Configuration
//!
//! Compile-time constants governing the kernel, the serial transport and
//! the packet protocol. All limits are fixed at compile time; there is no dynamic
//! allocation.

/// Maximum number of tasks that can be registered with the scheduler.
/// Task ids are `u8` and `0xFF` is reserved for "no task", so this must
/// stay below 255.
pub const MAX_TASKS: usize = 50;

/// Depth of the pending-run queue. A signal arriving while the queue
/// holds this many entries is rejected with `KernelError::RunQueueFull`.
pub const RUN_QUEUE_DEPTH: usize = 50;

/// Number of software timer slots driven by the hardware tick.
pub const MAX_TIMERS: usize = 20;

/// Hardware tick frequency in Hz. One timer count is one tick, so at
/// 100 Hz a count of 1 is 10 ms.
pub const TICK_HZ: u32 = 100;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Receive ring buffer capacity in bytes.
pub const RX_BUFFER_SIZE: usize = 256;

/// Transmit ring buffer capacity in bytes.
pub const TX_BUFFER_SIZE: usize = 256;

/// Largest frame (header + payload + CRC + end marker) the protocol
/// will assemble or build.
pub const MAX_PACKET_BYTES: usize = 200;

/// Number of receive packet slots. Bounds how many complete frames may
/// wait for the parse task before the assembler stalls.
pub const MAX_RX_PACKETS: usize = 10;

/// Baud rate applied by `LinkConfig::default()`.
pub const DEFAULT_BAUD: u32 = 9600;

/// Convert milliseconds to timer ticks, rounding down but never below
/// one tick.
pub const fn ms_to_ticks(ms: u32) -> u16 {
    let ticks = ms as u64 * TICK_HZ as u64 / 1000;
    if ticks == 0 {
        1
    } else if ticks > u16::MAX as u64 {
        u16::MAX
    } else {
        ticks as u16
    }
}

/// SysTick reload value for `TICK_HZ`. SysTick has a 24-bit reload
/// register.
pub const SYSTICK_RELOAD: u32 = SYSTEM_CLOCK_HZ / TICK_HZ - 1;

const _: () = assert!(SYSTICK_RELOAD <= 0x00FF_FFFF);

/// 10 ms expressed in ticks.
pub const TICKS_10_MS: u16 = ms_to_ticks(10);

/// 500 ms expressed in ticks.
pub const TICKS_500_MS: u16 = ms_to_ticks(500);

/// 1 s expressed in ticks.
pub const TICKS_1_S: u16 = ms_to_ticks(1000);
