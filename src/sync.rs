//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All state shared between
//! interrupt handlers and the main loop (run queue, timer slots, ring
//! buffers) lives in a [`Shared`] cell and is only touched inside a
//! critical section.
//!
//! On Cortex-M the implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (PRIMASK save/disable/restore).
//! Host tests use the `std` implementation of `critical-section`.

use core::cell::RefCell;

pub use ::critical_section::CriticalSection;

/// Interrupt-shared mutable state.
pub type Shared<T> = ::critical_section::Mutex<RefCell<T>>;

/// Wrap `value` for sharing with interrupt handlers.
pub const fn shared<T>(value: T) -> Shared<T> {
    ::critical_section::Mutex::new(RefCell::new(value))
}

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and the previous state is restored on
/// exit, so nesting is allowed. Keep the enclosed work to an index or
/// counter update; application callbacks must never run in here.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     state.borrow_ref_mut(cs).count += 1;
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// Run `f` with exclusive access to the contents of `cell`.
#[inline]
pub fn with_shared<T, R>(cell: &Shared<T>, f: impl FnOnce(&mut T) -> R) -> R {
    critical_section(|cs| f(&mut cell.borrow_ref_mut(cs)))
}
