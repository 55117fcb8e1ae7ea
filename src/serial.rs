//! # Serial Transport
//!
//! Interrupt-driven, ring-buffered UART transport.
//!
//! ## Data Paths
//!
//! ```text
//!  main loop                         interrupt context
//!  ─────────                         ─────────────────
//!  enqueue_transmit() ──► TX ring ──► on_tx_complete() ──► link.write_byte()
//!  dequeue_receive_byte() ◄── RX ring ◄── on_rx_interrupt() ◄── link.read_byte()
//!                                         │
//!                                         └─► signal(notify task, Data)
//!                                             on empty → non-empty, or while owed
//! ```
//!
//! ## Transmit Priming
//!
//! The UART raises "transmit register empty" continuously while idle, so
//! that interrupt is only enabled while the TX ring holds data. When
//! `enqueue_transmit` finds the ring empty it writes the first byte straight
//! to the link and enables the interrupt; each completion then pops the byte
//! just sent and writes the next, disabling the interrupt once the ring
//! drains. The byte on the wire stays at the head of the ring until its
//! completion interrupt.
//!
//! ## Owed Notifications
//!
//! The notify signal is edge-triggered, so a lost one would leave bytes in
//! the RX ring that nobody drains. A signal is owed when the receive path's
//! own signal is rejected, or when the consumer reports through
//! [`defer_rx_notify`](SerialTransport::defer_rx_notify) that it could not
//! re-signal itself. While owed, every received byte signals again, and
//! [`retry_rx_notify`](SerialTransport::retry_rx_notify) lets the main loop
//! settle the debt when no more bytes arrive.
//!
//! Every access to the rings happens inside one short critical section.

use heapless::Deque;

use crate::config::{RX_BUFFER_SIZE, TX_BUFFER_SIZE};
use crate::error::SerialError;
use crate::link::{LinkConfig, SerialLink};
use crate::scheduler::Signal;
use crate::sync::{self, Shared};
use crate::task::{TaskId, TriggerSource};

/// Transport diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialStats {
    /// Clean bytes stored in the RX ring.
    pub rx_bytes: u32,
    /// Bytes discarded for framing, parity or overrun errors.
    pub rx_line_errors: u32,
    /// Clean bytes discarded because the RX ring was full.
    pub rx_dropped: u32,
    /// Bytes whose transmission completed.
    pub tx_bytes: u32,
    /// `enqueue_transmit` calls rejected for lack of space.
    pub tx_rejected: u32,
}

struct TransportState<L> {
    link: L,
    rx: Deque<u8, RX_BUFFER_SIZE>,
    tx: Deque<u8, TX_BUFFER_SIZE>,
    rx_notify: TaskId,
    /// The notify task must be signalled again before the RX ring can be
    /// trusted to drain.
    notify_owed: bool,
    stats: SerialStats,
}

impl<L: SerialLink> TransportState<L> {
    fn receive(&mut self, signal: &impl Signal) {
        let byte = match self.link.read_byte() {
            Ok(byte) => byte,
            Err(_) => {
                self.stats.rx_line_errors = self.stats.rx_line_errors.saturating_add(1);
                return;
            }
        };

        let was_empty = self.rx.is_empty();
        if self.rx.push_back(byte).is_err() {
            self.stats.rx_dropped = self.stats.rx_dropped.saturating_add(1);
            return;
        }
        self.stats.rx_bytes = self.stats.rx_bytes.wrapping_add(1);

        if was_empty || self.notify_owed {
            self.notify_owed = signal.signal(self.rx_notify, TriggerSource::Data).is_err();
        }
    }

    fn transmit_complete(&mut self) {
        if self.tx.pop_front().is_some() {
            self.stats.tx_bytes = self.stats.tx_bytes.wrapping_add(1);
        }
        match self.tx.front() {
            Some(&next) => self.link.write_byte(next),
            None => self.link.set_tx_interrupt(false),
        }
    }

    fn tx_free(&self) -> usize {
        TX_BUFFER_SIZE - self.tx.len()
    }
}

/// Ring-buffered UART transport shared between the main loop and the UART
/// interrupt.
pub struct SerialTransport<L> {
    state: Shared<TransportState<L>>,
}

impl<L> SerialTransport<L> {
    /// Wrap `link` with empty rings and no notify task.
    pub const fn new(link: L) -> Self {
        Self {
            state: sync::shared(TransportState {
                link,
                rx: Deque::new(),
                tx: Deque::new(),
                rx_notify: TaskId::NONE,
                notify_owed: false,
                stats: SerialStats {
                    rx_bytes: 0,
                    rx_line_errors: 0,
                    rx_dropped: 0,
                    tx_bytes: 0,
                    tx_rejected: 0,
                },
            }),
        }
    }
}

impl<L: SerialLink> SerialTransport<L> {
    /// Empty both rings, reset statistics and configure the link.
    ///
    /// The notify task set by [`set_rx_notify_task`](Self::set_rx_notify_task)
    /// is kept.
    pub fn init(&self, config: &LinkConfig) {
        sync::with_shared(&self.state, |state| {
            state.rx.clear();
            state.tx.clear();
            state.notify_owed = false;
            state.stats = SerialStats::default();
            state.link.set_tx_interrupt(false);
            state.link.configure(config);
        });
        crate::log_info!("serial link configured at {} baud", config.baud_rate);
    }

    /// Queue `bytes` for transmission, starting the transmitter if idle.
    ///
    /// # Errors
    /// `SerialError::TxBufferFull` if the TX ring cannot take every byte;
    /// nothing is queued in that case.
    pub fn enqueue_transmit(&self, bytes: &[u8]) -> Result<(), SerialError> {
        let Some(&first) = bytes.first() else {
            return Ok(());
        };

        let result = sync::with_shared(&self.state, |state| {
            let free = state.tx_free();
            if bytes.len() > free {
                state.stats.tx_rejected = state.stats.tx_rejected.saturating_add(1);
                return Err(SerialError::TxBufferFull {
                    requested: bytes.len(),
                    free,
                });
            }

            let was_idle = state.tx.is_empty();
            for &byte in bytes {
                // Space was checked above
                let _ = state.tx.push_back(byte);
            }
            if was_idle {
                state.link.write_byte(first);
                state.link.set_tx_interrupt(true);
            }
            Ok(())
        });

        if let Err(SerialError::TxBufferFull { requested, free }) = result {
            crate::log_warn!("tx rejected: {} bytes requested, {} free", requested, free);
        }
        result
    }

    /// Take the oldest received byte, or `None` if nothing is buffered.
    pub fn dequeue_receive_byte(&self) -> Option<u8> {
        sync::with_shared(&self.state, |state| state.rx.pop_front())
    }

    /// Number of received bytes waiting.
    pub fn bytes_pending_receive(&self) -> usize {
        sync::with_shared(&self.state, |state| state.rx.len())
    }

    /// Number of bytes queued or in flight for transmission.
    pub fn bytes_pending_transmit(&self) -> usize {
        sync::with_shared(&self.state, |state| state.tx.len())
    }

    /// Task to signal with `TriggerSource::Data` whenever the RX ring goes
    /// from empty to non-empty. `TaskId::NONE` disables notification.
    pub fn set_rx_notify_task(&self, task: TaskId) {
        sync::with_shared(&self.state, |state| state.rx_notify = task);
    }

    /// Record that the notify task is no longer queued although bytes may
    /// remain, so the next received byte signals it again.
    pub fn defer_rx_notify(&self) {
        sync::with_shared(&self.state, |state| state.notify_owed = true);
    }

    /// Whether a notify signal is owed.
    pub fn rx_notify_owed(&self) -> bool {
        sync::with_shared(&self.state, |state| state.notify_owed)
    }

    /// Settle an owed notify signal from the main loop.
    ///
    /// Returns `true` if the notify task was queued. An owed signal with an
    /// empty RX ring is simply dropped, since the next byte starts a new
    /// burst.
    pub fn retry_rx_notify(&self, signal: &impl Signal) -> bool {
        sync::with_shared(&self.state, |state| {
            if !state.notify_owed {
                return false;
            }
            if state.rx.is_empty() || state.rx_notify.is_none() {
                state.notify_owed = false;
                return false;
            }
            state.notify_owed = signal.signal(state.rx_notify, TriggerSource::Data).is_err();
            !state.notify_owed
        })
    }

    /// Receive-interrupt path: store one byte from the link if one is ready.
    pub fn on_rx_interrupt(&self, signal: &impl Signal) {
        sync::with_shared(&self.state, |state| {
            if state.link.rx_ready() {
                state.receive(signal);
            }
        });
    }

    /// Transmit-interrupt path: the byte at the head of the TX ring has
    /// left the data register.
    pub fn on_tx_complete(&self) {
        sync::with_shared(&self.state, |state| state.transmit_complete());
    }

    /// Combined UART interrupt entry point: drain every ready RX byte, then
    /// service "transmit register empty" if it is enabled.
    pub fn on_interrupt(&self, signal: &impl Signal) {
        sync::with_shared(&self.state, |state| {
            while state.link.rx_ready() {
                state.receive(signal);
            }
            if state.link.tx_interrupt_enabled() && state.link.tx_ready() {
                state.transmit_complete();
            }
        });
    }

    /// Run `f` with exclusive access to the link.
    pub fn with_link<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        sync::with_shared(&self.state, |state| f(&mut state.link))
    }

    /// Transport diagnostics.
    pub fn stats(&self) -> SerialStats {
        sync::with_shared(&self.state, |state| state.stats)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RUN_QUEUE_DEPTH;
    use crate::error::{KernelError, LinkError};
    use crate::link::mock::MockLink;
    use crate::scheduler::RunQueue;
    use core::cell::{Cell, RefCell};

    const NOTIFY: TaskId = TaskId::from_index(4);

    /// Records every signal instead of queueing it.
    #[derive(Default)]
    struct RecordingSignal {
        log: RefCell<std::vec::Vec<(TaskId, TriggerSource)>>,
        reject: Cell<bool>,
    }

    impl Signal for RecordingSignal {
        fn signal(&self, task: TaskId, source: TriggerSource) -> Result<(), KernelError> {
            if self.reject.get() {
                return Err(KernelError::RunQueueFull);
            }
            self.log.borrow_mut().push((task, source));
            Ok(())
        }
    }

    impl RecordingSignal {
        fn signals(&self) -> std::vec::Vec<(TaskId, TriggerSource)> {
            self.log.borrow().clone()
        }
    }

    fn transport() -> SerialTransport<MockLink> {
        let serial = SerialTransport::new(MockLink::new());
        serial.init(&LinkConfig::default());
        serial
    }

    /// Play the UART: complete bytes until the transmitter goes idle.
    fn pump_tx(serial: &SerialTransport<MockLink>) {
        while serial.with_link(|link| link.tx_interrupt_enabled()) {
            serial.on_tx_complete();
        }
    }

    #[test]
    fn test_init_configures_link() {
        let serial = transport();
        assert_eq!(serial.with_link(|link| link.config()), Some(LinkConfig::default()));
    }

    #[test]
    fn test_enqueue_primes_first_byte() {
        let serial = transport();
        serial.enqueue_transmit(&[1, 2, 3]).unwrap();

        assert_eq!(serial.with_link(|link| link.written().to_vec()), [1]);
        assert!(serial.with_link(|link| link.tx_interrupt_enabled()));
        assert_eq!(serial.bytes_pending_transmit(), 3);

        pump_tx(&serial);
        assert_eq!(serial.with_link(|link| link.written().to_vec()), [1, 2, 3]);
        assert_eq!(serial.bytes_pending_transmit(), 0);
        assert_eq!(serial.stats().tx_bytes, 3);
    }

    #[test]
    fn test_enqueue_while_busy_appends() {
        let serial = transport();
        serial.enqueue_transmit(&[1, 2]).unwrap();
        serial.enqueue_transmit(&[3]).unwrap();

        // Only the first call primes the transmitter
        assert_eq!(serial.with_link(|link| link.written().to_vec()), [1]);
        pump_tx(&serial);
        assert_eq!(serial.with_link(|link| link.written().to_vec()), [1, 2, 3]);
    }

    #[test]
    fn test_enqueue_overflow_rejected() {
        let serial = transport();
        let big = [0xAAu8; TX_BUFFER_SIZE];
        serial.enqueue_transmit(&big[..TX_BUFFER_SIZE - 2]).unwrap();

        assert_eq!(
            serial.enqueue_transmit(&[1, 2, 3]),
            Err(SerialError::TxBufferFull { requested: 3, free: 2 })
        );
        assert_eq!(serial.bytes_pending_transmit(), TX_BUFFER_SIZE - 2);
        assert_eq!(serial.stats().tx_rejected, 1);
    }

    #[test]
    fn test_empty_enqueue_is_noop() {
        let serial = transport();
        serial.enqueue_transmit(&[]).unwrap();
        assert!(!serial.with_link(|link| link.tx_interrupt_enabled()));
    }

    #[test]
    fn test_dequeue_empty_returns_none() {
        let serial = transport();
        assert_eq!(serial.dequeue_receive_byte(), None);
    }

    #[test]
    fn test_rx_notify_is_edge_triggered() {
        let serial = transport();
        let signal = RecordingSignal::default();
        serial.set_rx_notify_task(NOTIFY);

        serial.with_link(|link| link.inject_rx(&[0x11]));
        serial.on_rx_interrupt(&signal);
        assert_eq!(signal.signals(), [(NOTIFY, TriggerSource::Data)]);

        serial.with_link(|link| link.inject_rx(&[1, 2, 3, 4, 5, 6, 7, 8, 9]));
        for _ in 0..9 {
            serial.on_rx_interrupt(&signal);
        }
        assert_eq!(signal.signals(), [(NOTIFY, TriggerSource::Data)]);
        assert_eq!(serial.bytes_pending_receive(), 10);

        // Draining and receiving again starts a new burst
        while serial.dequeue_receive_byte().is_some() {}
        serial.with_link(|link| link.inject_rx(&[0x22]));
        serial.on_rx_interrupt(&signal);
        assert_eq!(
            signal.signals(),
            [(NOTIFY, TriggerSource::Data), (NOTIFY, TriggerSource::Data)]
        );
    }

    #[test]
    fn test_rx_preserves_order() {
        let serial = transport();
        let queue = RunQueue::new();
        serial.with_link(|link| link.inject_rx(&[5, 6, 7]));
        serial.on_interrupt(&queue);

        assert_eq!(serial.dequeue_receive_byte(), Some(5));
        assert_eq!(serial.dequeue_receive_byte(), Some(6));
        assert_eq!(serial.dequeue_receive_byte(), Some(7));
        assert_eq!(serial.dequeue_receive_byte(), None);
    }

    #[test]
    fn test_line_errors_discarded() {
        let serial = transport();
        let queue = RunQueue::new();
        serial.set_rx_notify_task(NOTIFY);

        serial.with_link(|link| {
            link.inject_rx_error(LinkError::Framing);
            link.inject_rx_error(LinkError::Parity);
            link.inject_rx(&[0x42]);
            link.inject_rx_error(LinkError::Overrun);
        });
        serial.on_interrupt(&queue);

        assert_eq!(serial.bytes_pending_receive(), 1);
        assert_eq!(serial.dequeue_receive_byte(), Some(0x42));
        assert_eq!(serial.stats().rx_line_errors, 3);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_rx_overflow_drops_newest() {
        let serial = transport();
        let queue = RunQueue::new();
        let bytes: std::vec::Vec<u8> = (0..RX_BUFFER_SIZE + 3).map(|i| i as u8).collect();
        serial.with_link(|link| link.inject_rx(&bytes));
        serial.on_interrupt(&queue);

        assert_eq!(serial.bytes_pending_receive(), RX_BUFFER_SIZE);
        assert_eq!(serial.stats().rx_dropped, 3);
        assert_eq!(serial.dequeue_receive_byte(), Some(0));
    }

    #[test]
    fn test_rejected_notify_is_retried() {
        let serial = transport();
        let queue = RunQueue::new();
        serial.set_rx_notify_task(NOTIFY);

        let filler = TaskId::from_index(0);
        for _ in 0..RUN_QUEUE_DEPTH {
            queue.signal(filler, TriggerSource::Timer).unwrap();
        }

        serial.with_link(|link| link.inject_rx(&[1]));
        serial.on_rx_interrupt(&queue);
        assert_eq!(queue.pending(), RUN_QUEUE_DEPTH);
        assert!(serial.rx_notify_owed());

        queue.clear();
        serial.with_link(|link| link.inject_rx(&[2]));
        serial.on_rx_interrupt(&queue);
        assert_eq!(queue.pending(), 1);
        assert!(!serial.rx_notify_owed());
    }

    #[test]
    fn test_deferred_notify_resignals_on_next_byte() {
        let serial = transport();
        let signal = RecordingSignal::default();
        serial.set_rx_notify_task(NOTIFY);

        serial.with_link(|link| link.inject_rx(&[1, 2]));
        serial.on_interrupt(&signal);
        assert_eq!(signal.signals().len(), 1);

        // Consumer lost its self re-signal with bytes still buffered
        serial.defer_rx_notify();
        serial.with_link(|link| link.inject_rx(&[3]));
        serial.on_interrupt(&signal);
        assert_eq!(signal.signals().len(), 2);
        assert_eq!(signal.signals()[1], (NOTIFY, TriggerSource::Data));

        // Settled, so the burst is edge-triggered again
        serial.with_link(|link| link.inject_rx(&[4]));
        serial.on_interrupt(&signal);
        assert_eq!(signal.signals().len(), 2);
    }

    #[test]
    fn test_retry_rx_notify_settles_stranded_bytes() {
        let serial = transport();
        let signal = RecordingSignal::default();
        serial.set_rx_notify_task(NOTIFY);

        signal.reject.set(true);
        serial.with_link(|link| link.inject_rx(&[1, 2, 3]));
        serial.on_interrupt(&signal);
        assert!(serial.rx_notify_owed());

        // Still rejected: stays owed
        assert!(!serial.retry_rx_notify(&signal));
        assert!(serial.rx_notify_owed());

        signal.reject.set(false);
        assert!(serial.retry_rx_notify(&signal));
        assert_eq!(signal.signals(), [(NOTIFY, TriggerSource::Data)]);
        assert!(!serial.retry_rx_notify(&signal));
        assert_eq!(signal.signals().len(), 1);
    }

    #[test]
    fn test_retry_rx_notify_with_empty_ring_clears_debt() {
        let serial = transport();
        let signal = RecordingSignal::default();
        serial.set_rx_notify_task(NOTIFY);

        serial.defer_rx_notify();
        assert!(!serial.retry_rx_notify(&signal));
        assert!(!serial.rx_notify_owed());
        assert!(signal.signals().is_empty());
    }

    #[test]
    fn test_on_interrupt_services_tx() {
        let serial = transport();
        let queue = RunQueue::new();
        serial.enqueue_transmit(&[9, 8]).unwrap();

        serial.on_interrupt(&queue);
        serial.on_interrupt(&queue);
        assert_eq!(serial.with_link(|link| link.written().to_vec()), [9, 8]);
        assert!(!serial.with_link(|link| link.tx_interrupt_enabled()));
    }
}
