//! Hardware serial link interface
//!
//! The serial transport talks to the UART through [`SerialLink`]. The
//! Cortex-M port implements it on USART2 registers; tests use
//! [`mock::MockLink`].

use crate::config::DEFAULT_BAUD;
use crate::error::LinkError;

/// Parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// Line settings applied by `SerialTransport::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LinkConfig {
    /// 9600 baud, 8N1.
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Byte-level access to a UART.
///
/// Methods are called with interrupts masked (from the transport's critical
/// sections or from the UART interrupt itself) and must not block.
pub trait SerialLink {
    /// Apply line settings and enable the receiver, the transmitter and the
    /// receive interrupt.
    fn configure(&mut self, config: &LinkConfig);

    /// A received byte (or a line error) is waiting to be read.
    fn rx_ready(&self) -> bool;

    /// Read the received byte, reporting framing/parity/overrun errors.
    /// Reading clears `rx_ready`.
    fn read_byte(&mut self) -> Result<u8, LinkError>;

    /// The transmit data register can take another byte.
    fn tx_ready(&self) -> bool;

    /// Write one byte to the transmit data register.
    fn write_byte(&mut self, byte: u8);

    /// Enable or disable the "transmit register empty" interrupt.
    fn set_tx_interrupt(&mut self, enabled: bool);

    /// Whether the "transmit register empty" interrupt is enabled.
    fn tx_interrupt_enabled(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Mock UART for host tests
    //!
    //! Received bytes are injected up front and read back one per
    //! `read_byte`. Written bytes are recorded in order.

    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Debug, Default)]
    pub struct MockLink {
        config: Option<LinkConfig>,
        rx: VecDeque<Result<u8, LinkError>>,
        written: Vec<u8>,
        tx_interrupt: bool,
    }

    impl MockLink {
        pub const fn new() -> Self {
            Self {
                config: None,
                rx: VecDeque::new(),
                written: Vec::new(),
                tx_interrupt: false,
            }
        }

        /// Queue clean bytes for reception.
        pub fn inject_rx(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes.iter().map(|&b| Ok(b)));
        }

        /// Queue a byte received with a line error.
        pub fn inject_rx_error(&mut self, error: LinkError) {
            self.rx.push_back(Err(error));
        }

        /// Everything written so far.
        pub fn written(&self) -> &[u8] {
            &self.written
        }

        /// Take and clear the written bytes.
        pub fn take_written(&mut self) -> Vec<u8> {
            core::mem::take(&mut self.written)
        }

        /// Last configuration applied.
        pub fn config(&self) -> Option<LinkConfig> {
            self.config
        }
    }

    impl SerialLink for MockLink {
        fn configure(&mut self, config: &LinkConfig) {
            self.config = Some(*config);
        }

        fn rx_ready(&self) -> bool {
            !self.rx.is_empty()
        }

        fn read_byte(&mut self) -> Result<u8, LinkError> {
            // Hardware reports an overrun when read with nothing pending
            self.rx.pop_front().unwrap_or(Err(LinkError::Overrun))
        }

        fn tx_ready(&self) -> bool {
            true
        }

        fn write_byte(&mut self, byte: u8) {
            self.written.push(byte);
        }

        fn set_tx_interrupt(&mut self, enabled: bool) {
            self.tx_interrupt = enabled;
        }

        fn tx_interrupt_enabled(&self) -> bool {
            self.tx_interrupt
        }
    }

    #[test]
    fn test_mock_rx_order() {
        let mut link = MockLink::new();
        link.inject_rx(&[1, 2]);
        link.inject_rx_error(LinkError::Parity);
        assert_eq!(link.read_byte(), Ok(1));
        assert_eq!(link.read_byte(), Ok(2));
        assert_eq!(link.read_byte(), Err(LinkError::Parity));
        assert!(!link.rx_ready());
    }

    #[test]
    fn test_mock_records_writes() {
        let mut link = MockLink::new();
        link.write_byte(0x73);
        link.write_byte(0xD9);
        assert_eq!(link.written(), &[0x73, 0xD9]);
        assert_eq!(link.take_written(), [0x73, 0xD9]);
        assert!(link.written().is_empty());
    }
}
