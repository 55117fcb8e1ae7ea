//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the STM32F401 (Cortex-M4, Thumb-2): the
//! SysTick time base, the USART2 link and the two interrupt handlers that
//! feed the kernel.
//!
//! ## Interrupt Flow
//!
//! ```text
//!  SysTick (TICK_HZ) ──► TIMERS.on_tick(&RUN_QUEUE)
//!  USART2            ──► SERIAL.on_interrupt(&RUN_QUEUE)
//! ```
//!
//! Both handlers only touch critical-section cells and push run-queue
//! entries; tasks run later from the main loop.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xFF (lowest)
//! - USART2: 0x80
//!
//! Neither handler depends on the other's timing, so the ordering only
//! affects latency.
//!
//! ## USART2 Pinout
//!
//! PA2 = TX, PA3 = RX, alternate function 7. The peripheral runs from the
//! 16 MHz HSI (`SYSTEM_CLOCK_HZ`) with 16x oversampling.

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::NVIC;
use stm32_metapac as pac;

use crate::config::{SYSTEM_CLOCK_HZ, SYSTICK_RELOAD};
use crate::error::LinkError;
use crate::link::{LinkConfig, Parity, SerialLink, StopBits};
use crate::scheduler::RunQueue;
use crate::serial::SerialTransport;
use crate::timer::TimerEngine;

// ---------------------------------------------------------------------------
// Port globals
// ---------------------------------------------------------------------------

/// Run queue shared by every interrupt handler and the main loop.
pub static RUN_QUEUE: RunQueue = RunQueue::new();

/// Software timers driven by SysTick.
pub static TIMERS: TimerEngine = TimerEngine::new();

/// Ring-buffered transport on USART2.
pub static SERIAL: SerialTransport<Usart2> = SerialTransport::new(Usart2::new());

const USART2_PRIORITY: u8 = 0x80;
const TX_PIN: usize = 2;
const RX_PIN: usize = 3;
const USART2_AF: u8 = 7;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Start the kernel tick: SysTick at `TICK_HZ` from the core clock, with
/// its exception driving `TIMERS.on_tick`.
///
/// The reload value is checked against the 24-bit SysTick counter at
/// compile time (`config::SYSTICK_RELOAD`).
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.disable_counter();
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYSTICK_RELOAD);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

/// Set SysTick to the lowest priority and USART2 above it.
pub fn set_interrupt_priorities(nvic: &mut NVIC) {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        core::ptr::write_volatile(shpr3, val | (0xFF << 24));

        nvic.set_priority(pac::Interrupt::USART2, USART2_PRIORITY);
    }
}

// ---------------------------------------------------------------------------
// USART2 link
// ---------------------------------------------------------------------------

/// USART2 as a [`SerialLink`].
///
/// Zero-sized; the registers are reached through `stm32-metapac`. Owned by
/// [`SERIAL`], which serializes every access.
pub struct Usart2 {
    _private: (),
}

impl Usart2 {
    pub const fn new() -> Self {
        Self { _private: () }
    }

    fn regs(&self) -> pac::usart::Usart {
        pac::USART2
    }
}

impl SerialLink for Usart2 {
    fn configure(&mut self, config: &LinkConfig) {
        use pac::gpio::vals::Moder;
        use pac::usart::vals::{M0, Ps, Stop};

        pac::RCC.ahb1enr().modify(|w| w.set_gpioaen(true));
        pac::RCC.apb1enr().modify(|w| w.set_usart2en(true));

        for pin in [TX_PIN, RX_PIN] {
            pac::GPIOA.afr(0).modify(|w| w.set_afr(pin, USART2_AF));
            pac::GPIOA.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
        }

        let regs = self.regs();
        regs.cr1().write(|w| w.set_ue(false));

        let baud = config.baud_rate.max(1);
        let brr = (SYSTEM_CLOCK_HZ + baud / 2) / baud;
        regs.brr().write_value(pac::usart::regs::Brr(brr));

        regs.cr2().write(|w| {
            w.set_stop(match config.stop_bits {
                StopBits::One => Stop::STOP1,
                StopBits::Two => Stop::STOP2,
            })
        });

        regs.cr1().write(|w| {
            // Parity takes the ninth bit so data stays 8 bits wide
            let parity = config.parity != Parity::None;
            w.set_m0(if parity { M0::BIT9 } else { M0::BIT8 });
            w.set_pce(parity);
            w.set_ps(if config.parity == Parity::Odd { Ps::ODD } else { Ps::EVEN });
            w.set_te(true);
            w.set_re(true);
            w.set_rxneie(true);
            w.set_ue(true);
        });

        unsafe { NVIC::unmask(pac::Interrupt::USART2) };
    }

    fn rx_ready(&self) -> bool {
        let sr = self.regs().sr().read();
        sr.rxne() || sr.ore()
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        // SR then DR clears the error flags
        let sr = self.regs().sr().read();
        let byte = self.regs().dr().read().dr() as u8;

        if sr.pe() {
            Err(LinkError::Parity)
        } else if sr.fe() {
            Err(LinkError::Framing)
        } else if sr.ore() {
            Err(LinkError::Overrun)
        } else {
            Ok(byte)
        }
    }

    fn tx_ready(&self) -> bool {
        self.regs().sr().read().txe()
    }

    fn write_byte(&mut self, byte: u8) {
        self.regs().dr().write(|w| w.set_dr(byte as u16));
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.regs().cr1().modify(|w| w.set_txeie(enabled));
    }

    fn tx_interrupt_enabled(&self) -> bool {
        self.regs().cr1().read().txeie()
    }
}

// ---------------------------------------------------------------------------
// Interrupt handlers
// ---------------------------------------------------------------------------

/// SysTick exception handler: kernel tick entry point.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    TIMERS.on_tick(&RUN_QUEUE);
}

/// USART2 global interrupt: RXNE, ORE and TXE.
#[no_mangle]
pub unsafe extern "C" fn USART2() {
    SERIAL.on_interrupt(&RUN_QUEUE);
}
