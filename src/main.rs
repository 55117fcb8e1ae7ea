//! # CoopOS Firmware
//!
//! Serial command node on an STM32F401 (Nucleo-F401RE, USART2 on the
//! ST-LINK virtual COM port).
//!
//! | Task | Trigger | Behavior |
//! |------|---------|----------|
//! | `populate_task` | `Data` from USART2, self | Assembles one received byte into a frame slot |
//! | `parse_task` | `SelfTriggered` from `populate_task` | Validates a frame and answers requests |
//! | `diagnostics_task` | 1 s periodic timer | Logs run-queue, timer, transport and protocol counters |
//!
//! Between tasks the idle hook re-issues any protocol signal a full run
//! queue rejected, otherwise the core sleeps in `wfi`; SysTick and USART2
//! are the only wake-up sources.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    #[cfg(feature = "defmt")]
    use defmt_rtt as _;
    use panic_halt as _;

    use coopos::arch::cortex_m4::{self, Usart2, RUN_QUEUE, SERIAL, TIMERS};
    use coopos::config::TICKS_1_S;
    use coopos::{kernel, Comms, CommsHost, LinkConfig, RunQueue, Scheduler, SerialTransport};

    // -----------------------------------------------------------------------
    // Application context
    // -----------------------------------------------------------------------

    struct App {
        comms: Comms,
        serial: &'static SerialTransport<Usart2>,
        uptime_s: u32,
    }

    impl CommsHost for App {
        type Link = Usart2;

        fn comms_parts(&mut self) -> (&mut Comms, &SerialTransport<Usart2>) {
            (&mut self.comms, self.serial)
        }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Once a second: dump every counter the kernel keeps.
    fn diagnostics_task(app: &mut App, queue: &RunQueue) {
        app.uptime_s = app.uptime_s.wrapping_add(1);

        let run_queue = queue.stats();
        let timers = TIMERS.stats();
        let serial = app.serial.stats();
        let comms = app.comms.stats();

        coopos::log_info!(
            "up {}s: queue hw {} dropped {}, timer misses {}",
            app.uptime_s,
            run_queue.high_water,
            run_queue.dropped,
            timers.missed
        );
        coopos::log_info!(
            "serial rx {} (line errors {}, dropped {}), tx {} (rejected {})",
            serial.rx_bytes,
            serial.rx_line_errors,
            serial.rx_dropped,
            serial.tx_bytes,
            serial.tx_rejected
        );
        coopos::log_info!(
            "comms req {} resp {} crc {} framing {} unknown {} stalls {}",
            comms.requests,
            comms.responses,
            comms.crc_failures,
            comms.framing_failures,
            comms.unknown_commands,
            comms.stalls
        );
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Firmware entry point. Wires the kernel statics, registers tasks and
    /// enters the main loop. Does not return.
    #[entry]
    fn main() -> ! {
        let mut cp = cortex_m::Peripherals::take().expect("core peripherals taken twice");

        let app = cortex_m::singleton!(: App = App {
            comms: Comms::new(),
            serial: &SERIAL,
            uptime_s: 0,
        })
        .expect("app context already created");

        let mut scheduler: Scheduler<'static, App> = Scheduler::new(&RUN_QUEUE);

        TIMERS.init();
        SERIAL.init(&LinkConfig::default());

        app.comms
            .install(&mut scheduler, &SERIAL)
            .expect("failed to register comms tasks");

        let diagnostics = scheduler
            .register(diagnostics_task)
            .expect("failed to register diagnostics_task");
        TIMERS
            .arm(diagnostics, TICKS_1_S, Some(TICKS_1_S))
            .expect("failed to arm diagnostics timer");

        cortex_m4::set_interrupt_priorities(&mut cp.NVIC);
        cortex_m4::configure_systick(&mut cp.SYST);
        coopos::log_info!("coopos running, {} tasks", scheduler.task_count());

        kernel::run(&scheduler, app, |app| {
            let (comms, serial) = app.comms_parts();
            if !comms.recover(serial, &RUN_QUEUE) {
                cortex_m::asm::wfi();
            }
        })
    }
}

// Host builds only compile the library; the firmware needs a thumb target.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}
