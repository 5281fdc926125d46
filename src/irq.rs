//! Interrupt line probing, status control and the controller abstraction.
//!
//! Interrupt-driven acquisition needs to know which interrupt line the GPIO
//! bank raises. The line is discovered with a bounded probe: open a probe
//! window on the [`IrqController`], force-assert the bank's interrupt status
//! for the configured pins, wait a few microseconds, and ask which line fired.
//! The probe is repeated up to [`ProbeSettings::rounds`] times before giving up.
//!
//! ```text
//!   probe_on ──► IRQSTATUS_SET_0/1 ← mask ──► settle ──► probe_off
//!      ▲                                                   │
//!      └────────────── no line, rounds left ◄──────────────┘
//! ```
//!
//! Giving up is not an error: the caller stays in polling mode and the failure
//! is only logged.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::IrqRequestError;
use crate::port::{write_reg, RegisterPort};
use crate::registers::{Bank, Register};

/// Default number of probe rounds before giving up.
pub const DEFAULT_PROBE_ROUNDS: u32 = 5;

/// Default wait between asserting status and closing the probe window.
pub const DEFAULT_PROBE_SETTLE: Duration = Duration::from_micros(5);

/// Value returned by an interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was serviced (or deliberately skipped).
    Handled,
}

/// Handler attached to an interrupt line; receives the line number.
pub type IrqHandler = Arc<dyn Fn(u32) -> IrqReturn + Send + Sync>;

/// Opaque token returned when a probe window is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeMask(pub u64);

/// The operating system's interrupt facility.
pub trait IrqController: Send + Sync {
    /// Open a probe window.
    fn probe_on(&self) -> ProbeMask;

    /// Close the probe window and report the single line that fired, if any.
    fn probe_off(&self, mask: ProbeMask) -> Option<u32>;

    /// Busy-wait between asserting an interrupt and closing the window.
    fn settle(&self, delay: Duration) {
        thread::sleep(delay);
    }

    /// Attach `handler` to `line`.
    fn request(&self, line: u32, handler: IrqHandler) -> Result<(), IrqRequestError>;

    /// Detach whatever handler is attached to `line`.
    fn free(&self, line: u32);
}

impl<C: IrqController + ?Sized> IrqController for Arc<C> {
    fn probe_on(&self) -> ProbeMask {
        (**self).probe_on()
    }

    fn probe_off(&self, mask: ProbeMask) -> Option<u32> {
        (**self).probe_off(mask)
    }

    fn settle(&self, delay: Duration) {
        (**self).settle(delay)
    }

    fn request(&self, line: u32, handler: IrqHandler) -> Result<(), IrqRequestError> {
        (**self).request(line, handler)
    }

    fn free(&self, line: u32) {
        (**self).free(line)
    }
}

/// Controller for platforms without interrupt delivery to the driver.
///
/// Probes never find a line, so enabling interrupt mode always falls back to
/// polling. This is what the memory-mapped userspace backend uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIrq;

impl IrqController for NullIrq {
    fn probe_on(&self) -> ProbeMask {
        ProbeMask(0)
    }

    fn probe_off(&self, _mask: ProbeMask) -> Option<u32> {
        None
    }

    fn settle(&self, _delay: Duration) {}

    fn request(&self, line: u32, _handler: IrqHandler) -> Result<(), IrqRequestError> {
        Err(IrqRequestError {
            line,
            reason: "no interrupt controller available".to_string(),
        })
    }

    fn free(&self, _line: u32) {}
}

/// Bounds of the probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Maximum number of probe windows.
    pub rounds: u32,
    /// Wait inside each window.
    pub settle: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_PROBE_ROUNDS,
            settle: DEFAULT_PROBE_SETTLE,
        }
    }
}

/// An interrupt line bound to a bank's pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterruptBinding {
    /// Line number reported by the probe.
    pub line: u32,
    /// Bank whose DATAIN register is sampled on each trigger.
    pub bank: Bank,
    /// Pin mask used to assert and clear interrupt status.
    pub mask: u32,
}

/// Discover the interrupt line raised by `mask` on `bank`.
pub(crate) fn probe_line<P, C>(
    port: &P,
    irq: &C,
    bank: Bank,
    mask: u32,
    settings: &ProbeSettings,
) -> Option<u32>
where
    P: RegisterPort + ?Sized,
    C: IrqController + ?Sized,
{
    for attempt in 1..=settings.rounds {
        let window = irq.probe_on();
        write_reg(port, bank, Register::IrqStatusSet0, mask);
        write_reg(port, bank, Register::IrqStatusSet1, mask);
        irq.settle(settings.settle);

        match irq.probe_off(window) {
            Some(line) => {
                debug!(%bank, line, attempt, "probe reported interrupt line");
                return Some(line);
            }
            None => debug!(%bank, attempt, "no irq reported by probe"),
        }
    }

    warn!(
        %bank,
        mask = format_args!("0x{mask:08X}"),
        attempts = settings.rounds,
        "no irq reported by probe after all attempts"
    );
    None
}

/// Clear interrupt status for `mask` on `bank`.
pub(crate) fn clear_status<P: RegisterPort + ?Sized>(port: &P, bank: Bank, mask: u32) {
    write_reg(port, bank, Register::IrqStatusClr0, mask);
    write_reg(port, bank, Register::IrqStatusClr1, mask);
    debug!(%bank, mask = format_args!("0x{mask:08X}"), "cleared interrupt status");
}
