//! # bbbgpio
//!
//! Register-level driver for the four GPIO banks of the AM335x SoC found on
//! the BeagleBone. A single exclusive-access control device lets one client
//! at a time read and write bank registers (data, direction, edge and level
//! detection) through a fixed table of opcodes, and can switch between two
//! acquisition strategies:
//!
//! - **Polling**: a raw read samples `DATAIN` directly.
//! - **Interrupt-driven**: an interrupt line is probed and bound, and each
//!   trigger captures `DATAIN` into an 8-slot ring that raw reads drain.
//!
//! ## Crate Structure
//!
//! - **`registers`**: bank bases, register offsets and address computation.
//! - **`port`**: the [`RegisterPort`] capability through which all register
//!   traffic flows, with barrier pairing.
//! - **`mmio`**: [`MmioPort`], bank windows mapped from `/dev/mem`.
//! - **`sim`**: in-memory registers and a scriptable interrupt controller.
//! - **`irq`**: the [`IrqController`] abstraction and the line probe.
//! - **`ring`**: the overwrite-on-full [`SampleRing`].
//! - **`mode`**: the polling / interrupt-driven state machine.
//! - **`ioctl`**: request numbers and the parameter block wire format.
//! - **`device`**: [`GpioDevice`] and [`GpioHandle`], the exclusivity lock
//!   and opcode dispatch.
//! - **`error`**: [`GpioError`] and its errno mapping.
//! - **`config`** / **`logging`**: Figment configuration and tracing setup.

pub mod config;
pub mod device;
pub mod error;
pub mod ioctl;
pub mod irq;
pub mod logging;
#[cfg(unix)]
pub mod mmio;
pub mod mode;
pub mod port;
pub mod registers;
pub mod ring;
pub mod sim;

pub use device::{CaptureStats, GpioDevice, GpioHandle};
pub use error::{BusyReason, GpioError, Result};
pub use ioctl::{Opcode, ParamBlock};
pub use irq::{IrqController, NullIrq};
#[cfg(unix)]
pub use mmio::MmioPort;
pub use mode::AcquisitionMode;
pub use port::RegisterPort;
pub use registers::{Bank, Register};
pub use ring::SampleRing;
