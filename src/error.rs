//! Error types for GPIO device operations.
//!
//! Every failure a client can observe from the control device is one variant
//! of [`GpioError`]. The variants mirror the errno values the character device
//! returned to userspace, and [`GpioError::errno`] recovers that number for
//! callers that still speak the ioctl ABI.
//!
//! ## Error Taxonomy
//!
//! - **`Busy`**: the exclusivity lock was contended, or the device is already open.
//! - **`NoSuchDevice`**: the session was destroyed (driver unloaded).
//! - **`InvalidSlot`**: a bank index outside `0..=3`.
//! - **`TransferFault`**: a caller buffer too small to carry the payload.
//! - **`NoData`**: the interrupt sample ring is empty.
//! - **`UnsupportedOpcode`**: an unknown control request number.
//!
//! Failures to register an interrupt handler are not part of this taxonomy.
//! They are reported by the [`IrqController`](crate::irq::IrqController) as
//! [`IrqRequestError`] and only ever logged, since enabling interrupt mode
//! falls back to polling rather than failing.

use std::fmt;

use thiserror::Error;

/// Result type alias for GPIO device operations.
pub type Result<T> = std::result::Result<T, GpioError>;

/// Why a request was refused with [`GpioError::Busy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// Another caller currently holds the exclusivity lock.
    Contended,
    /// A session is already open on the device.
    AlreadyOpen,
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contended => write!(f, "lock held by another caller"),
            Self::AlreadyOpen => write!(f, "already open"),
        }
    }
}

/// Errors reported by the GPIO control device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpioError {
    /// The device could not be claimed right now.
    #[error("Device busy: {0}")]
    Busy(BusyReason),

    /// The device session no longer exists.
    #[error("No such device: session has been destroyed")]
    NoSuchDevice,

    /// Bank index outside the four GPIO banks.
    #[error("Invalid GPIO bank {bank}: expected 0..=3")]
    InvalidSlot {
        /// The rejected bank index.
        bank: u8,
    },

    /// The caller buffer cannot carry the payload.
    #[error("Transfer fault: payload needs {needed} bytes, buffer has {got}")]
    TransferFault {
        /// Bytes the payload requires.
        needed: usize,
        /// Bytes the caller supplied.
        got: usize,
    },

    /// No captured sample is waiting in the interrupt ring.
    #[error("No data: interrupt sample buffer is empty")]
    NoData,

    /// The request number does not map to any opcode.
    #[error("Unsupported control request 0x{request:08X}")]
    UnsupportedOpcode {
        /// The raw request number.
        request: u32,
    },
}

impl GpioError {
    /// The errno the character device would have returned for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Busy(_) => libc::EBUSY,
            Self::NoSuchDevice => libc::ENODEV,
            Self::InvalidSlot { .. } => libc::EBADSLT,
            Self::TransferFault { .. } => libc::EINVAL,
            Self::NoData => libc::ENODATA,
            Self::UnsupportedOpcode { .. } => libc::ENOTTY,
        }
    }

    /// Check if the device was busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Check if this is a bank validation failure.
    pub fn is_invalid_slot(&self) -> bool {
        matches!(self, Self::InvalidSlot { .. })
    }
}

/// An [`IrqController`](crate::irq::IrqController) refused to attach a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Interrupt line {line} unavailable: {reason}")]
pub struct IrqRequestError {
    /// Line that was requested.
    pub line: u32,
    /// Controller-specific explanation.
    pub reason: String,
}
