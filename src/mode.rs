//! Acquisition mode state machine.
//!
//! ```text
//!            enter_interrupt(binding)
//!   Polling ─────────────────────────► InterruptDriven
//!      ▲                                     │
//!      └──────────── enter_polling() ◄───────┘
//! ```
//!
//! `Polling` is the initial state. The transition to `InterruptDriven` is only
//! taken once a line has been probed and a handler attached, so the machine
//! always carries the binding that justifies the mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::irq::InterruptBinding;

/// How raw reads obtain their sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum AcquisitionMode {
    /// Raw reads sample DATAIN directly.
    #[default]
    Polling = 0,
    /// Raw reads pop samples captured by the interrupt handler.
    InterruptDriven = 1,
}

impl AcquisitionMode {
    /// Numeric value reported through the get-mode opcode.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Parse the numeric value reported through the get-mode opcode.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Polling),
            1 => Some(Self::InterruptDriven),
            _ => None,
        }
    }

    /// Whether edge/level detect registers may be reprogrammed.
    ///
    /// Detect configuration is frozen while an interrupt source is live.
    #[must_use]
    pub const fn allows_detect_config(self) -> bool {
        matches!(self, Self::Polling)
    }

    /// Whether samples come from the interrupt ring.
    #[must_use]
    pub const fn is_interrupt_driven(self) -> bool {
        matches!(self, Self::InterruptDriven)
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => write!(f, "polling"),
            Self::InterruptDriven => write!(f, "interrupt-driven"),
        }
    }
}

/// Current mode together with the binding that backs interrupt mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionState {
    binding: Option<InterruptBinding>,
}

impl AcquisitionState {
    /// Start in polling mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> AcquisitionMode {
        if self.binding.is_some() {
            AcquisitionMode::InterruptDriven
        } else {
            AcquisitionMode::Polling
        }
    }

    /// Binding backing interrupt mode, if any.
    #[must_use]
    pub fn binding(&self) -> Option<&InterruptBinding> {
        self.binding.as_ref()
    }

    /// Switch to interrupt-driven mode with a freshly attached `binding`.
    ///
    /// Returns the binding that was replaced; callers only enter interrupt
    /// mode from polling, so this is `None` in practice.
    pub fn enter_interrupt(&mut self, binding: InterruptBinding) -> Option<InterruptBinding> {
        self.binding.replace(binding)
    }

    /// Switch back to polling, handing back the binding to release.
    pub fn enter_polling(&mut self) -> Option<InterruptBinding> {
        self.binding.take()
    }
}
