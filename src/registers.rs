//! AM335x GPIO register map.
//!
//! The SoC exposes four GPIO banks, each a 4 KiB window of 32-bit registers
//! where bit *n* controls pin *n* of the bank. [`address`] combines a
//! validated [`Bank`] with a [`Register`] into a [`RegAddr`]; because a
//! `Bank` can only be obtained through [`Bank::try_from`], an out-of-range
//! bank never reaches the address computation.

use std::fmt;

use serde::Serialize;

use crate::error::GpioError;

/// Number of GPIO banks on the SoC.
pub const BANK_COUNT: usize = 4;

/// Size of one bank's register window in bytes.
pub const BANK_WINDOW: usize = 0x1000;

/// Physical base address of each bank's register window.
const BANK_BASES: [u32; BANK_COUNT] = [0x44E0_7000, 0x4804_C000, 0x481A_C000, 0x481A_E000];

/// A validated GPIO bank index (0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Bank(u8);

impl Bank {
    /// Bank index as it appears in the parameter block.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Physical base address of the bank's register window.
    #[must_use]
    pub const fn base(self) -> u32 {
        BANK_BASES[self.0 as usize]
    }

    /// Iterate over all four banks.
    pub fn all() -> impl Iterator<Item = Bank> {
        (0..BANK_COUNT as u8).map(Bank)
    }
}

impl TryFrom<u8> for Bank {
    type Error = GpioError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        if (index as usize) < BANK_COUNT {
            Ok(Self(index))
        } else {
            Err(GpioError::InvalidSlot { bank: index })
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio{}", self.0)
    }
}

/// Registers of a GPIO bank used by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Register {
    /// Force-assert interrupt status, line 0.
    IrqStatusSet0 = 0x034,
    /// Force-assert interrupt status, line 1.
    IrqStatusSet1 = 0x038,
    /// Clear interrupt status, line 0.
    IrqStatusClr0 = 0x03C,
    /// Clear interrupt status, line 1.
    IrqStatusClr1 = 0x040,
    /// Output enable (pin direction; a set bit is an input).
    OutputEnable = 0x134,
    /// Sampled input levels.
    DataIn = 0x138,
    /// Driven output levels.
    DataOut = 0x13C,
    /// Low-level detect enable.
    LevelDetect0 = 0x140,
    /// High-level detect enable.
    LevelDetect1 = 0x144,
    /// Rising-edge detect enable.
    RisingDetect = 0x148,
    /// Falling-edge detect enable.
    FallingDetect = 0x14C,
}

impl Register {
    /// Byte offset of the register inside the bank window.
    #[must_use]
    pub const fn offset(self) -> u32 {
        self as u32
    }

    /// Datasheet name of the register.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IrqStatusSet0 => "GPIO_IRQSTATUS_SET_0",
            Self::IrqStatusSet1 => "GPIO_IRQSTATUS_SET_1",
            Self::IrqStatusClr0 => "GPIO_IRQSTATUS_CLR_0",
            Self::IrqStatusClr1 => "GPIO_IRQSTATUS_CLR_1",
            Self::OutputEnable => "GPIO_OE",
            Self::DataIn => "GPIO_DATAIN",
            Self::DataOut => "GPIO_DATAOUT",
            Self::LevelDetect0 => "GPIO_LEVELDETECT0",
            Self::LevelDetect1 => "GPIO_LEVELDETECT1",
            Self::RisingDetect => "GPIO_RISINGDETECT",
            Self::FallingDetect => "GPIO_FALLINGDETECT",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A register of a specific bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegAddr {
    bank: Bank,
    register: Register,
}

impl RegAddr {
    /// Bank the register belongs to.
    #[must_use]
    pub const fn bank(self) -> Bank {
        self.bank
    }

    /// Register within the bank.
    #[must_use]
    pub const fn register(self) -> Register {
        self.register
    }

    /// Physical bus address.
    #[must_use]
    pub const fn physical(self) -> u32 {
        self.bank.base() + self.register.offset()
    }
}

impl fmt::Display for RegAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@0x{:08X}", self.bank, self.register, self.physical())
    }
}

/// Address of `register` in `bank`.
#[must_use]
pub const fn address(bank: Bank, register: Register) -> RegAddr {
    RegAddr { bank, register }
}
