//! Control request numbers and the parameter block wire format.
//!
//! Requests follow the Linux `_IOW`/`_IOR` encoding with magic `'K'` and a
//! 4-byte argument size, the numbers the BeagleBone character device used.
//! Each request carries a [`ParamBlock`] laid out like the C struct
//! `{ u8 gpio_group; u32 write_buffer; u32 read_buffer; }`:
//!
//! ```text
//!   0      1          4                8                12
//!   ┌──────┬──────────┬────────────────┬────────────────┐
//!   │ bank │ padding  │ write (LE u32) │ read  (LE u32) │
//!   └──────┴──────────┴────────────────┴────────────────┘
//! ```

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{GpioError, Result};
use crate::registers::Register;

/// Magic number shared by all control requests.
pub const IOCTL_MAGIC: u8 = b'K';

/// Size in bytes of an encoded [`ParamBlock`].
pub const PARAM_BLOCK_SIZE: usize = 12;

/// Size in bytes of one raw stream sample.
pub const SAMPLE_SIZE: usize = 4;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const IOC_ARG_SIZE: u32 = 4;

const fn ioc(dir: u32, nr: u8) -> u32 {
    (dir << 30) | (IOC_ARG_SIZE << 16) | ((IOCTL_MAGIC as u32) << 8) | nr as u32
}

/// Control operations understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Write DATAOUT.
    WriteData,
    /// Read DATAIN.
    ReadData,
    /// Write OE (pin direction).
    SetDirection,
    /// Read OE.
    GetDirection,
    /// Write LEVELDETECT0.
    SetLowDetect,
    /// Write LEVELDETECT1.
    SetHighDetect,
    /// Write RISINGDETECT.
    SetRisingEdge,
    /// Write FALLINGDETECT.
    SetFallingEdge,
    /// Read LEVELDETECT0.
    GetLowDetect,
    /// Read LEVELDETECT1.
    GetHighDetect,
    /// Read RISINGDETECT.
    GetRisingEdge,
    /// Read FALLINGDETECT.
    GetFallingEdge,
    /// Probe and bind an interrupt line, then switch to interrupt mode.
    EnableInterrupt,
    /// Report the acquisition mode in `read_value`.
    GetMode,
    /// Clear interrupt status, release the line and return to polling.
    ForcePolling,
}

/// What an opcode does to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write `write_value` to the register.
    Write(Register),
    /// Write `write_value` to a detect register, unless interrupt mode froze it.
    Configure(Register),
    /// Read the register into `read_value`.
    Read(Register),
    /// Enter interrupt-driven mode.
    EnableInterrupt,
    /// Report the mode.
    GetMode,
    /// Enter polling mode.
    ForcePolling,
}

impl Opcode {
    /// Every opcode, in request-number order.
    pub const ALL: [Opcode; 15] = [
        Self::WriteData,
        Self::ReadData,
        Self::SetDirection,
        Self::GetDirection,
        Self::SetLowDetect,
        Self::SetHighDetect,
        Self::SetRisingEdge,
        Self::SetFallingEdge,
        Self::GetLowDetect,
        Self::GetHighDetect,
        Self::GetRisingEdge,
        Self::GetFallingEdge,
        Self::EnableInterrupt,
        Self::GetMode,
        Self::ForcePolling,
    ];

    /// Sequence number inside the `'K'` request space.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::WriteData => 1,
            Self::ReadData => 2,
            Self::SetDirection => 3,
            Self::GetDirection => 4,
            Self::SetLowDetect => 5,
            Self::SetHighDetect => 6,
            Self::SetRisingEdge => 7,
            Self::SetFallingEdge => 8,
            Self::GetLowDetect => 9,
            Self::GetHighDetect => 10,
            Self::GetRisingEdge => 11,
            Self::GetFallingEdge => 12,
            Self::EnableInterrupt => 13,
            Self::GetMode => 14,
            Self::ForcePolling => 15,
        }
    }

    /// Whether the caller receives data back (`_IOR`) rather than sends it.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadData
                | Self::GetDirection
                | Self::GetLowDetect
                | Self::GetHighDetect
                | Self::GetRisingEdge
                | Self::GetFallingEdge
                | Self::GetMode
        )
    }

    /// Encoded request number.
    #[must_use]
    pub const fn request(self) -> u32 {
        let dir = if self.is_read() { IOC_READ } else { IOC_WRITE };
        ioc(dir, self.number())
    }

    /// Look up the opcode for an encoded request number.
    pub fn from_request(request: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.request() == request)
    }

    /// Hardware effect of the opcode.
    #[must_use]
    pub const fn action(self) -> Action {
        match self {
            Self::WriteData => Action::Write(Register::DataOut),
            Self::ReadData => Action::Read(Register::DataIn),
            Self::SetDirection => Action::Write(Register::OutputEnable),
            Self::GetDirection => Action::Read(Register::OutputEnable),
            Self::SetLowDetect => Action::Configure(Register::LevelDetect0),
            Self::SetHighDetect => Action::Configure(Register::LevelDetect1),
            Self::SetRisingEdge => Action::Configure(Register::RisingDetect),
            Self::SetFallingEdge => Action::Configure(Register::FallingDetect),
            Self::GetLowDetect => Action::Read(Register::LevelDetect0),
            Self::GetHighDetect => Action::Read(Register::LevelDetect1),
            Self::GetRisingEdge => Action::Read(Register::RisingDetect),
            Self::GetFallingEdge => Action::Read(Register::FallingDetect),
            Self::EnableInterrupt => Action::EnableInterrupt,
            Self::GetMode => Action::GetMode,
            Self::ForcePolling => Action::ForcePolling,
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = GpioError;

    fn try_from(request: u32) -> Result<Self> {
        Self::from_request(request).ok_or(GpioError::UnsupportedOpcode { request })
    }
}

/// Request/response payload of every control call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBlock {
    /// GPIO bank index, valid range 0..=3.
    pub bank: u8,
    /// Value to write; bit *n* is pin *n*.
    pub write_value: u32,
    /// Value read back by the driver.
    pub read_value: u32,
}

impl ParamBlock {
    /// Block addressed to `bank` carrying `write_value`.
    pub const fn new(bank: u8, write_value: u32) -> Self {
        Self {
            bank,
            write_value,
            read_value: 0,
        }
    }

    /// Decode a block from caller memory.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < PARAM_BLOCK_SIZE {
            return Err(GpioError::TransferFault {
                needed: PARAM_BLOCK_SIZE,
                got: src.len(),
            });
        }
        let mut buf = &src[..PARAM_BLOCK_SIZE];
        let bank = buf.get_u8();
        buf.advance(3);
        let write_value = buf.get_u32_le();
        let read_value = buf.get_u32_le();
        Ok(Self {
            bank,
            write_value,
            read_value,
        })
    }

    /// Encode the block into caller memory.
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < PARAM_BLOCK_SIZE {
            return Err(GpioError::TransferFault {
                needed: PARAM_BLOCK_SIZE,
                got: dst.len(),
            });
        }
        let mut buf = &mut dst[..PARAM_BLOCK_SIZE];
        buf.put_u8(self.bank);
        buf.put_bytes(0, 3);
        buf.put_u32_le(self.write_value);
        buf.put_u32_le(self.read_value);
        Ok(())
    }

    /// Encode into a fresh array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PARAM_BLOCK_SIZE] {
        let mut out = [0u8; PARAM_BLOCK_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(self.bank);
        buf.put_bytes(0, 3);
        buf.put_u32_le(self.write_value);
        buf.put_u32_le(self.read_value);
        out
    }
}

/// Decode one raw stream sample.
pub(crate) fn decode_sample(src: &[u8]) -> Result<u32> {
    if src.len() < SAMPLE_SIZE {
        return Err(GpioError::TransferFault {
            needed: SAMPLE_SIZE,
            got: src.len(),
        });
    }
    Ok((&src[..SAMPLE_SIZE]).get_u32_le())
}

/// Encode one raw stream sample.
pub(crate) fn encode_sample(sample: u32, dst: &mut [u8]) -> Result<usize> {
    if dst.len() < SAMPLE_SIZE {
        return Err(GpioError::TransferFault {
            needed: SAMPLE_SIZE,
            got: dst.len(),
        });
    }
    (&mut dst[..SAMPLE_SIZE]).put_u32_le(sample);
    Ok(SAMPLE_SIZE)
}
