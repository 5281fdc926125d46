//! Register port capability.
//!
//! The driver never dereferences hardware addresses itself. All register
//! traffic goes through a [`RegisterPort`], which lets the same dispatch code
//! run against memory-mapped hardware ([`MmioPort`](crate::mmio::MmioPort)) or
//! an in-memory register file ([`SimulatedRegisters`](crate::sim::SimulatedRegisters)).
//!
//! Ordering: a register write must be followed by a store barrier and a
//! register read by a load barrier before the value is used. [`read_reg`] and
//! [`write_reg`] are the only paths the driver uses, and they always pair the
//! access with [`RegisterPort::barrier`].

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::registers::{address, Bank, RegAddr, Register};

/// Kind of memory barrier issued around register accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Issued after a read, before the value is consumed.
    Load,
    /// Issued after a write, before any later access.
    Store,
}

/// Access to a bank's 32-bit registers.
///
/// Implementations must be callable from the interrupt path as well as the
/// control path; the device serializes both behind its exclusivity lock.
pub trait RegisterPort: Send + Sync {
    /// Read the register at `addr`.
    fn read(&self, addr: RegAddr) -> u32;

    /// Write `value` to the register at `addr`.
    fn write(&self, addr: RegAddr, value: u32);

    /// Order this access against later ones.
    fn barrier(&self, kind: Barrier) {
        match kind {
            Barrier::Load => fence(Ordering::Acquire),
            Barrier::Store => fence(Ordering::Release),
        }
    }
}

impl<P: RegisterPort + ?Sized> RegisterPort for Arc<P> {
    fn read(&self, addr: RegAddr) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: RegAddr, value: u32) {
        (**self).write(addr, value)
    }

    fn barrier(&self, kind: Barrier) {
        (**self).barrier(kind)
    }
}

/// Read a register and issue the load barrier.
pub(crate) fn read_reg<P: RegisterPort + ?Sized>(port: &P, bank: Bank, register: Register) -> u32 {
    let addr = address(bank, register);
    let value = port.read(addr);
    port.barrier(Barrier::Load);
    trace!(%addr, value = format_args!("0x{value:08X}"), "register read");
    value
}

/// Write a register and issue the store barrier.
pub(crate) fn write_reg<P: RegisterPort + ?Sized>(
    port: &P,
    bank: Bank,
    register: Register,
    value: u32,
) {
    let addr = address(bank, register);
    port.write(addr, value);
    port.barrier(Barrier::Store);
    trace!(%addr, value = format_args!("0x{value:08X}"), "register write");
}
