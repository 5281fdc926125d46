//! Shared fixtures for the device integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};

use bbbgpio::device::{GpioDevice, GpioHandle};
use bbbgpio::port::{Barrier as MemBarrier, RegisterPort};
use bbbgpio::registers::{Bank, RegAddr, Register};
use bbbgpio::sim::{SimulatedIrq, SimulatedRegisters};

pub type SimDevice = GpioDevice<Arc<SimulatedRegisters>, Arc<SimulatedIrq>>;
pub type SimHandle = GpioHandle<Arc<SimulatedRegisters>, Arc<SimulatedIrq>>;

/// Device over fresh simulated registers and the given controller.
pub fn sim_device(irq: SimulatedIrq) -> (SimDevice, Arc<SimulatedRegisters>, Arc<SimulatedIrq>) {
    let port = Arc::new(SimulatedRegisters::new());
    let irq = Arc::new(irq);
    let device = GpioDevice::new("it", Arc::clone(&port), Arc::clone(&irq));
    (device, port, irq)
}

pub fn bank(n: u8) -> Bank {
    Bank::try_from(n).unwrap()
}

/// Register port that parks the first read of one register until released.
///
/// Lets a test hold the device lock from inside a control request while
/// another thread probes contention.
pub struct GatedPort {
    pub inner: SimulatedRegisters,
    gate: Register,
    armed: AtomicBool,
    pub entered: Barrier,
    pub release: Barrier,
}

impl GatedPort {
    pub fn new(gate: Register) -> Self {
        Self {
            inner: SimulatedRegisters::new(),
            gate,
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl RegisterPort for GatedPort {
    fn read(&self, addr: RegAddr) -> u32 {
        if addr.register() == self.gate && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.read(addr)
    }

    fn write(&self, addr: RegAddr, value: u32) {
        self.inner.write(addr, value)
    }

    fn barrier(&self, kind: MemBarrier) {
        self.inner.barrier(kind)
    }
}

pub type GatedDevice = GpioDevice<Arc<GatedPort>, Arc<SimulatedIrq>>;

pub fn gated_device(gate: Register, irq: SimulatedIrq) -> (GatedDevice, Arc<GatedPort>, Arc<SimulatedIrq>) {
    let port = Arc::new(GatedPort::new(gate));
    let irq = Arc::new(irq);
    let device = GpioDevice::new("gated", Arc::clone(&port), Arc::clone(&irq));
    (device, port, irq)
}
