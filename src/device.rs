//! The exclusive-access GPIO control device.
//!
//! [`GpioDevice`] owns the register port, the interrupt controller and the
//! single device session. Clients claim the session with
//! [`GpioDevice::open`], which hands back a [`GpioHandle`]; the handle is the
//! only way to issue control requests or raw sample transfers, and dropping it
//! releases the device again.
//!
//! # Locking
//!
//! The session lives behind one `parking_lot::Mutex<Option<Session>>`, shared
//! by the control path and the interrupt capture handler. Every operation
//! except close and unload takes the lock with `try_lock` and reports
//! [`GpioError::Busy`] instead of waiting. The handler does the same and drops
//! the trigger when the lock is held. A `None` session means the driver was
//! unloaded and yields [`GpioError::NoSuchDevice`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bbbgpio::device::GpioDevice;
//! use bbbgpio::ioctl::{Opcode, ParamBlock};
//! use bbbgpio::sim::{SimulatedIrq, SimulatedRegisters};
//!
//! # fn main() -> bbbgpio::error::Result<()> {
//! let device = GpioDevice::new("bbbgpio", Arc::new(SimulatedRegisters::new()), SimulatedIrq::new());
//! let handle = device.open()?;
//!
//! let mut block = ParamBlock::new(1, 1 << 21);
//! handle.dispatch(Opcode::WriteData, &mut block)?;
//! handle.close();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::config::DriverConfig;
use crate::error::{BusyReason, GpioError, Result};
use crate::ioctl::{decode_sample, encode_sample, Action, Opcode, ParamBlock, SAMPLE_SIZE};
use crate::irq::{
    clear_status, probe_line, InterruptBinding, IrqController, IrqHandler, IrqReturn,
    ProbeSettings,
};
use crate::mode::{AcquisitionMode, AcquisitionState};
use crate::port::{read_reg, write_reg, RegisterPort};
use crate::registers::{Bank, Register};
use crate::ring::SampleRing;

/// Per-device state guarded by the exclusivity lock.
#[derive(Debug, Default)]
struct Session {
    open: bool,
    block: ParamBlock,
    acquisition: AcquisitionState,
    ring: SampleRing,
}

/// Outcome of a non-blocking lock attempt.
enum Acquire<'a> {
    Acquired(MappedMutexGuard<'a, Session>),
    Busy,
    Absent,
}

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    dropped_contended: AtomicU64,
    overwritten: AtomicU64,
    spurious: AtomicU64,
}

/// Snapshot of the interrupt capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Samples pushed into the ring.
    pub captured: u64,
    /// Triggers skipped because the lock was held.
    pub dropped_contended: u64,
    /// Samples evicted from a full ring before being read.
    pub overwritten: u64,
    /// Triggers on a line other than the bound one.
    pub spurious: u64,
}

struct Inner<P: RegisterPort, C: IrqController> {
    name: String,
    port: P,
    irq: C,
    probe: ProbeSettings,
    session: Mutex<Option<Session>>,
    counters: Counters,
}

impl<P, C> Inner<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    fn try_acquire(&self) -> Acquire<'_> {
        let Some(guard) = self.session.try_lock() else {
            return Acquire::Busy;
        };
        match MutexGuard::try_map(guard, |session| session.as_mut()) {
            Ok(session) => Acquire::Acquired(session),
            Err(_) => Acquire::Absent,
        }
    }

    /// Non-blocking access for the control path.
    fn session(&self) -> Result<MappedMutexGuard<'_, Session>> {
        match self.try_acquire() {
            Acquire::Acquired(session) => Ok(session),
            Acquire::Busy => {
                debug!(device = %self.name, "exclusivity lock contended");
                Err(GpioError::Busy(BusyReason::Contended))
            }
            Acquire::Absent => Err(GpioError::NoSuchDevice),
        }
    }

    fn execute(
        self: &Arc<Self>,
        session: &mut Session,
        opcode: Opcode,
        block: &mut ParamBlock,
    ) -> Result<()> {
        session.block = *block;
        let bank = Bank::try_from(block.bank).inspect_err(|_| {
            error!(device = %self.name, ?opcode, bank = block.bank, "invalid GPIO bank");
        })?;

        match opcode.action() {
            Action::Write(register) => write_reg(&self.port, bank, register, block.write_value),
            Action::Configure(register) => {
                let mode = session.acquisition.mode();
                if mode.allows_detect_config() {
                    write_reg(&self.port, bank, register, block.write_value);
                } else {
                    debug!(device = %self.name, ?opcode, %mode, "detect configuration frozen, ignoring");
                }
            }
            Action::Read(register) => block.read_value = read_reg(&self.port, bank, register),
            Action::EnableInterrupt => self.enable_interrupt(session, bank, block.write_value),
            Action::GetMode => block.read_value = session.acquisition.mode().as_raw(),
            Action::ForcePolling => self.force_polling(session, bank, block.write_value),
        }

        session.block = *block;
        Ok(())
    }

    fn enable_interrupt(self: &Arc<Self>, session: &mut Session, bank: Bank, mask: u32) {
        if let Some(binding) = session.acquisition.binding() {
            debug!(device = %self.name, line = binding.line, "interrupt mode already active");
            return;
        }

        let Some(line) = probe_line(&self.port, &self.irq, bank, mask, &self.probe) else {
            warn!(device = %self.name, %bank, "interrupt probe failed, staying in polling mode");
            return;
        };

        let binding = InterruptBinding { line, bank, mask };
        if let Err(err) = self.irq.request(line, self.capture_handler(binding)) {
            error!(device = %self.name, line, error = %err, "can't get assigned irq");
            return;
        }

        session.ring.init();
        session.acquisition.enter_interrupt(binding);
        info!(device = %self.name, line, %bank, mask = format_args!("0x{mask:08X}"), "interrupt-driven mode enabled");
    }

    /// Clear status for the caller's bank and mask, then drop any binding.
    ///
    /// A binding on another bank or mask is cleared as well before its line
    /// is freed.
    fn force_polling(&self, session: &mut Session, bank: Bank, mask: u32) {
        clear_status(&self.port, bank, mask);
        match session.acquisition.enter_polling() {
            Some(binding) => {
                if (binding.bank, binding.mask) != (bank, mask) {
                    clear_status(&self.port, binding.bank, binding.mask);
                }
                self.irq.free(binding.line);
                info!(device = %self.name, line = binding.line, "polling mode forced");
            }
            None => debug!(device = %self.name, "already polling"),
        }
    }

    fn release(&self, binding: InterruptBinding) {
        clear_status(&self.port, binding.bank, binding.mask);
        self.irq.free(binding.line);
    }

    fn capture_handler(self: &Arc<Self>, binding: InterruptBinding) -> IrqHandler {
        let device = Arc::downgrade(self);
        Arc::new(move |line| {
            if let Some(device) = device.upgrade() {
                device.capture(line, binding.bank);
            }
            IrqReturn::Handled
        })
    }

    /// Interrupt path: sample DATAIN of the bound bank into the ring.
    fn capture(&self, line: u32, bank: Bank) {
        let mut session = match self.try_acquire() {
            Acquire::Acquired(session) => session,
            Acquire::Busy => {
                self.counters.dropped_contended.fetch_add(1, Ordering::Relaxed);
                trace!(device = %self.name, line, "lock held, sample dropped");
                return;
            }
            Acquire::Absent => return,
        };

        if session.acquisition.binding().map(|b| b.line) != Some(line) {
            self.counters.spurious.fetch_add(1, Ordering::Relaxed);
            trace!(device = %self.name, line, "trigger on unbound line");
            return;
        }

        let sample = read_reg(&self.port, bank, Register::DataIn);
        if session.ring.push(sample).is_some() {
            self.counters.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.captured.fetch_add(1, Ordering::Relaxed);
        trace!(device = %self.name, line, sample = format_args!("0x{sample:08X}"), "sample captured");
    }

    fn take_sample(&self, session: &mut Session) -> Result<u32> {
        if session.acquisition.mode().is_interrupt_driven() {
            return session.ring.pop().ok_or(GpioError::NoData);
        }
        let bank = Bank::try_from(session.block.bank)?;
        Ok(read_reg(&self.port, bank, Register::DataIn))
    }

    fn put_sample(&self, session: &mut Session, sample: u32) -> Result<()> {
        session.block.write_value = sample;
        let bank = Bank::try_from(session.block.bank)?;
        write_reg(&self.port, bank, Register::DataOut, sample);
        Ok(())
    }
}

impl<P: RegisterPort, C: IrqController> Drop for Inner<P, C> {
    fn drop(&mut self) {
        let binding = self
            .session
            .get_mut()
            .as_mut()
            .and_then(|session| session.acquisition.enter_polling());
        if let Some(binding) = binding {
            clear_status(&self.port, binding.bank, binding.mask);
            self.irq.free(binding.line);
            debug!(device = %self.name, line = binding.line, "released interrupt line on drop");
        }
    }
}

/// A GPIO control device.
///
/// Cloning yields another reference to the same device and session.
pub struct GpioDevice<P: RegisterPort, C: IrqController> {
    inner: Arc<Inner<P, C>>,
}

impl<P, C> GpioDevice<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    /// Load a device with default probe settings.
    pub fn new(name: impl Into<String>, port: P, irq: C) -> Self {
        Self::with_probe_settings(name, port, irq, ProbeSettings::default())
    }

    /// Load a device with explicit probe bounds.
    pub fn with_probe_settings(
        name: impl Into<String>,
        port: P,
        irq: C,
        probe: ProbeSettings,
    ) -> Self {
        let name = name.into();
        info!(device = %name, rounds = probe.rounds, "GPIO device loaded");
        Self {
            inner: Arc::new(Inner {
                name,
                port,
                irq,
                probe,
                session: Mutex::new(Some(Session::default())),
                counters: Counters::default(),
            }),
        }
    }

    /// Load a device named and tuned by `config`.
    pub fn from_config(config: &DriverConfig, port: P, irq: C) -> Self {
        let device = Self::with_probe_settings(
            config.device.name.clone(),
            port,
            irq,
            config.interrupt.probe_settings(),
        );
        info!(device = %config.device.name, node = %config.device.node, "device node registered");
        device
    }

    /// Claim the device.
    ///
    /// # Errors
    ///
    /// [`GpioError::Busy`] if another caller holds the lock or a session is
    /// already open, [`GpioError::NoSuchDevice`] after [`unload`](Self::unload).
    pub fn open(&self) -> Result<GpioHandle<P, C>> {
        let mut session = self.inner.session()?;
        if session.open {
            warn!(device = %self.inner.name, "open refused: device already open");
            return Err(GpioError::Busy(BusyReason::AlreadyOpen));
        }
        session.open = true;
        drop(session);

        info!(device = %self.inner.name, "device opened");
        Ok(GpioHandle {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Tear the session down and release any bound interrupt line.
    ///
    /// Blocks until the lock is free. Every later call on the device or on
    /// outstanding handles fails with [`GpioError::NoSuchDevice`].
    pub fn unload(&self) {
        let session = self.inner.session.lock().take();
        let Some(mut session) = session else {
            return;
        };
        if let Some(binding) = session.acquisition.enter_polling() {
            self.inner.release(binding);
        }
        info!(device = %self.inner.name, "GPIO device unloaded");
    }

    /// Current acquisition mode, or `None` once unloaded.
    ///
    /// Blocks while a request or capture holds the lock.
    pub fn mode(&self) -> Option<AcquisitionMode> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.acquisition.mode())
    }

    /// Interrupt binding backing interrupt-driven mode, if any.
    ///
    /// Blocks while a request or capture holds the lock.
    pub fn binding(&self) -> Option<InterruptBinding> {
        self.inner
            .session
            .lock()
            .as_ref()
            .and_then(|session| session.acquisition.binding().copied())
    }

    /// Whether a handle currently holds the device.
    ///
    /// Blocks while a request or capture holds the lock.
    pub fn is_open(&self) -> bool {
        self.inner
            .session
            .lock()
            .as_ref()
            .is_some_and(|session| session.open)
    }

    /// Interrupt capture counters.
    pub fn stats(&self) -> CaptureStats {
        let c = &self.inner.counters;
        CaptureStats {
            captured: c.captured.load(Ordering::Relaxed),
            dropped_contended: c.dropped_contended.load(Ordering::Relaxed),
            overwritten: c.overwritten.load(Ordering::Relaxed),
            spurious: c.spurious.load(Ordering::Relaxed),
        }
    }

    /// Device name used in log records.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<P: RegisterPort, C: IrqController> Clone for GpioDevice<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RegisterPort, C: IrqController> fmt::Debug for GpioDevice<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioDevice")
            .field("name", &self.inner.name)
            .field("probe", &self.inner.probe)
            .finish_non_exhaustive()
    }
}

/// An open session on a [`GpioDevice`].
///
/// Dropping the handle closes the device.
pub struct GpioHandle<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    inner: Arc<Inner<P, C>>,
}

impl<P, C> GpioHandle<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    /// Execute a raw control request against a 12-byte parameter block.
    ///
    /// `arg` is decoded, executed and written back in place.
    pub fn ioctl(&self, request: u32, arg: &mut [u8]) -> Result<()> {
        let mut session = self.inner.session()?;
        let opcode = Opcode::try_from(request).inspect_err(|_| {
            warn!(device = %self.inner.name, request = format_args!("0x{request:08X}"), "unsupported control request");
        })?;
        let mut block = ParamBlock::decode(arg)?;
        self.inner.execute(&mut session, opcode, &mut block)?;
        block.encode(arg)
    }

    /// Execute a typed control request.
    pub fn dispatch(&self, opcode: Opcode, block: &mut ParamBlock) -> Result<()> {
        let mut session = self.inner.session()?;
        self.inner.execute(&mut session, opcode, block)
    }

    /// Read one sample as 4 little-endian bytes.
    ///
    /// Returns the number of bytes written.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut session = self.inner.session()?;
        if buf.len() < SAMPLE_SIZE {
            return Err(GpioError::TransferFault {
                needed: SAMPLE_SIZE,
                got: buf.len(),
            });
        }
        let sample = self.inner.take_sample(&mut session)?;
        encode_sample(sample, buf)
    }

    /// Read one sample.
    ///
    /// Polling mode samples DATAIN of the last addressed bank; interrupt mode
    /// pops the oldest captured sample or fails with [`GpioError::NoData`].
    pub fn read_sample(&self) -> Result<u32> {
        let mut session = self.inner.session()?;
        self.inner.take_sample(&mut session)
    }

    /// Write one sample given as at least 4 little-endian bytes.
    ///
    /// Returns the number of bytes consumed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut session = self.inner.session()?;
        let sample = decode_sample(buf)?;
        self.inner.put_sample(&mut session, sample)?;
        Ok(SAMPLE_SIZE)
    }

    /// Drive DATAOUT of the last addressed bank.
    pub fn write_sample(&self, sample: u32) -> Result<()> {
        let mut session = self.inner.session()?;
        self.inner.put_sample(&mut session, sample)
    }

    /// Release the device.
    ///
    /// Unlike every other request this waits for the lock instead of
    /// reporting [`GpioError::Busy`].
    pub fn close(self) {}
}

impl<P, C> Drop for GpioHandle<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    fn drop(&mut self) {
        if let Some(session) = self.inner.session.lock().as_mut() {
            session.open = false;
            info!(device = %self.inner.name, "device closed");
        }
    }
}

impl<P, C> fmt::Debug for GpioHandle<P, C>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioHandle")
            .field("device", &self.inner.name)
            .finish()
    }
}
