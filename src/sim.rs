//! Simulated GPIO hardware for testing without a BeagleBone.
//!
//! [`SimulatedRegisters`] is an in-memory register file that records every
//! access and barrier issued through the [`RegisterPort`] interface, so tests
//! can assert both values and ordering. [`SimulatedIrq`] stands in for the
//! kernel interrupt controller: probe results are scripted, requests can be
//! refused, and [`SimulatedIrq::fire`] plays the role of the hardware raising
//! a line.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::IrqRequestError;
use crate::irq::{IrqController, IrqHandler, IrqReturn, ProbeMask};
use crate::port::{Barrier, RegisterPort};
use crate::registers::RegAddr;

/// One recorded register-port operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A register read.
    Read(RegAddr),
    /// A register write with the written value.
    Write(RegAddr, u32),
    /// A memory barrier.
    Barrier(Barrier),
}

/// In-memory register file with an access log.
///
/// Registers that were never written read as zero. [`poke`](Self::poke) and
/// [`peek`](Self::peek) bypass the log so tests can model pin levels and
/// inspect results without disturbing the recorded traffic.
#[derive(Debug, Default)]
pub struct SimulatedRegisters {
    registers: Mutex<HashMap<u32, u32>>,
    log: Mutex<Vec<Access>>,
}

impl SimulatedRegisters {
    /// Create an empty register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a register value without logging (e.g. drive input pins).
    pub fn poke(&self, addr: RegAddr, value: u32) {
        self.registers.lock().insert(addr.physical(), value);
    }

    /// Read a register value without logging.
    pub fn peek(&self, addr: RegAddr) -> u32 {
        self.registers
            .lock()
            .get(&addr.physical())
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all recorded accesses, oldest first.
    pub fn accesses(&self) -> Vec<Access> {
        self.log.lock().clone()
    }

    /// Number of register reads and writes recorded (barriers excluded).
    pub fn register_access_count(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|a| !matches!(a, Access::Barrier(_)))
            .count()
    }

    /// Forget all recorded accesses.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

impl RegisterPort for SimulatedRegisters {
    fn read(&self, addr: RegAddr) -> u32 {
        self.log.lock().push(Access::Read(addr));
        self.peek(addr)
    }

    fn write(&self, addr: RegAddr, value: u32) {
        self.log.lock().push(Access::Write(addr, value));
        self.poke(addr, value);
    }

    fn barrier(&self, kind: Barrier) {
        self.log.lock().push(Access::Barrier(kind));
    }
}

#[derive(Default)]
struct IrqState {
    script: VecDeque<Option<u32>>,
    fallback: Option<u32>,
    reject_requests: bool,
    handlers: HashMap<u32, IrqHandler>,
    probe_windows: u32,
    settle_calls: u32,
    freed: Vec<u32>,
}

/// Scriptable stand-in for the kernel interrupt controller.
#[derive(Default)]
pub struct SimulatedIrq {
    state: Mutex<IrqState>,
}

impl SimulatedIrq {
    /// A controller whose probes never report a line.
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller whose probes always report `line`.
    pub fn with_line(line: u32) -> Self {
        let irq = Self::default();
        irq.state.lock().fallback = Some(line);
        irq
    }

    /// Queue per-round probe results; once exhausted the default applies.
    pub fn script(self, results: impl IntoIterator<Item = Option<u32>>) -> Self {
        self.state.lock().script.extend(results);
        self
    }

    /// Refuse every handler registration.
    pub fn reject_requests(self) -> Self {
        self.state.lock().reject_requests = true;
        self
    }

    /// Raise `line` as the hardware would.
    ///
    /// Runs the attached handler on the calling thread and returns its
    /// result, or `None` if nothing is attached to the line.
    pub fn fire(&self, line: u32) -> Option<IrqReturn> {
        let handler = self.state.lock().handlers.get(&line).cloned();
        let handler = handler?;
        trace!(line, "simulated interrupt");
        Some(handler(line))
    }

    /// Whether a handler is attached to `line`.
    pub fn is_registered(&self, line: u32) -> bool {
        self.state.lock().handlers.contains_key(&line)
    }

    /// Number of probe windows opened so far.
    pub fn probe_windows(&self) -> u32 {
        self.state.lock().probe_windows
    }

    /// Number of settle delays requested so far.
    pub fn settle_calls(&self) -> u32 {
        self.state.lock().settle_calls
    }

    /// Lines released through [`IrqController::free`], in order.
    pub fn freed_lines(&self) -> Vec<u32> {
        self.state.lock().freed.clone()
    }
}

impl IrqController for SimulatedIrq {
    fn probe_on(&self) -> ProbeMask {
        let mut state = self.state.lock();
        state.probe_windows += 1;
        ProbeMask(u64::from(state.probe_windows))
    }

    fn probe_off(&self, _mask: ProbeMask) -> Option<u32> {
        let mut state = self.state.lock();
        match state.script.pop_front() {
            Some(result) => result,
            None => state.fallback,
        }
    }

    fn settle(&self, _delay: Duration) {
        self.state.lock().settle_calls += 1;
    }

    fn request(&self, line: u32, handler: IrqHandler) -> Result<(), IrqRequestError> {
        let mut state = self.state.lock();
        if state.reject_requests {
            return Err(IrqRequestError {
                line,
                reason: "line refused by simulated controller".to_string(),
            });
        }
        if state.handlers.contains_key(&line) {
            return Err(IrqRequestError {
                line,
                reason: "line already has a handler".to_string(),
            });
        }
        state.handlers.insert(line, handler);
        Ok(())
    }

    fn free(&self, line: u32) {
        let mut state = self.state.lock();
        state.handlers.remove(&line);
        state.freed.push(line);
    }
}

impl std::fmt::Debug for SimulatedIrq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedIrq")
            .field("fallback", &state.fallback)
            .field("lines", &state.handlers.keys().collect::<Vec<_>>())
            .field("probe_windows", &state.probe_windows)
            .finish()
    }
}
