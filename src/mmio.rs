//! Memory-mapped register backend.
//!
//! Maps each bank's 4 KiB register window out of a physical-memory device
//! (normally `/dev/mem`, opened `O_SYNC` so accesses are uncached) and
//! performs volatile 32-bit loads and stores. Interrupt delivery is not
//! available from userspace, so this port is paired with
//! [`NullIrq`](crate::irq::NullIrq).

#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr::NonNull;

use anyhow::{Context, Result};
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info};

use crate::port::RegisterPort;
use crate::registers::{Bank, RegAddr, BANK_COUNT, BANK_WINDOW};

struct Window {
    /// Keeps the mapping alive for `base`.
    _map: MmapMut,
    /// SAFETY: start of `_map`, valid for `BANK_WINDOW` bytes while `_map` lives.
    base: NonNull<u32>,
}

/// Register port over mapped bank windows.
pub struct MmioPort {
    windows: Vec<Window>,
}

// SAFETY: the mapped windows are never remapped after construction and all
// accesses are single aligned volatile u32 operations; the device serializes
// control and interrupt paths behind its own lock.
unsafe impl Send for MmioPort {}

// SAFETY: see `Send`; `&MmioPort` only exposes volatile register accesses.
unsafe impl Sync for MmioPort {}

impl MmioPort {
    /// Map the four AM335x GPIO banks from `path` at their physical bases.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let offsets = Bank::all().map(|bank| u64::from(bank.base()));
        Self::open_at(path, offsets)
    }

    /// Map one window per bank from `path`, at the given file offsets.
    ///
    /// Offsets are taken in bank order and must be page aligned.
    pub fn open_at(path: impl AsRef<Path>, offsets: impl IntoIterator<Item = u64>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .with_context(|| format!("Failed to open {:?} for register mapping", path))?;

        let mut windows = Vec::with_capacity(BANK_COUNT);
        for offset in offsets.into_iter().take(BANK_COUNT) {
            // SAFETY: the mapping is shared with hardware (or a backing file);
            // every access through it is volatile and bounds-checked against
            // BANK_WINDOW by construction of `RegAddr`.
            let mut map = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(BANK_WINDOW)
                    .map_mut(&file)
                    .with_context(|| {
                        format!("Failed to map register window at 0x{offset:08X} of {path:?}")
                    })?
            };
            let base = NonNull::new(map.as_mut_ptr().cast::<u32>())
                .context("Register window mapped at null")?;
            debug!(offset = format_args!("0x{offset:08X}"), "mapped register window");
            windows.push(Window { _map: map, base });
        }

        anyhow::ensure!(
            windows.len() == BANK_COUNT,
            "Expected {BANK_COUNT} register windows, got {}",
            windows.len()
        );

        info!(path = %path.display(), "memory-mapped register port ready");
        Ok(Self { windows })
    }

    fn register_ptr(&self, addr: RegAddr) -> *mut u32 {
        let window = &self.windows[usize::from(addr.bank().index())];
        let word = addr.register().offset() as usize / std::mem::size_of::<u32>();
        // SAFETY: every register offset is below BANK_WINDOW and 4-byte aligned.
        unsafe { window.base.as_ptr().add(word) }
    }
}

impl RegisterPort for MmioPort {
    fn read(&self, addr: RegAddr) -> u32 {
        // SAFETY: `register_ptr` stays inside a live mapping and is aligned.
        unsafe { self.register_ptr(addr).read_volatile() }
    }

    fn write(&self, addr: RegAddr, value: u32) {
        // SAFETY: `register_ptr` stays inside a live mapping and is aligned.
        unsafe { self.register_ptr(addr).write_volatile(value) }
    }
}

impl std::fmt::Debug for MmioPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioPort")
            .field("windows", &self.windows.len())
            .finish()
    }
}
