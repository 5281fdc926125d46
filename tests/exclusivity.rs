//! Integration tests for the exclusive open/close lifecycle.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bbbgpio::error::{BusyReason, GpioError};
use bbbgpio::ioctl::{Opcode, ParamBlock};
use bbbgpio::mode::AcquisitionMode;
use bbbgpio::registers::Register;
use bbbgpio::irq::IrqReturn;
use bbbgpio::sim::SimulatedIrq;
use common::{gated_device, sim_device};

#[test]
fn test_concurrent_opens_admit_exactly_one() {
    for _ in 0..50 {
        let (device, _, _) = sim_device(SimulatedIrq::new());
        let start = Arc::new(Barrier::new(2));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let device = device.clone();
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    device.open()
                })
            })
            .collect();

        // Join everything before inspecting so the winning handle stays open.
        let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        let opened = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(opened, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(err.is_busy(), "unexpected error {err:?}");
                assert_eq!(err.errno(), libc::EBUSY);
            }
        }
        assert!(device.is_open());
    }
}

#[test]
fn test_reopen_after_close() {
    let (device, _, _) = sim_device(SimulatedIrq::new());

    let handle = device.open().unwrap();
    assert_eq!(
        device.open().unwrap_err(),
        GpioError::Busy(BusyReason::AlreadyOpen)
    );
    handle.close();

    let handle = device.open().unwrap();
    assert!(device.is_open());
    drop(handle);
    assert!(!device.is_open());
    assert!(device.open().is_ok());
}

#[test]
fn test_open_while_lock_held_is_contended() {
    let (device, port, _) = gated_device(Register::OutputEnable, SimulatedIrq::new());
    let handle = device.open().unwrap();

    thread::scope(|s| {
        let holder = s.spawn(|| {
            let mut block = ParamBlock::new(0, 0);
            handle.dispatch(Opcode::GetDirection, &mut block)
        });

        port.entered.wait();
        assert_eq!(
            device.open().unwrap_err(),
            GpioError::Busy(BusyReason::Contended)
        );
        port.release.wait();

        assert!(holder.join().unwrap().is_ok());
    });
}

#[test]
fn test_close_waits_for_lock_holder() {
    let (device, port, irq) = gated_device(Register::DataIn, SimulatedIrq::with_line(12));
    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(2, 1 << 4);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();

    let released = AtomicBool::new(false);

    thread::scope(|s| {
        // The capture parks on its DATAIN read with the lock held.
        let capture = s.spawn(|| irq.fire(12));
        port.entered.wait();

        let closer = s.spawn(|| {
            handle.close();
            released.load(Ordering::SeqCst)
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!closer.is_finished());

        released.store(true, Ordering::SeqCst);
        port.release.wait();

        assert!(closer.join().unwrap(), "close returned before the lock was free");
        assert_eq!(capture.join().unwrap(), Some(IrqReturn::Handled));
    });

    assert!(!device.is_open());
    assert_eq!(device.stats().captured, 1);
    assert!(device.open().is_ok());
}

#[test]
fn test_session_state_survives_close() {
    let (device, _, _) = sim_device(SimulatedIrq::with_line(5));

    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(1, 1 << 3);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();
    handle.close();

    // Mode belongs to the device, not to the session holder.
    assert_eq!(device.mode(), Some(AcquisitionMode::InterruptDriven));
    let handle = device.open().unwrap();
    let mut block = ParamBlock::default();
    handle.dispatch(Opcode::GetMode, &mut block).unwrap();
    assert_eq!(block.read_value, AcquisitionMode::InterruptDriven.as_raw());
}

#[test]
fn test_unload_destroys_session() {
    let (device, _, irq) = sim_device(SimulatedIrq::with_line(44));
    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(0, 1);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();

    device.unload();

    assert_eq!(irq.freed_lines(), vec![44]);
    assert_eq!(irq.fire(44), None);
    assert_eq!(device.mode(), None);
    assert!(!device.is_open());

    assert_eq!(device.open().unwrap_err(), GpioError::NoSuchDevice);
    let mut block = ParamBlock::default();
    assert_eq!(
        handle.dispatch(Opcode::GetMode, &mut block),
        Err(GpioError::NoSuchDevice)
    );
    let mut arg = block.to_bytes();
    assert_eq!(
        handle.ioctl(Opcode::GetMode.request(), &mut arg),
        Err(GpioError::NoSuchDevice)
    );
    assert_eq!(handle.read_sample(), Err(GpioError::NoSuchDevice));
    assert_eq!(handle.write_sample(1), Err(GpioError::NoSuchDevice));
    assert_eq!(GpioError::NoSuchDevice.errno(), libc::ENODEV);

    // Closing a handle on an unloaded device is harmless.
    handle.close();
    device.unload();
}
