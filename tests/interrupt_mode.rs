//! Integration tests for interrupt-driven acquisition.

mod common;

use std::sync::Arc;
use std::thread;

use bbbgpio::error::GpioError;
use bbbgpio::ioctl::{Opcode, ParamBlock};
use bbbgpio::irq::IrqReturn;
use bbbgpio::mode::AcquisitionMode;
use bbbgpio::port::Barrier;
use bbbgpio::registers::{address, Register};
use bbbgpio::ring::RING_CAPACITY;
use bbbgpio::sim::{Access, SimulatedIrq};
use common::{bank, gated_device, sim_device, SimDevice, SimHandle};

const LINE: u32 = 62;
const MASK: u32 = 1 << 16;

fn enable(device: &SimDevice) -> SimHandle {
    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(1, MASK);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();
    handle
}

#[test]
fn test_enable_switches_to_interrupt_mode() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);

    assert_eq!(device.mode(), Some(AcquisitionMode::InterruptDriven));
    assert!(irq.is_registered(LINE));
    assert_eq!(port.peek(address(bank(1), Register::IrqStatusSet0)), MASK);
    assert_eq!(port.peek(address(bank(1), Register::IrqStatusSet1)), MASK);

    let mut arg = ParamBlock::default().to_bytes();
    handle.ioctl(Opcode::GetMode.request(), &mut arg).unwrap();
    assert_eq!(&arg[8..12], &[1, 0, 0, 0]);
}

#[test]
fn test_ring_keeps_most_recent_captures() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    let datain = address(bank(1), Register::DataIn);

    for sample in 1..=9u32 {
        port.poke(datain, sample);
        assert_eq!(irq.fire(LINE), Some(IrqReturn::Handled));
    }

    let drained: Vec<u32> = (0..RING_CAPACITY)
        .map(|_| handle.read_sample().unwrap())
        .collect();
    assert_eq!(drained, (2..=9).collect::<Vec<_>>());

    let err = handle.read_sample().unwrap_err();
    assert_eq!(err, GpioError::NoData);
    assert_eq!(err.errno(), libc::ENODATA);

    let stats = device.stats();
    assert_eq!(stats.captured, 9);
    assert_eq!(stats.overwritten, 1);
    assert_eq!(stats.dropped_contended, 0);
}

#[test]
fn test_raw_read_pops_little_endian_sample() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    port.poke(address(bank(1), Register::DataIn), 0x0102_0304);
    irq.fire(LINE);

    let mut short = [0u8; 2];
    assert!(matches!(
        handle.read(&mut short),
        Err(GpioError::TransferFault { .. })
    ));

    // The short read must not have consumed the sample.
    let mut buf = [0u8; 4];
    assert_eq!(handle.read(&mut buf), Ok(4));
    assert_eq!(buf, [4, 3, 2, 1]);
    assert_eq!(handle.read(&mut buf), Err(GpioError::NoData));
}

#[test]
fn test_capture_reads_datain_with_load_barrier() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let _handle = enable(&device);
    port.clear_log();

    irq.fire(LINE);
    assert_eq!(
        port.accesses(),
        vec![
            Access::Read(address(bank(1), Register::DataIn)),
            Access::Barrier(Barrier::Load)
        ]
    );
}

#[test]
fn test_probe_failure_stays_polling() {
    let (device, port, irq) = sim_device(SimulatedIrq::new());
    let handle = device.open().unwrap();

    let mut block = ParamBlock::new(1, MASK);
    assert_eq!(handle.dispatch(Opcode::EnableInterrupt, &mut block), Ok(()));

    assert_eq!(device.mode(), Some(AcquisitionMode::Polling));
    assert_eq!(irq.probe_windows(), 5);
    assert!(device.binding().is_none());

    // Raw reads still sample DATAIN directly.
    port.poke(address(bank(1), Register::DataIn), 0x77);
    assert_eq!(handle.read_sample(), Ok(0x77));
}

#[test]
fn test_probe_succeeds_on_later_round() {
    let (device, _, irq) =
        sim_device(SimulatedIrq::new().script([None, None, None, None, Some(LINE)]));
    let _handle = enable(&device);

    assert_eq!(irq.probe_windows(), 5);
    assert_eq!(device.mode(), Some(AcquisitionMode::InterruptDriven));
}

#[test]
fn test_rejected_request_stays_polling() {
    let (device, _, irq) = sim_device(SimulatedIrq::with_line(LINE).reject_requests());
    let _handle = enable(&device);

    assert_eq!(device.mode(), Some(AcquisitionMode::Polling));
    assert!(!irq.is_registered(LINE));
    assert_eq!(irq.fire(LINE), None);
}

#[test]
fn test_force_polling_clears_status_and_frees_line() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    port.clear_log();

    // Caller's bank and mask are cleared first, then the bound ones.
    let mut block = ParamBlock::new(2, 0x0F);
    handle.dispatch(Opcode::ForcePolling, &mut block).unwrap();

    assert_eq!(device.mode(), Some(AcquisitionMode::Polling));
    assert_eq!(irq.freed_lines(), vec![LINE]);
    assert_eq!(irq.fire(LINE), None);
    assert_eq!(
        port.accesses(),
        vec![
            Access::Write(address(bank(2), Register::IrqStatusClr0), 0x0F),
            Access::Barrier(Barrier::Store),
            Access::Write(address(bank(2), Register::IrqStatusClr1), 0x0F),
            Access::Barrier(Barrier::Store),
            Access::Write(address(bank(1), Register::IrqStatusClr0), MASK),
            Access::Barrier(Barrier::Store),
            Access::Write(address(bank(1), Register::IrqStatusClr1), MASK),
            Access::Barrier(Barrier::Store),
        ]
    );

    // Forcing again while polling only clears the caller's bank.
    port.clear_log();
    let mut block = ParamBlock::new(3, 0xFF);
    handle.dispatch(Opcode::ForcePolling, &mut block).unwrap();
    assert_eq!(device.mode(), Some(AcquisitionMode::Polling));
    assert_eq!(
        port.accesses(),
        vec![
            Access::Write(address(bank(3), Register::IrqStatusClr0), 0xFF),
            Access::Barrier(Barrier::Store),
            Access::Write(address(bank(3), Register::IrqStatusClr1), 0xFF),
            Access::Barrier(Barrier::Store),
        ]
    );
    assert_eq!(irq.freed_lines(), vec![LINE]);
}

#[test]
fn test_force_polling_on_bound_bank_clears_once() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    port.clear_log();

    let mut block = ParamBlock::new(1, MASK);
    handle.dispatch(Opcode::ForcePolling, &mut block).unwrap();

    assert_eq!(
        port.accesses(),
        vec![
            Access::Write(address(bank(1), Register::IrqStatusClr0), MASK),
            Access::Barrier(Barrier::Store),
            Access::Write(address(bank(1), Register::IrqStatusClr1), MASK),
            Access::Barrier(Barrier::Store),
        ]
    );
    assert_eq!(irq.freed_lines(), vec![LINE]);
}

#[test]
fn test_reenable_starts_with_empty_ring() {
    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    port.poke(address(bank(1), Register::DataIn), 0xDEAD);
    irq.fire(LINE);
    irq.fire(LINE);

    let mut block = ParamBlock::new(1, MASK);
    handle.dispatch(Opcode::ForcePolling, &mut block).unwrap();
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();

    assert_eq!(device.mode(), Some(AcquisitionMode::InterruptDriven));
    assert_eq!(handle.read_sample(), Err(GpioError::NoData));
}

#[test]
fn test_capture_dropped_while_lock_held() {
    let (device, port, irq) = gated_device(Register::OutputEnable, SimulatedIrq::with_line(LINE));
    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(1, MASK);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();

    thread::scope(|s| {
        let holder = s.spawn(|| {
            let mut block = ParamBlock::new(1, 0);
            handle.dispatch(Opcode::GetDirection, &mut block)
        });

        port.entered.wait();
        assert_eq!(irq.fire(LINE), Some(IrqReturn::Handled));
        port.release.wait();

        assert!(holder.join().unwrap().is_ok());
    });

    let stats = device.stats();
    assert_eq!(stats.dropped_contended, 1);
    assert_eq!(stats.captured, 0);
    assert_eq!(handle.read_sample(), Err(GpioError::NoData));
}

#[test]
fn test_producer_consumer_preserves_fifo_order() {
    const TRIGGERS: u32 = 500;

    let (device, port, irq) = sim_device(SimulatedIrq::with_line(LINE));
    let handle = enable(&device);
    let datain = address(bank(1), Register::DataIn);

    let producer = {
        let port = Arc::clone(&port);
        let irq = Arc::clone(&irq);
        thread::spawn(move || {
            for sample in 1..=TRIGGERS {
                port.poke(datain, sample);
                irq.fire(LINE);
                if sample % 16 == 0 {
                    thread::yield_now();
                }
            }
        })
    };

    let mut received = Vec::new();
    loop {
        match handle.read_sample() {
            Ok(sample) => received.push(sample),
            Err(GpioError::NoData | GpioError::Busy(_)) if !producer.is_finished() => {
                thread::yield_now()
            }
            Err(GpioError::Busy(_)) => thread::yield_now(),
            Err(GpioError::NoData) => break,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    producer.join().unwrap();
    // Drain anything captured between the last read and the join.
    while let Ok(sample) = handle.read_sample() {
        received.push(sample);
    }

    assert!(
        received.windows(2).all(|w| w[0] < w[1]),
        "samples out of order: {received:?}"
    );

    let stats = device.stats();
    assert_eq!(stats.captured + stats.dropped_contended, u64::from(TRIGGERS));
    assert_eq!(received.len() as u64, stats.captured - stats.overwritten);
    assert_eq!(stats.spurious, 0);
}
