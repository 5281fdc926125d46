//! Criterion benchmarks for the interrupt capture hot paths.
//!
//! Key metrics:
//! - Ring push cost below and at capacity (the overwrite path)
//! - Full capture cost: handler lock, DATAIN read, ring push
//! - Control-path dispatch latency against simulated registers
//!
//! Run with: cargo bench --bench sample_ring

use std::sync::Arc;

use bbbgpio::device::GpioDevice;
use bbbgpio::ioctl::{Opcode, ParamBlock};
use bbbgpio::ring::SampleRing;
use bbbgpio::sim::{SimulatedIrq, SimulatedRegisters};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Pushing into a ring that is filling up versus one that is already full.
fn ring_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_ring_push");
    group.throughput(Throughput::Elements(1));

    for (name, prefill) in [("empty", 0u32), ("full", 8)] {
        group.bench_with_input(BenchmarkId::new("push", name), &prefill, |b, &prefill| {
            let mut ring = SampleRing::<8>::new();
            for i in 0..prefill {
                ring.push(i);
            }
            let mut sample = 0u32;
            b.iter(|| {
                sample = sample.wrapping_add(1);
                black_box(ring.push(black_box(sample)));
                if prefill == 0 {
                    ring.pop();
                }
            });
        });
    }

    group.finish();
}

/// Draining a full ring.
fn ring_drain(c: &mut Criterion) {
    c.bench_function("sample_ring_drain_8", |b| {
        b.iter(|| {
            let mut ring = SampleRing::<8>::new();
            for i in 0..8 {
                ring.push(i);
            }
            while let Some(sample) = ring.pop() {
                black_box(sample);
            }
        });
    });
}

/// One simulated trigger through the bound handler.
fn capture_path(c: &mut Criterion) {
    let port = Arc::new(SimulatedRegisters::new());
    let irq = Arc::new(SimulatedIrq::with_line(62));
    let device = GpioDevice::new("bench", Arc::clone(&port), Arc::clone(&irq));
    let handle = device.open().unwrap();
    let mut block = ParamBlock::new(1, 1 << 16);
    handle.dispatch(Opcode::EnableInterrupt, &mut block).unwrap();

    c.bench_function("capture_trigger", |b| {
        b.iter(|| {
            black_box(irq.fire(62));
            port.clear_log();
        });
    });

    c.bench_function("capture_trigger_and_read", |b| {
        b.iter(|| {
            irq.fire(62);
            black_box(handle.read_sample().unwrap());
            port.clear_log();
        });
    });
}

/// Control-path register read.
fn dispatch_read(c: &mut Criterion) {
    let port = Arc::new(SimulatedRegisters::new());
    let device = GpioDevice::new("bench", Arc::clone(&port), SimulatedIrq::new());
    let handle = device.open().unwrap();

    c.bench_function("dispatch_get_direction", |b| {
        b.iter(|| {
            let mut block = ParamBlock::new(2, 0);
            handle
                .dispatch(black_box(Opcode::GetDirection), &mut block)
                .unwrap();
            port.clear_log();
            black_box(block.read_value);
        });
    });

    c.bench_function("ioctl_get_direction", |b| {
        let mut arg = ParamBlock::new(2, 0).to_bytes();
        let request = Opcode::GetDirection.request();
        b.iter(|| {
            handle.ioctl(black_box(request), &mut arg).unwrap();
            port.clear_log();
        });
    });
}

criterion_group!(benches, ring_push, ring_drain, capture_path, dispatch_read);
criterion_main!(benches);
