//! Criterion benchmarks for the frame codec and the command builder.
//!
//! The control loop emits one combined command per tick and the session
//! decodes every notification the hub pushes, so these are the two hot
//! paths worth watching.
//!
//! Run with:
//! ```bash
//! cargo bench --package movehub-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use movehub_core::protocol::messages::Notification;
use movehub_core::{build_combined, decode, encode, CalibrationState, MessageType};

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn frames() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("AttachedIo", vec![0x0F, 0x00, 0x04, 0x32, 0x01, 0x56, 0x00, 0, 0, 0, 0x10, 0, 0, 0, 0x10]),
        ("BatteryProperty", vec![0x06, 0x00, 0x01, 0x06, 0x06, 0x64]),
        ("PortValue", vec![0x08, 0x00, 0x45, 0x34, 0x10, 0x00, 0x00, 0x00]),
        ("CommandFeedback", vec![0x05, 0x00, 0x82, 0x36, 0x0A]),
    ]
}

/// Benchmarks `decode` followed by typed parsing for each notification kind.
fn bench_decode_notification(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_notification");
    for (name, bytes) in frames() {
        group.bench_with_input(BenchmarkId::new("frame", name), &bytes, |b, bytes| {
            b.iter(|| {
                let msg = decode(black_box(bytes)).expect("fixture must decode");
                Notification::parse(&msg).expect("fixture must parse")
            })
        });
    }
    group.finish();
}

/// Benchmarks building and serializing one combined command, the per-tick cost.
fn bench_combined_command(c: &mut Criterion) {
    c.bench_function("build_combined_encode", |b| {
        b.iter(|| {
            build_combined(black_box(60), black_box(-33), black_box(100), CalibrationState::Done)
                .expect("in range")
                .encode()
                .expect("fits")
        })
    });
}

fn bench_encode_raw(c: &mut Criterion) {
    let payload = [0x36, 0x11, 0x51, 0x00, 0x03, 0x00, 0x3C, 0xDF, 0x64, 0x00];
    c.bench_function("encode_port_output", |b| {
        b.iter(|| encode(MessageType::PortOutputCommand, black_box(&payload)).expect("fits"))
    });
}

criterion_group!(
    benches,
    bench_decode_notification,
    bench_combined_command,
    bench_encode_raw
);
criterion_main!(benches);
