//! Criterion benchmarks for the CamLink JSON-lines codec.
//!
//! Preview frames dominate the traffic of a session, so the interesting case
//! is encoding and decoding a `PREVIEW_FRAME` with a realistic base64 payload
//! (a half-resolution, quality-40 JPEG is typically 8–30 KiB).
//!
//! Run with:
//! ```bash
//! cargo bench --package camlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use camlink_core::{
    decode_message, encode_message, CameraMode, CameraState, FlashMode, Message, MessageType,
};

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_command() -> Message {
    Message::at(MessageType::CapturePhoto, 1_730_000_000_000)
}

fn make_camera_state() -> Message {
    CameraState {
        zoom: 2.0,
        flash: FlashMode::Auto,
        mode: CameraMode::Photo,
    }
    .to_message()
    .expect("finite zoom")
}

fn make_preview_frame(payload_len: usize) -> Message {
    let payload: String = "QUJDRA==".chars().cycle().take(payload_len).collect();
    Message::at(MessageType::PreviewFrame, 1_730_000_000_000).with_value(payload)
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.bench_function("command", |b| {
        let msg = make_command();
        b.iter(|| encode_message(black_box(&msg)))
    });
    group.bench_function("camera_state", |b| {
        let msg = make_camera_state();
        b.iter(|| encode_message(black_box(&msg)))
    });
    for size in [8 * 1024, 32 * 1024] {
        group.bench_with_input(BenchmarkId::new("preview_frame", size), &size, |b, &size| {
            let msg = make_preview_frame(size);
            b.iter(|| encode_message(black_box(&msg)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let command = String::from_utf8(encode_message(&make_command()).unwrap()).unwrap();
    group.bench_function("command", |b| b.iter(|| decode_message(black_box(&command))));
    for size in [8 * 1024, 32 * 1024] {
        let line = String::from_utf8(encode_message(&make_preview_frame(size)).unwrap()).unwrap();
        group.bench_with_input(BenchmarkId::new("preview_frame", size), &line, |b, line| {
            b.iter(|| decode_message(black_box(line)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
