//! Benchmarks for frame encoding, validation and stream decoding.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::Decoder;

use medlock_protocol::{
    LockBitmap, LockCodec, LockProtocol, MultiBoard, SensorState, SingleBoard,
};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_board_unlock", |b| {
        b.iter(|| SingleBoard.encode_unlock_request(black_box(0), black_box(7)))
    });
    group.bench_function("multi_board_unlock", |b| {
        b.iter(|| MultiBoard.encode_unlock_request(black_box(1), black_box(4)))
    });
    group.bench_function("multi_board_status_reply_extended", |b| {
        let sensors = SensorState {
            hooks: LockBitmap::new(0x0F0F),
            infrared: LockBitmap::new(0x00FF),
        };
        b.iter(|| {
            MultiBoard.encode_status_reply(black_box(0), LockBitmap::new(0x0FFF), Some(sensors))
        })
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let single = SingleBoard
        .encode_status_reply(0, LockBitmap::new(0x7FFF), None)
        .unwrap();
    let multi = MultiBoard
        .encode_status_reply(1, LockBitmap::new(0x0FEF), None)
        .unwrap();

    group.bench_function("single_board_status_reply", |b| {
        b.iter(|| SingleBoard.decode(black_box(single.as_bytes())))
    });
    group.bench_function("multi_board_status_reply", |b| {
        b.iter(|| MultiBoard.decode(black_box(multi.as_bytes())))
    });

    group.finish();
}

fn bench_stream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decode");

    for count in [10usize, 100, 1000] {
        let mut stream = BytesMut::new();
        for i in 0..count {
            let frame = MultiBoard.encode_unlock_reply(0, (i % 12) as u8).unwrap();
            stream.extend_from_slice(frame.as_bytes());
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &stream, |b, stream| {
            b.iter(|| {
                let mut codec = LockCodec::new(MultiBoard);
                let mut buffer = stream.clone();
                let mut decoded = 0;
                while let Ok(Some(item)) = codec.decode(&mut buffer) {
                    if item.is_ok() {
                        decoded += 1;
                    }
                }
                black_box(decoded)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream_decode);
criterion_main!(benches);
