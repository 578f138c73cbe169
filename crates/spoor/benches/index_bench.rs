//! Benchmarks for Spoor analysis components.
//!
//! Run with: cargo bench --package spoor
//!
//! ## Benchmark Categories
//!
//! - **Index Build**: one-pass checkpoint sampling at varied sizes
//! - **Index Lookup**: timed and ratio seeks
//! - **Index Persistence**: serialize and reload
//! - **Flow Reconstruction**: streaming packet ingestion
//! - **Event Matching**: cross-stream pairing throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spoor::{
    CheckpointIndex, Endpoint, EventMatcher, FlowReconstructor, MatchDirection, MatchKey,
    MemorySource, OffsetLocation, PacketMeta, ProtocolKind, Record, RecordSource,
};
use tempfile::TempDir;

/// Generate a source with mildly irregular timestamps, 1ms apart on average.
fn generate_source(count: usize) -> MemorySource {
    let entries = (0..count)
        .map(|i| {
            let ts = 1_000_000_000 + (i as i64) * 1_000_000 + ((i % 13) as i64) * 500;
            (ts, Vec::new())
        })
        .collect();
    MemorySource::new(entries)
}

// ============================================================================
// Index Build Benchmarks
// ============================================================================

fn bench_index_build_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for size in [1_000, 10_000, 100_000].iter() {
        let source = generate_source(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| CheckpointIndex::build(black_box(source), 1000).unwrap())
        });
    }

    group.finish();
}

fn bench_index_build_intervals(c: &mut Criterion) {
    let source = generate_source(100_000);
    let mut group = c.benchmark_group("index_build_interval");

    for interval in [100u64, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(interval),
            interval,
            |b, &interval| b.iter(|| CheckpointIndex::build(black_box(&source), interval).unwrap()),
        );
    }

    group.finish();
}

// ============================================================================
// Index Lookup Benchmarks
// ============================================================================

fn bench_index_lookups(c: &mut Criterion) {
    let source = generate_source(1_000_000);
    let index = CheckpointIndex::build(&source, 1000).unwrap();

    let mut group = c.benchmark_group("index_lookup");

    group.bench_function("find_nearest", |b| {
        let mut target = 1_000_000_000i64;
        b.iter(|| {
            target = target.wrapping_add(997 * 1_000_000) % (1_000_000 * 1_000_000);
            black_box(index.find_nearest(black_box(target)))
        })
    });

    group.bench_function("seek_to_fraction", |b| {
        let mut step = 0u64;
        b.iter(|| {
            step = (step + 1) % 1000;
            black_box(index.seek_to_fraction(black_box(step as f64 / 1000.0)))
        })
    });

    group.finish();
}

// ============================================================================
// Index Persistence Benchmarks
// ============================================================================

fn bench_index_persist_load(c: &mut Criterion) {
    let source = generate_source(1_000_000);
    let index = CheckpointIndex::build(&source, 1000).unwrap();
    let fingerprint = source.fingerprint();

    let mut group = c.benchmark_group("index_persistence");
    group.throughput(Throughput::Elements(index.len() as u64));

    group.bench_function("persist_1k_checkpoints", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            index.persist(&mut buf).unwrap();
            black_box(buf)
        })
    });

    let mut encoded = Vec::new();
    index.persist(&mut encoded).unwrap();
    group.bench_function("load_1k_checkpoints", |b| {
        b.iter(|| {
            let loaded =
                CheckpointIndex::<OffsetLocation>::load(fingerprint, &mut encoded.as_slice())
                    .unwrap();
            black_box(loaded)
        })
    });

    group.finish();
}

fn bench_index_load_from_disk(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.spix");

    let source = generate_source(1_000_000);
    let index = CheckpointIndex::build(&source, 1000).unwrap();
    index.persist_to_path(&path).unwrap();

    c.bench_function("index_load_from_disk_1k", |b| {
        b.iter(|| {
            let loaded =
                CheckpointIndex::<OffsetLocation>::load_from_path(source.fingerprint(), &path)
                    .unwrap();
            black_box(loaded)
        })
    });
}

// ============================================================================
// Flow Reconstruction Benchmarks
// ============================================================================

fn bench_flow_reconstruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_add_packet");

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    // 50 distinct endpoint pairs with alternating directions.
                    let packets: Vec<_> = (0..size)
                        .map(|i| {
                            let pair = i % 50;
                            let (src, dst) = if i % 2 == 0 {
                                (format!("client{pair}:40000"), format!("server{pair}:443"))
                            } else {
                                (format!("server{pair}:443"), format!("client{pair}:40000"))
                            };
                            PacketMeta {
                                protocol: ProtocolKind::Tcp,
                                src: Endpoint::new(src.into_bytes()),
                                dst: Endpoint::new(dst.into_bytes()),
                                timestamp: i as i64 * 1_000,
                                byte_len: 512,
                            }
                        })
                        .collect();
                    (FlowReconstructor::new(ProtocolKind::Tcp), packets)
                },
                |(mut reconstructor, packets)| {
                    for packet in &packets {
                        reconstructor.add_packet(packet).unwrap();
                    }
                    black_box(reconstructor.flow_count())
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Event Matching Benchmarks
// ============================================================================

fn classify(record: &Record) -> Option<(MatchDirection, MatchKey)> {
    let direction = match *record.payload.first()? {
        0 => MatchDirection::Outbound,
        1 => MatchDirection::Inbound,
        _ => return None,
    };
    let key_bytes: [u8; 8] = record.payload.get(1..9)?.try_into().ok()?;
    Some((direction, u64::from_le_bytes(key_bytes)))
}

fn bench_event_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher_process");

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    // Alternating outbound/inbound records sharing a key, so
                    // every second record produces a dependency.
                    let records: Vec<_> = (0..size)
                        .map(|i| {
                            let key = (i as u64) / 2;
                            let mut payload = vec![(i % 2) as u8];
                            payload.extend_from_slice(&key.to_le_bytes());
                            (Record::new(i as i64 * 1_000, i as u64, payload), i % 2)
                        })
                        .collect();
                    (EventMatcher::new(classify, 2), records)
                },
                |(mut matcher, records)| {
                    for (record, stream) in &records {
                        black_box(matcher.process(record, *stream));
                    }
                    black_box(matcher.stats().dependencies)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    // Index build
    bench_index_build_sizes,
    bench_index_build_intervals,
    // Index lookup
    bench_index_lookups,
    // Index persistence
    bench_index_persist_load,
    bench_index_load_from_disk,
    // Flow reconstruction
    bench_flow_reconstruction,
    // Event matching
    bench_event_matching,
);
criterion_main!(benches);
