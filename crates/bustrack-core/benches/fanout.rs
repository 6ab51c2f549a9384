//! Broadcast benchmarks for bustrack-core.

use bustrack_core::{shared, Broadcaster, Origin, ProtocolHandler, StateStore};
use bustrack_protocol::{codec, ClientFrame, ServerFrame};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn populated_handler(buses: usize) -> ProtocolHandler {
    let handler = ProtocolHandler::new(shared(StateStore::new()), Arc::new(Broadcaster::new()));
    for i in 0..buses {
        let bus_id = format!("bus{i}");
        handler.dispatch(ClientFrame::request(&bus_id), Origin::Http);
        handler.dispatch(ClientFrame::location(&bus_id, 12.97, 77.59), Origin::Http);
    }
    handler
}

fn bench_encode_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_snapshot");
    for buses in [1, 100, 1000] {
        let frame = ServerFrame::Update(populated_handler(buses).snapshot());
        group.bench_with_input(BenchmarkId::from_parameter(buses), &frame, |b, frame| {
            b.iter(|| codec::encode_server(black_box(frame)).unwrap())
        });
    }
    group.finish();
}

fn bench_location_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("location_fanout");
    for connections in [1, 10, 100] {
        let handler = populated_handler(10);
        let mut receivers: Vec<_> = (0..connections).map(|_| handler.connect().1).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(connections),
            &connections,
            |b, _| {
                b.iter(|| {
                    handler.dispatch(
                        black_box(ClientFrame::location("bus1", 12.97, 77.59)),
                        Origin::Socket,
                    );
                    for rx in &mut receivers {
                        while rx.try_recv().is_ok() {}
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode_snapshot, bench_location_fanout);
criterion_main!(benches);
