//! Signaling store benchmarks: write fan-out across subscriptions,
//! candidate push throughput, and path construction.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use proctorcast::signaling::{
    ChannelPaths, IceCandidateRecord, InMemorySignaling, NegotiationRole, SignalPath,
    SignalingTransport,
};

fn bench_write_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("write_fanout");

    for subscribers in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let store = Arc::new(InMemorySignaling::new());
                let target = SignalPath::parse("channel/exam-1/offers/p1").unwrap();

                // Each subscriber drains its queue on a task of its own, so
                // the bench measures delivery, not just enqueue.
                let subs: Vec<_> = rt.block_on(async {
                    let mut tasks = Vec::new();
                    for _ in 0..subscribers {
                        let mut sub = store.subscribe(&target).await.unwrap();
                        tasks.push(tokio::spawn(async move {
                            while sub.next().await.is_some() {}
                        }));
                    }
                    tasks
                });

                let payload = serde_json::json!({"kind": "offer", "sdp": "v=0"});
                b.iter(|| {
                    rt.block_on(store.write(&target, payload.clone())).unwrap();
                });

                for task in subs {
                    task.abort();
                }
            },
        );
    }
    group.finish();
}

fn bench_candidate_push(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("candidate_push");
    group.throughput(Throughput::Elements(1));

    group.bench_function("push", |b| {
        let store = Arc::new(InMemorySignaling::new());
        let list = SignalPath::parse("channel/exam-1/ice/p1/broadcaster").unwrap();
        let candidate = IceCandidateRecord::new(
            "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host".to_string(),
            Some("0".to_string()),
            Some(0),
        )
        .to_value()
        .unwrap();

        b.iter(|| {
            rt.block_on(store.push(&list, candidate.clone())).unwrap();
        });
    });
    group.finish();
}

fn bench_path_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths");

    group.bench_function("parse", |b| {
        b.iter(|| SignalPath::parse("channel/exam-1/ice/p1/viewer").unwrap());
    });

    group.bench_function("negotiation_layout", |b| {
        let channel = ChannelPaths::new("exam-1").unwrap();
        b.iter(|| channel.negotiation("p1", NegotiationRole::Initiator));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_write_fanout,
    bench_candidate_push,
    bench_path_building
);
criterion_main!(benches);
