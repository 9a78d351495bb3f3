//! Performance benchmarks for resolution replay.
//!
//! Run with: `cargo bench --bench replay`
//!
//! ## Scenarios
//!
//! | Benchmark | Shape |
//! |-----------|-------|
//! | `replay_fold` | N sessions, one resolution per 10 sessions, pairwise merges |
//! | `apply_transform` | single contraction over a large network |
//! | `cached_replay` | repeated replay through the LRU cache |

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use network_resolver::{
    apply_transform, Attributes, CacheConfig, Edge, Network, NoOpMetrics, Node, ProtocolId,
    ReplayCache, ReplayKey, ReplayOptions, Resolution, ResolutionReplayer, Session, Transform,
};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A session with a five-node star around its respondent.
fn make_session(index: usize) -> Session {
    let center = format!("s{}-n0", index);
    let nodes = (0..5).map(|j| Node::bare(format!("s{}-n{}", index, j))).collect();
    let edges = (1..5)
        .map(|j| Edge::new(center.clone(), format!("s{}-n{}", index, j)))
        .collect();
    Session::new(
        format!("s{}", index),
        epoch() + Duration::hours(index as i64),
        Network::new(nodes, edges),
    )
}

/// Sessions plus one resolution per ten sessions merging each session's
/// hub with the previous session's hub.
fn make_fixture(session_count: usize) -> (Vec<Session>, Vec<Resolution>) {
    let sessions: Vec<_> = (0..session_count).map(make_session).collect();

    let resolutions = (0..session_count / 10)
        .map(|r| {
            let transforms = (r * 10 + 1..(r + 1) * 10)
                .map(|i| {
                    Transform::new(
                        format!("s{}-n0", i),
                        [format!("s{}-n0", i - 1), format!("s{}-n1", i)],
                        Attributes::new(),
                    )
                })
                .collect();
            Resolution::new(
                format!("r{}", r),
                epoch() + Duration::hours(((r + 1) * 10) as i64) - Duration::minutes(30),
                transforms,
            )
        })
        .collect();

    (sessions, resolutions)
}

fn bench_replay_fold(c: &mut Criterion) {
    let replayer = ResolutionReplayer::new(NoOpMetrics);
    let options = ReplayOptions::new().include_unresolved(true);

    let mut group = c.benchmark_group("replay_fold");

    for session_count in [10, 100, 1000] {
        let (sessions, resolutions) = make_fixture(session_count);

        group.throughput(Throughput::Elements(session_count as u64));
        group.bench_with_input(
            BenchmarkId::new("sessions", session_count),
            &(sessions, resolutions),
            |b, (sessions, resolutions)| {
                b.iter(|| {
                    replayer
                        .replay(black_box(sessions), black_box(resolutions), &options)
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_apply_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_transform");

    for node_count in [100, 1000, 10_000] {
        let network = Network::new(
            (0..node_count).map(|i| Node::bare(format!("n{}", i))).collect(),
            (1..node_count)
                .map(|i| Edge::new(format!("n{}", i - 1), format!("n{}", i)))
                .collect(),
        );
        let transform = Transform::new("merged", ["n0", "n1", "n2"], Attributes::new());

        group.throughput(Throughput::Elements(node_count as u64));
        group.bench_with_input(
            BenchmarkId::new("nodes", node_count),
            &network,
            |b, network| b.iter(|| apply_transform(black_box(network), &transform)),
        );
    }

    group.finish();
}

fn bench_cached_replay(c: &mut Criterion) {
    let replayer = ResolutionReplayer::new(NoOpMetrics);
    let cache = ReplayCache::new(&CacheConfig {
        max_entries: 16,
        enabled: true,
    });
    let protocol = ProtocolId::new("bench");
    let options = ReplayOptions::default();
    let (sessions, resolutions) = make_fixture(1000);

    c.bench_function("cached_replay", |b| {
        b.iter(|| {
            let key = ReplayKey::compute(&protocol, &options, &sessions, &resolutions).unwrap();
            cache
                .get_or_try_insert(key, || replayer.replay(&sessions, &resolutions, &options))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_replay_fold,
    bench_apply_transform,
    bench_cached_replay,
);
criterion_main!(benches);
