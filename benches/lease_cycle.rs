/// Benchmark: Lease Cycle
///
/// Measures connect/release round trips against an in-memory connector:
/// the warm path (idle connection available) and the hand-off path
/// (caller queued behind a full pool).
use connpool::connector::MockConnector;
use connpool::{Pool, PoolConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn warm_pool(rt: &Runtime, max: usize) -> Pool<MockConnector> {
    rt.block_on(async {
        let pool = Pool::new(
            MockConnector::new(),
            PoolConfig {
                pool_min: max,
                pool_max: max,
                ..Default::default()
            },
        )
        .unwrap();
        while pool.immediate() < max {
            tokio::task::yield_now().await;
        }
        pool
    })
}

fn bench_idle_lease_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = warm_pool(&rt, 4);

    c.bench_function("idle_lease_release", |b| {
        b.to_async(&rt).iter(|| async {
            let lease = pool.connect().await.unwrap();
            black_box(lease.id());
            lease.release().await.unwrap();
        });
    });
}

fn bench_contended_hand_off(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = warm_pool(&rt, 2);

    c.bench_function("contended_hand_off_8_callers", |b| {
        b.to_async(&rt).iter(|| async {
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let pool = pool.clone();
                    tokio::spawn(async move {
                        let lease = pool.connect().await.unwrap();
                        lease.release().await.unwrap();
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }
        });
    });
}

fn bench_stats_snapshot(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = warm_pool(&rt, 4);

    c.bench_function("stats_snapshot", |b| {
        b.iter(|| black_box(pool.stats()));
    });
}

criterion_group!(
    benches,
    bench_idle_lease_release,
    bench_contended_hand_off,
    bench_stats_snapshot
);
criterion_main!(benches);
