/// Connection Pool Concurrency Stress Tests
///
/// Tests pool bookkeeping under high concurrent load on a multi-threaded runtime

use connpool::connector::MockConnector;
use connpool::{Pool, PoolConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_handles_hundreds_of_concurrent_leases() {
    let mock = MockConnector::new().with_create_delay(Duration::from_millis(5));
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_max: 8,
            pool_increment: 2,
            connect_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    )
    .unwrap();

    // Sample the pool while the load runs.
    let running = Arc::new(AtomicBool::new(true));
    let peak = Arc::new(AtomicUsize::new(0));
    let monitor = tokio::spawn({
        let pool = pool.clone();
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        async move {
            while running.load(Ordering::SeqCst) {
                let stats = pool.stats();
                assert!(stats.size <= stats.pool_max, "pool over capacity: {:?}", stats);
                assert!(stats.leased <= stats.pool_max);
                peak.fetch_max(stats.leased, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_micros(200)).await;
            }
        }
    });

    let start = Instant::now();
    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let lease = pool.connect().await?;
                {
                    let _conn = lease.lock().await?;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                lease.release().await
            })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    let elapsed = start.elapsed();

    running.store(false, Ordering::SeqCst);
    monitor.await.unwrap();

    println!(
        "200 leases in {:?}, peak leased {}, created {}",
        elapsed,
        peak.load(Ordering::SeqCst),
        mock.created()
    );

    assert_eq!(successes, 200);
    assert!(mock.created() <= 8);
    assert_eq!(pool.leased(), 0);
    assert_eq!(pool.waiting(), 0);
    assert_eq!(pool.stats().total_leases, 200);

    pool.terminate(false).await.unwrap();
    assert_eq!(mock.live(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_under_load_leaves_nothing_open() {
    let mock = MockConnector::new().with_create_delay(Duration::from_millis(2));
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_max: 6,
            terminate_grace: Duration::from_millis(50),
            ..Default::default()
        },
    )
    .unwrap();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let lease = pool.connect().await?;
                tokio::time::sleep(Duration::from_millis(1 + (i % 5) as u64)).await;
                lease.release().await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.terminate(false).await.unwrap();

    // Every caller either finished normally or saw the shutdown.
    for task in tasks {
        let _ = task.await.unwrap();
    }

    assert_eq!(pool.leased(), 0);
    assert_eq!(mock.live(), 0);
    assert_eq!(mock.created(), mock.destroyed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_connect_futures_do_not_leak_connections() {
    let mock = MockConnector::new().with_create_delay(Duration::from_millis(3));
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_max: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                // Half the callers give up almost immediately.
                let patience = if i % 2 == 0 { 1 } else { 5_000 };
                match tokio::time::timeout(Duration::from_millis(patience), pool.connect()).await {
                    Ok(Ok(lease)) => {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        drop(lease);
                        true
                    }
                    _ => false,
                }
            })
        })
        .collect();

    let mut served = 0;
    for task in tasks {
        if task.await.unwrap() {
            served += 1;
        }
    }

    assert!(served >= 25);
    assert_eq!(pool.leased(), 0);
    assert!(pool.immediate() <= 2);

    pool.terminate(true).await.unwrap();
    assert_eq!(mock.live(), 0);
}
