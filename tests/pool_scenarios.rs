/// Connection Pool Sizing Scenarios
///
/// Warm-up, growth increments, capacity ceilings and FIFO service order

use connpool::connector::MockConnector;
use connpool::{Pool, PoolConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Let spawned create/destroy tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn warm_up_reaches_pool_min() {
    let mock = MockConnector::new();
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_min: 2,
            pool_max: 4,
            pool_increment: 1,
            ..Default::default()
        },
    )
    .unwrap();

    // Nothing is created yet, but the whole capacity is obtainable.
    assert_eq!(pool.available(), 4);
    assert_eq!(pool.immediate(), 0);
    assert_eq!(pool.size(), 2);

    settle().await;

    assert_eq!(pool.immediate(), 2);
    assert_eq!(pool.available(), 4);
    assert_eq!(pool.size(), 2);
    assert_eq!(mock.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn single_slot_pool_queues_second_caller() {
    let mock = MockConnector::new();
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_max: 1,
            ..Default::default()
        },
    )
    .unwrap();

    let first = pool.connect().await.unwrap();
    assert_eq!(pool.available(), 0);

    let second = tokio::spawn({
        let pool = pool.clone();
        async move { pool.connect().await }
    });
    settle().await;

    assert_eq!(pool.waiting(), 1);
    assert!(!second.is_finished());
    assert_eq!(pool.size(), 1);

    first.release().await.unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(!second.is_revoked());
    assert_eq!(pool.waiting(), 0);
    assert_eq!(pool.leased(), 1);
    assert_eq!(mock.created(), 1);
}

#[tokio::test(start_paused = true)]
async fn growth_uses_pool_increment() {
    let mock = MockConnector::new();
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_increment: 2,
            pool_max: 4,
            ..Default::default()
        },
    )
    .unwrap();

    let _lease = pool.connect().await.unwrap();
    settle().await;

    assert_eq!(mock.created(), 2);
    assert_eq!(pool.immediate(), 1);
    assert_eq!(pool.size(), 2);
}

#[tokio::test(start_paused = true)]
async fn growth_is_capped_by_pool_max() {
    let mock = MockConnector::new();
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_increment: 3,
            pool_max: 4,
            ..Default::default()
        },
    )
    .unwrap();

    let _a = pool.connect().await.unwrap();
    let _b = pool.connect().await.unwrap();
    let _c = pool.connect().await.unwrap();
    // Three created by the first growth; the fourth caller grows by one only.
    let _d = pool.connect().await.unwrap();
    settle().await;

    assert_eq!(mock.created(), 4);
    assert_eq!(pool.size(), 4);
    assert_eq!(pool.available(), 0);
}

#[tokio::test(start_paused = true)]
async fn burst_does_not_over_provision() {
    let mock = MockConnector::new().with_create_delay(Duration::from_millis(50));
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_max: 10,
            ..Default::default()
        },
    )
    .unwrap();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.connect().await })
        })
        .collect();
    settle().await;

    // One create per unmet caller, not more.
    assert_eq!(pool.waiting(), 3);
    assert_eq!(pool.size(), 3);

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(mock.created(), 3);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_order() {
    let pool = Pool::new(
        MockConnector::new(),
        PoolConfig {
            pool_max: 1,
            ..Default::default()
        },
    )
    .unwrap();
    let holder = pool.connect().await.unwrap();

    let served = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for n in 1..=3 {
        let pool = pool.clone();
        let served = Arc::clone(&served);
        tasks.push(tokio::spawn(async move {
            let lease = pool.connect().await.unwrap();
            served.lock().push(n);
            tokio::time::sleep(Duration::from_millis(10)).await;
            lease.release().await.unwrap();
        }));
        // Make the arrival order unambiguous.
        settle().await;
    }
    assert_eq!(pool.waiting(), 3);

    holder.release().await.unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*served.lock(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn released_connection_is_reused() {
    let mock = MockConnector::new();
    let pool = Pool::new(mock.clone(), PoolConfig::default()).unwrap();

    let lease = pool.connect().await.unwrap();
    let first_id = lease.lock().await.unwrap().id;
    lease.release().await.unwrap();
    assert_eq!(pool.immediate(), 1);

    let lease = pool.connect().await.unwrap();
    assert_eq!(lease.lock().await.unwrap().id, first_id);
    assert_eq!(mock.created(), 1);
    assert_eq!(pool.stats().total_leases, 2);
}

#[tokio::test(start_paused = true)]
async fn floor_is_restored_after_failed_warm_up() {
    let mock = MockConnector::new();
    mock.fail_next_creates(2);
    let pool = Pool::new(
        mock.clone(),
        PoolConfig {
            pool_min: 2,
            pool_max: 4,
            ..Default::default()
        },
    )
    .unwrap();
    settle().await;

    assert_eq!(pool.size(), 0);
    assert_eq!(pool.stats().create_failures, 2);

    // The next connect brings the pool back to its floor and is served by it.
    let _lease = pool.connect().await.unwrap();
    settle().await;

    assert_eq!(mock.created(), 2);
    assert_eq!(pool.size(), 2);
    assert_eq!(pool.immediate(), 1);
}
