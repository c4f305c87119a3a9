mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::FakeFactory;
use tradestat_harvester::{ErrorKind, HarvestError, ResourcePool};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_acquire_waits_for_a_release() {
    let factory = FakeFactory::default();
    let counters = Arc::clone(&factory.counters);
    let pool = ResourcePool::new(factory, 2).unwrap();

    let first = pool.acquire(WAIT).await.unwrap();
    let second = pool.acquire(WAIT).await.unwrap();
    assert_eq!(pool.stats().leased, 2);

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire(WAIT).await.map(|lease| lease.id()) })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished(), "third acquire must block while two leases are out");

    let released = first.id();
    pool.release(first);
    let third = waiter.await.unwrap().unwrap();
    assert_eq!(third, released, "the released resource is reused");
    assert_eq!(counters.launched(), 2);

    drop(second);
    assert_eq!(pool.stats().leased, 0);
    assert_eq!(pool.stats().available, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leases_never_exceed_pool_size() {
    let pool = ResourcePool::new(FakeFactory::default(), 3).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let lease = pool.acquire(WAIT).await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                drop(lease);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(pool.stats().live <= 3);
    assert_eq!(pool.factory().counters.launched(), pool.stats().live);
}

#[tokio::test]
async fn acquire_times_out_with_pool_exhausted() {
    let pool = ResourcePool::new(FakeFactory::default(), 1).unwrap();
    let _held = pool.acquire(WAIT).await.unwrap();

    let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, HarvestError::PoolExhausted { .. }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn zero_pool_size_is_rejected() {
    let err = ResourcePool::new(FakeFactory::default(), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}

#[tokio::test]
async fn prewarm_launches_every_slot() {
    let pool = ResourcePool::new(FakeFactory::default(), 3).unwrap();
    assert_eq!(pool.start().await.unwrap(), 3);
    let stats = pool.stats();
    assert_eq!((stats.live, stats.available, stats.leased), (3, 3, 0));

    // Leasing reuses warm resources instead of launching more
    let _lease = pool.acquire(WAIT).await.unwrap();
    assert_eq!(pool.factory().counters.launched(), 3);
}

#[tokio::test]
async fn unhealthy_resource_is_replaced() {
    let factory = FakeFactory::default();
    let counters = Arc::clone(&factory.counters);
    let pool = ResourcePool::new(factory, 1).unwrap();

    let lease = pool.acquire(WAIT).await.unwrap();
    let first_id = lease.id();
    drop(lease);

    counters.unhealthy.lock().insert(first_id);
    let lease = pool.acquire(WAIT).await.unwrap();
    assert_ne!(lease.id(), first_id);
    assert_eq!(counters.launched(), 2);
    assert_eq!(counters.closed(), 1);
    assert_eq!(pool.stats().live, 1);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_closes_everything() {
    let factory = FakeFactory::default();
    let counters = Arc::clone(&factory.counters);
    let pool = ResourcePool::new(factory, 3).unwrap();
    pool.start().await.unwrap();

    let outstanding = pool.acquire(WAIT).await.unwrap();

    pool.shutdown().await;
    pool.shutdown().await;
    assert!(pool.is_shutdown());
    assert_eq!(counters.closed(), 2, "idle resources close immediately");

    drop(outstanding);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.closed(), 3, "an outstanding lease closes on release");

    let err = pool.acquire(WAIT).await.unwrap_err();
    assert!(matches!(err, HarvestError::PoolClosed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn releases_racing_shutdown_are_all_closed() {
    for _ in 0..20 {
        let factory = FakeFactory::default();
        let counters = Arc::clone(&factory.counters);
        let pool = ResourcePool::new(factory, 4).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    while let Ok(lease) = pool.acquire(WAIT).await {
                        tokio::task::yield_now().await;
                        drop(lease);
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.shutdown().await;
        for worker in workers {
            worker.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(pool.stats().available, 0, "nothing is queued after shutdown");
        assert_eq!(pool.stats().live, 0);
        assert_eq!(counters.closed(), counters.launched(), "every launched resource is closed");
    }
}
