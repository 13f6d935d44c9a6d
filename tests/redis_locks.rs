//! Lua-скрипты захвата и снятия на живом Redis.
//!
//! Запуск: `REDIS_URL=redis://127.0.0.1 cargo test --test redis_locks -- --ignored`

use std::time::Duration;

use futures::StreamExt;
use seat_lock_core::backend::{AcquireOutcome, LockBackend, RedisLockBackend, ReleaseOutcome};
use seat_lock_core::models::{FeedStatus, LockStatus, PerformanceId, SeatId, SessionId};
use seat_lock_core::redis_client::RedisClient;

async fn backend() -> RedisLockBackend {
    let url = std::env::var("REDIS_URL").expect("REDIS_URL is required for this test");
    let redis = RedisClient::new(&url).await.expect("connect to redis");
    // отдельный префикс на запуск, ключи прошлых прогонов не мешают
    RedisLockBackend::new(redis, format!("test-{}", uuid::Uuid::new_v4()))
}

fn perf() -> PerformanceId {
    PerformanceId::new(501).unwrap()
}

#[tokio::test]
#[ignore = "needs REDIS_URL"]
async fn racing_sessions_get_exactly_one_lock() {
    let backend = backend().await;
    let seat = SeatId::from("R1");
    let (alice, bob) = (SessionId::new(), SessionId::new());

    for _ in 0..20 {
        let (a, b) = tokio::join!(
            backend.acquire_lock(&seat, perf(), alice, LockStatus::Selected),
            backend.acquire_lock(&seat, perf(), bob, LockStatus::Selected),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let winner = match (&a, &b) {
            (AcquireOutcome::Acquired(_), AcquireOutcome::Conflict { holder }) => {
                assert_eq!(*holder, Some(alice));
                alice
            }
            (AcquireOutcome::Conflict { holder }, AcquireOutcome::Acquired(_)) => {
                assert_eq!(*holder, Some(bob));
                bob
            }
            other => panic!("expected exactly one winner, got {:?}", other),
        };

        let snapshot = backend.snapshot(perf()).await.unwrap();
        assert_eq!(snapshot.locks.len(), 1);
        assert_eq!(snapshot.locks[&seat].owner, winner);

        let loser = if winner == alice { bob } else { alice };
        assert_eq!(
            backend.release_lock(&seat, perf(), loser).await.unwrap(),
            ReleaseOutcome::NotOwner
        );
        assert!(matches!(
            backend.release_lock(&seat, perf(), winner).await.unwrap(),
            ReleaseOutcome::Released(_)
        ));
    }

    assert!(backend.snapshot(perf()).await.unwrap().locks.is_empty());
}

#[tokio::test]
#[ignore = "needs REDIS_URL"]
async fn feed_carries_increasing_seq() {
    let backend = backend().await;
    let seat = SeatId::from("R2");
    let me = SessionId::new();
    let mut feed = backend.subscribe(perf()).await.unwrap();

    let AcquireOutcome::Acquired(locked) = backend
        .acquire_lock(&seat, perf(), me, LockStatus::Selected)
        .await
        .unwrap()
    else {
        panic!("seat should be free");
    };
    let ReleaseOutcome::Released(released) = backend.release_lock(&seat, perf(), me).await.unwrap() else {
        panic!("own lock should be released");
    };

    let first = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.seq, locked.seq);
    assert_eq!(first.status, FeedStatus::Selected);
    assert_eq!(first.owner, Some(me));
    assert_eq!(second.seq, released.seq);
    assert_eq!(second.status, FeedStatus::Available);
    assert!(second.seq > first.seq);

    assert_eq!(backend.snapshot(perf()).await.unwrap().seq, released.seq);
}
