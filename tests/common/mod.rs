#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use seat_lock_core::backend::{LockBackend, MemoryLockBackend};
use seat_lock_core::config::FeedConfig;
use seat_lock_core::models::{PerformanceId, SessionId};
use seat_lock_core::services::SeatLockStore;

pub fn fast_feed() -> FeedConfig {
    FeedConfig {
        connect_timeout_ms: 500,
        backoff_initial_ms: 5,
        backoff_max_ms: 20,
    }
}

pub fn perf(id: i64) -> PerformanceId {
    PerformanceId::new(id).unwrap()
}

pub fn store(backend: &Arc<MemoryLockBackend>) -> SeatLockStore {
    let backend: Arc<dyn LockBackend> = backend.clone();
    SeatLockStore::new(backend, SessionId::new(), fast_feed())
}

pub async fn live_store(backend: &Arc<MemoryLockBackend>, performance_id: PerformanceId) -> SeatLockStore {
    let store = store(backend);
    store.subscribe_to_performance(performance_id);
    assert!(
        tokio::time::timeout(Duration::from_secs(2), store.wait_until_live())
            .await
            .expect("feed did not go live")
    );
    store
}

/// Ждёт, пока условие не станет истинным, просыпаясь на каждой новой версии.
pub async fn eventually(store: &SeatLockStore, what: &str, check: impl Fn(&SeatLockStore) -> bool) {
    let mut changes = store.changes();
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !check(store) {
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(waited.is_ok() && check(store), "timed out waiting for: {}", what);
}
