mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, live_store, perf, store};
use seat_lock_core::backend::MemoryLockBackend;
use seat_lock_core::models::{BaseStatus, FeedEvent, FeedState, FeedStatus, LockStatus, SeatId, SeatOverride};

#[tokio::test]
async fn only_one_of_two_racing_sessions_wins() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let a = live_store(&backend, pid).await;
    let b = live_store(&backend, pid).await;
    let seat = SeatId::from("S12");

    let (won_a, won_b) = tokio::join!(
        a.lock_seat(&seat, LockStatus::Selected, pid),
        b.lock_seat(&seat, LockStatus::Selected, pid),
    );
    assert!(won_a ^ won_b, "exactly one lock must win");

    let (winner, loser) = if won_a { (&a, &b) } else { (&b, &a) };
    assert!(winner.is_seat_locked_by_me(&seat));
    eventually(loser, "loser sees the lock", |s| s.is_seat_locked(&seat)).await;
    assert!(!loser.is_seat_locked_by_me(&seat));
    assert_eq!(backend.holder(&seat, pid), Some(winner.session_id()));
}

#[tokio::test]
async fn lock_and_unlock_propagate_to_observers() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let owner = live_store(&backend, pid).await;
    let observer = live_store(&backend, pid).await;
    let seat = SeatId::from("S12");

    assert!(owner.lock_seat(&seat, LockStatus::Selected, pid).await);
    eventually(&observer, "lock visible", |s| s.is_seat_locked(&seat)).await;

    assert!(owner.unlock_seat(&seat, pid).await);
    assert!(!owner.is_seat_locked(&seat));
    eventually(&observer, "release visible", |s| !s.is_seat_locked(&seat)).await;
}

#[tokio::test]
async fn unlock_of_foreign_lock_is_noop() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(5);
    let owner = live_store(&backend, pid).await;
    let other = live_store(&backend, pid).await;
    let seat = SeatId::from("A1");

    assert!(owner.lock_seat(&seat, LockStatus::Selected, pid).await);
    assert!(!other.unlock_seat(&seat, pid).await);
    assert_eq!(backend.holder(&seat, pid), Some(owner.session_id()));
}

#[tokio::test]
async fn own_result_is_applied_before_feed_copy() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(9);
    let me = live_store(&backend, pid).await;
    let seat = SeatId::from("B2");

    let before = me.version();
    assert!(me.lock_seat(&seat, LockStatus::Selected, pid).await);
    // сразу, без ожидания канала
    assert!(me.is_seat_locked_by_me(&seat));
    assert_eq!(me.version(), before + 1);

    // копия из канала не меняет версию; дожидаемся её через следующее событие
    backend.settle(&SeatId::from("other"), pid, BaseStatus::Sold);
    eventually(&me, "sale visible", |s| s.view().get(&SeatId::from("other")).is_some()).await;
    assert_eq!(me.version(), before + 2);
}

#[tokio::test]
async fn sale_replaces_own_lock() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(3);
    let me = live_store(&backend, pid).await;
    let seat = SeatId::from("C3");

    assert!(me.lock_seat(&seat, LockStatus::Selected, pid).await);
    backend.settle(&seat, pid, BaseStatus::Sold);
    eventually(&me, "sold", |s| {
        s.view().get(&seat) == Some(&SeatOverride::Settled(BaseStatus::Sold))
    })
    .await;
    assert!(!me.is_seat_locked_by_me(&seat));
}

#[tokio::test]
async fn resync_after_feed_drop() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let observer = live_store(&backend, pid).await;
    let owner = store(&backend);
    let seat = SeatId::from("S12");

    backend.drop_feed(pid);
    // пока наблюдатель переподключается, кто-то захватывает место
    assert!(owner.lock_seat(&seat, LockStatus::Selected, pid).await);

    eventually(&observer, "lock recovered via snapshot", |s| {
        s.feed_state() == FeedState::Live && s.is_seat_locked(&seat)
    })
    .await;
}

#[tokio::test]
async fn lost_events_trigger_resync() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let observer = live_store(&backend, pid).await;
    let owner = store(&backend);

    backend.lose_events(pid, 3);
    assert!(owner.lock_seat(&SeatId::from("X"), LockStatus::Selected, pid).await);

    eventually(&observer, "resync sees lock", |s| s.is_seat_locked(&SeatId::from("X"))).await;
}

#[tokio::test]
async fn stale_replayed_event_is_ignored() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let me = live_store(&backend, pid).await;
    let other = store(&backend);
    let seat = SeatId::from("S1");

    assert!(other.lock_seat(&seat, LockStatus::Selected, pid).await);
    assert!(other.unlock_seat(&seat, pid).await);
    eventually(&me, "release seen", |s| s.view().version >= 3 && !s.is_seat_locked(&seat)).await;

    // старое событие захвата приходит повторно
    backend.replay(
        pid,
        FeedEvent {
            seq: 1,
            seat_id: seat.clone(),
            status: FeedStatus::Selected,
            owner: Some(other.session_id()),
            at: None,
        },
    );
    backend.settle(&SeatId::from("marker"), pid, BaseStatus::Reserved);
    eventually(&me, "marker", |s| s.view().get(&SeatId::from("marker")).is_some()).await;
    assert!(!me.is_seat_locked(&seat));
}

#[tokio::test]
async fn unlock_while_lock_in_flight_cancels_it() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let me = live_store(&backend, pid).await;
    let seat = SeatId::from("S12");
    backend.set_latency(Duration::from_millis(20));

    let (locked, _) = tokio::join!(me.lock_seat(&seat, LockStatus::Selected, pid), async {
        me.unlock_seat(&seat, pid).await
    });

    assert!(!locked);
    assert!(!me.is_seat_locked_by_me(&seat));
    assert_eq!(backend.holder(&seat, pid), None);
}

#[tokio::test]
async fn offline_backend_makes_lock_fail_and_view_unknown() {
    let backend = Arc::new(MemoryLockBackend::new());
    let pid = perf(77);
    let me = live_store(&backend, pid).await;

    backend.set_offline(true);
    assert!(!me.lock_seat(&SeatId::from("S1"), LockStatus::Selected, pid).await);
    eventually(&me, "reconnecting", |s| s.feed_state() == FeedState::Reconnecting).await;

    backend.set_offline(false);
    eventually(&me, "live again", |s| s.feed_state() == FeedState::Live).await;
}

#[tokio::test]
async fn switching_performance_resets_state() {
    let backend = Arc::new(MemoryLockBackend::new());
    let me = live_store(&backend, perf(1)).await;
    let seat = SeatId::from("S1");
    assert!(me.lock_seat(&seat, LockStatus::Selected, perf(1)).await);

    me.subscribe_to_performance(perf(2));
    assert_eq!(me.performance_id(), Some(perf(2)));
    assert!(!me.is_seat_locked(&seat));
    assert!(me.wait_until_live().await);

    // повторная подписка на то же представление ничего не сбрасывает
    let version = me.version();
    me.subscribe_to_performance(perf(2));
    assert_eq!(me.version(), version);

    me.unsubscribe();
    assert_eq!(me.feed_state(), FeedState::Closed);
    me.unsubscribe();
    assert_eq!(me.performance_id(), None);
}
