mod common;

use serde_json::json;
use std::sync::Arc;

use common::{eventually, fast_feed, perf};
use seat_lock_core::backend::{LockBackend, MemoryLockBackend, MemoryPaymentBackend, PaymentCheckBackend};
use seat_lock_core::config::Config;
use seat_lock_core::models::{BaseStatus, DisplayStatus, Ownership, PaymentSource, SeatId, SessionId};
use seat_lock_core::services::{SeatClick, SeatingSession, ViewTracker};
use seat_lock_core::CoordinatorContext;

fn context(locks: &Arc<MemoryLockBackend>, payments: &Arc<MemoryPaymentBackend>) -> CoordinatorContext {
    let mut config = Config::default();
    config.feed = fast_feed();
    // в тестах клики идут подряд
    config.throttle.min_click_delay_ms = 0;
    config.throttle.cooldown_ms = 0;

    let locks: Arc<dyn LockBackend> = locks.clone();
    let payments: Arc<dyn PaymentCheckBackend> = payments.clone();
    CoordinatorContext::with_backends(config, locks, Some(payments)).unwrap()
}

fn map() -> serde_json::Value {
    json!({"contenido": [
        {"_id": "mesa_1", "nombre": "Mesa 1", "zona": "vip",
         "sillas": [{"_id": "M1-1", "x": 10, "y": 10}, {"_id": "M1-2", "x": 30, "y": 10}]},
        {"_id": "S12", "type": "silla", "x": 100, "y": 300},
        {"_id": "S13", "type": "silla", "x": 120, "y": 300, "estado": "vendido"},
        {"_id": "bg_stage", "type": "background"}
    ]})
}

async fn open(ctx: &CoordinatorContext) -> SeatingSession {
    let session = ctx.open_session(perf(77), SessionId::new());
    session.load_map(&map());
    assert!(session.store().wait_until_live().await);
    session
}

#[tokio::test]
async fn click_locks_and_second_click_unlocks() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let ctx = context(&locks, &payments);
    let session = open(&ctx).await;
    let seat = SeatId::from("S12");

    assert_eq!(session.seats().len(), 4);
    assert_eq!(session.toggle_seat(&seat).await, SeatClick::Locked);
    session.with_merged(|merged| {
        let view = merged.iter().find(|m| m.seat.id == seat).unwrap();
        assert_eq!(view.status, DisplayStatus::Selected);
        assert_eq!(view.ownership, Ownership::Mine);
    });

    assert_eq!(session.toggle_seat(&seat).await, SeatClick::Unlocked);
    assert_eq!(locks.lock_count(perf(77)), 0);
}

#[tokio::test]
async fn seat_held_by_other_session_is_rejected() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let ctx = context(&locks, &payments);
    let alice = open(&ctx).await;
    let bob = open(&ctx).await;
    let seat = SeatId::from("M1-1");

    assert_eq!(alice.toggle_seat(&seat).await, SeatClick::Locked);
    eventually(bob.store(), "bob sees lock", |s| s.is_seat_locked(&seat)).await;
    assert_eq!(bob.toggle_seat(&seat).await, SeatClick::HeldByOther);
}

#[tokio::test]
async fn sold_and_paid_seats_are_not_locked() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    payments.mark_paid(&"M1-2".into(), perf(77), PaymentSource::PaymentTransactionsByAnyone);
    let ctx = context(&locks, &payments);
    let session = open(&ctx).await;

    assert_eq!(
        session.toggle_seat(&"S13".into()).await,
        SeatClick::NotAvailable(DisplayStatus::Sold)
    );
    match session.toggle_seat(&"M1-2".into()).await {
        SeatClick::AlreadyPaid(status) => assert_eq!(status.source, PaymentSource::PaymentTransactionsByAnyone),
        other => panic!("unexpected click result {:?}", other),
    }
    assert_eq!(session.toggle_seat(&"nope".into()).await, SeatClick::UnknownSeat);
    assert_eq!(locks.lock_count(perf(77)), 0);
}

#[tokio::test]
async fn sale_from_feed_shows_up_in_merged_view() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let ctx = context(&locks, &payments);
    let session = open(&ctx).await;
    let mut tracker = ViewTracker::new();
    assert!(session.needs_render(&mut tracker));
    assert!(!session.needs_render(&mut tracker));

    locks.settle(&"S12".into(), perf(77), BaseStatus::Reserved);
    eventually(session.store(), "reserved", |s| s.view().get(&SeatId::from("S12")).is_some()).await;

    assert!(session.needs_render(&mut tracker));
    session.with_merged(|merged| {
        let s12 = merged.iter().find(|m| m.seat.id.as_str() == "S12").unwrap();
        assert_eq!(s12.status, DisplayStatus::Reserved);
        assert!(!s12.is_selectable());
    });
}

#[tokio::test]
async fn offline_feed_shows_unknown_and_blocks_clicks() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let ctx = context(&locks, &payments);
    let session = open(&ctx).await;

    locks.set_offline(true);
    eventually(session.store(), "feed lost", |s| !s.view().is_live()).await;

    session.with_merged(|merged| {
        let s12 = merged.iter().find(|m| m.seat.id.as_str() == "S12").unwrap();
        assert_eq!(s12.status, DisplayStatus::Unknown);
    });
    assert_eq!(
        session.toggle_seat(&"S12".into()).await,
        SeatClick::NotAvailable(DisplayStatus::Unknown)
    );
}

#[tokio::test]
async fn rapid_clicks_are_throttled() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let mut config = Config::default();
    config.feed = fast_feed();
    let locks_dyn: Arc<dyn LockBackend> = locks.clone();
    let payments_dyn: Arc<dyn PaymentCheckBackend> = payments.clone();
    let ctx = CoordinatorContext::with_backends(config, locks_dyn, Some(payments_dyn)).unwrap();
    let session = open(&ctx).await;
    let seat = SeatId::from("S12");

    assert_eq!(session.toggle_seat(&seat).await, SeatClick::Locked);
    assert!(matches!(session.toggle_seat(&seat).await, SeatClick::Throttled { .. }));
    // ограничитель сработал до сети: место всё ещё наше
    assert!(session.store().is_seat_locked_by_me(&seat));
    assert_eq!(session.throttle_stats().clicks_in_window, 1);
}

#[tokio::test]
async fn release_all_and_close() {
    let locks = Arc::new(MemoryLockBackend::new());
    let payments = Arc::new(MemoryPaymentBackend::new());
    let ctx = context(&locks, &payments);
    let session = open(&ctx).await;

    for id in ["M1-1", "M1-2", "S12"] {
        assert_eq!(session.toggle_seat(&id.into()).await, SeatClick::Locked);
    }
    assert_eq!(locks.lock_count(perf(77)), 3);
    assert_eq!(session.release_all().await, 3);
    assert_eq!(locks.lock_count(perf(77)), 0);

    session.close();
    assert!(!session.view().is_live());
}
