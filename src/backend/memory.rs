//! In-process хранилище для тестов и локальной отладки.
//!
//! Повторяет семантику Redis-реализации (атомарный захват, `seq` на каждую
//! запись, рассылка событий подписчикам) и умеет симулировать сбои: обрыв
//! канала, потерю событий, недоступность хранилища.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use super::{AcquireOutcome, FeedStream, LockBackend, PaymentCheckBackend, ReleaseOutcome};
use crate::error::{BackendError, PaymentCheckError};
use crate::models::{
    BaseStatus, FeedEvent, FeedStatus, Lock, LockSnapshot, LockStatus, PaymentRecord,
    PaymentSource, PerformanceId, SeatId, SessionId,
};

const FEED_CAPACITY: usize = 1024;

struct PerformanceState {
    seq: u64,
    locks: HashMap<SeatId, Lock>,
    feed: broadcast::Sender<FeedEvent>,
}

impl PerformanceState {
    fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            seq: 0,
            locks: HashMap::new(),
            feed,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn publish(&self, event: &FeedEvent) {
        // нет подписчиков — не ошибка
        let _ = self.feed.send(event.clone());
    }
}

#[derive(Default)]
pub struct MemoryLockBackend {
    performances: Mutex<HashMap<PerformanceId, PerformanceState>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HashMap<PerformanceId, PerformanceState>> {
        self.performances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Задержка перед каждым захватом и снятием, как у сетевого вызова.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn network_delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Offline);
        }
        Ok(())
    }

    /// Хранилище перестаёт отвечать; при `true` все открытые каналы обрываются.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if offline {
            let mut perfs = self.state();
            for state in perfs.values_mut() {
                state.feed = broadcast::channel(FEED_CAPACITY).0;
            }
        }
    }

    /// Обрывает все подписки на представление. Блокировки остаются.
    pub fn drop_feed(&self, performance_id: PerformanceId) {
        let mut perfs = self.state();
        if let Some(state) = perfs.get_mut(&performance_id) {
            state.feed = broadcast::channel(FEED_CAPACITY).0;
            debug!("Dropped feed subscribers of performance {}", performance_id);
        }
    }

    /// Продвигает `seq` без рассылки — подписчики увидят разрыв.
    pub fn lose_events(&self, performance_id: PerformanceId, count: u64) {
        let mut perfs = self.state();
        let state = perfs.entry(performance_id).or_insert_with(PerformanceState::new);
        state.seq += count;
    }

    /// Продажа/резерв/аннулирование места внешним процессом.
    pub fn settle(&self, seat_id: &SeatId, performance_id: PerformanceId, status: BaseStatus) -> FeedEvent {
        let mut perfs = self.state();
        let state = perfs.entry(performance_id).or_insert_with(PerformanceState::new);
        state.locks.remove(seat_id);
        let event = FeedEvent {
            seq: state.next_seq(),
            seat_id: seat_id.clone(),
            status: match status {
                BaseStatus::Available => FeedStatus::Available,
                BaseStatus::Sold => FeedStatus::Sold,
                BaseStatus::Reserved => FeedStatus::Reserved,
                BaseStatus::Voided => FeedStatus::Voided,
            },
            owner: None,
            at: Some(Utc::now()),
        };
        state.publish(&event);
        event
    }

    /// Рассылает произвольное событие как есть, без изменения состояния.
    pub fn replay(&self, performance_id: PerformanceId, event: FeedEvent) {
        let perfs = self.state();
        if let Some(state) = perfs.get(&performance_id) {
            state.publish(&event);
        }
    }

    pub fn holder(&self, seat_id: &SeatId, performance_id: PerformanceId) -> Option<SessionId> {
        self.state()
            .get(&performance_id)
            .and_then(|state| state.locks.get(seat_id))
            .map(|lock| lock.owner)
    }

    pub fn lock_count(&self, performance_id: PerformanceId) -> usize {
        self.state()
            .get(&performance_id)
            .map(|state| state.locks.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn acquire_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
        status: LockStatus,
    ) -> Result<AcquireOutcome, BackendError> {
        self.network_delay().await;
        self.ensure_online()?;
        let mut perfs = self.state();
        let state = perfs.entry(performance_id).or_insert_with(PerformanceState::new);

        if let Some(existing) = state.locks.get(seat_id) {
            if existing.owner != owner {
                return Ok(AcquireOutcome::Conflict {
                    holder: Some(existing.owner),
                });
            }
        }

        let locked_at = Utc::now();
        state.locks.insert(
            seat_id.clone(),
            Lock {
                seat_id: seat_id.clone(),
                performance_id,
                owner,
                status,
                locked_at,
            },
        );
        let event = FeedEvent {
            seq: state.next_seq(),
            seat_id: seat_id.clone(),
            status: status.into(),
            owner: Some(owner),
            at: Some(locked_at),
        };
        state.publish(&event);
        Ok(AcquireOutcome::Acquired(event))
    }

    async fn release_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
    ) -> Result<ReleaseOutcome, BackendError> {
        self.network_delay().await;
        self.ensure_online()?;
        let mut perfs = self.state();
        let Some(state) = perfs.get_mut(&performance_id) else {
            return Ok(ReleaseOutcome::NotOwner);
        };

        match state.locks.get(seat_id) {
            Some(lock) if lock.owner == owner => {
                state.locks.remove(seat_id);
            }
            _ => return Ok(ReleaseOutcome::NotOwner),
        }

        let event = FeedEvent {
            seq: state.next_seq(),
            seat_id: seat_id.clone(),
            status: FeedStatus::Available,
            owner: Some(owner),
            at: Some(Utc::now()),
        };
        state.publish(&event);
        Ok(ReleaseOutcome::Released(event))
    }

    async fn subscribe(&self, performance_id: PerformanceId) -> Result<FeedStream, BackendError> {
        self.ensure_online()?;
        let rx = self
            .state()
            .entry(performance_id)
            .or_insert_with(PerformanceState::new)
            .feed
            .subscribe();

        // отставание (Lagged) тоже завершает поток: подписчик переподключится и сделает снимок
        let stream = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((event, rx)),
                Err(_) => None,
            }
        });
        Ok(stream.boxed())
    }

    async fn snapshot(&self, performance_id: PerformanceId) -> Result<LockSnapshot, BackendError> {
        self.ensure_online()?;
        let perfs = self.state();
        Ok(perfs
            .get(&performance_id)
            .map(|state| LockSnapshot {
                seq: state.seq,
                locks: state.locks.clone(),
            })
            .unwrap_or_default())
    }
}

/// Поведение in-memory проверки оплаты.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentBackendMode {
    #[default]
    Normal,
    /// Как будто функции проверки нет в базе.
    MissingFunction,
    /// Каждый вызов завершается ошибкой транспорта.
    Failing,
    /// Вызов никогда не завершается.
    Hanging,
}

#[derive(Default)]
pub struct MemoryPaymentBackend {
    records: Mutex<HashMap<(PerformanceId, SeatId), PaymentRecord>>,
    mode: Mutex<PaymentBackendMode>,
    calls: AtomicUsize,
}

impl MemoryPaymentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: PaymentBackendMode) -> Self {
        let backend = Self::default();
        backend.set_mode(mode);
        backend
    }

    pub fn set_mode(&self, mode: PaymentBackendMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn mark_paid(&self, seat_id: &SeatId, performance_id: PerformanceId, source: PaymentSource) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).insert(
            (performance_id, seat_id.clone()),
            PaymentRecord {
                seat_id: seat_id.to_string(),
                is_paid: true,
                status: Some("completed".to_string()),
                source: Some(source.as_str().to_string()),
            },
        );
    }

    /// Сколько раз хранилище реально вызывали.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentCheckBackend for MemoryPaymentBackend {
    async fn check_seats_payment_status(
        &self,
        seat_ids: &[SeatId],
        performance_id: PerformanceId,
        _session_id: SessionId,
        _user_id: Option<&str>,
    ) -> Result<Vec<PaymentRecord>, PaymentCheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap_or_else(PoisonError::into_inner);

        match mode {
            PaymentBackendMode::MissingFunction => Err(PaymentCheckError::NotFound),
            PaymentBackendMode::Failing => Err(BackendError::Offline.into()),
            PaymentBackendMode::Hanging => {
                futures::future::pending::<()>().await;
                Ok(Vec::new())
            }
            PaymentBackendMode::Normal => {
                let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(seat_ids
                    .iter()
                    .filter_map(|id| records.get(&(performance_id, id.clone())).cloned())
                    .collect())
            }
        }
    }
}
