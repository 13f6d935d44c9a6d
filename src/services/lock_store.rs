//! Клиентское хранилище блокировок одного представления.
//!
//! Держит подписку на канал изменений, сливает в одно состояние снимок
//! хранилища, события канала и результаты собственных lock/unlock, и отдаёт
//! наружу неизменяемый `LockView` с номером версии.
//!
//! Порядок событий задаёт `seq`, который хранилище назначает вместе с записью.
//! К месту применяется только событие новее последнего применённого к нему
//! (и новее снимка). Разрыв в `seq` канала означает потерю событий и ведёт к
//! полной ресинхронизации через снимок.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AcquireOutcome, FeedStream, LockBackend, ReleaseOutcome};
use crate::config::FeedConfig;
use crate::error::BackendError;
use crate::models::{
    FeedEvent, FeedState, LockSnapshot, LockStatus, PerformanceId, SeatId, SeatOverride, SessionId,
};

/// Неизменяемый снимок состояния хранилища для отрисовки.
#[derive(Debug, Clone, Default)]
pub struct LockView {
    pub version: u64,
    pub performance_id: Option<PerformanceId>,
    pub feed_state: FeedState,
    pub overrides: Arc<HashMap<SeatId, SeatOverride>>,
}

impl LockView {
    pub fn get(&self, seat_id: &SeatId) -> Option<&SeatOverride> {
        self.overrides.get(seat_id)
    }

    pub fn is_live(&self) -> bool {
        self.feed_state == FeedState::Live
    }
}

#[derive(Debug, Default)]
struct LockState {
    performance_id: Option<PerformanceId>,
    feed_state: FeedState,
    overrides: Arc<HashMap<SeatId, SeatOverride>>,
    /// Последний применённый к месту `seq`.
    seat_seq: HashMap<SeatId, u64>,
    /// `seq` последнего снимка.
    baseline_seq: u64,
    /// Последний `seq`, пришедший по каналу.
    feed_seq: u64,
    version: u64,
    /// Меняется при каждой смене подписки; запись от старой задачи канала игнорируется.
    epoch: u64,
}

impl LockState {
    /// Применяет событие к месту, если оно новее уже известного. `true` — состояние изменилось.
    fn apply_event(&mut self, event: &FeedEvent) -> bool {
        let Some(performance_id) = self.performance_id else {
            return false;
        };
        if event.seq <= self.baseline_seq {
            return false;
        }
        if self.seat_seq.get(&event.seat_id).is_some_and(|last| event.seq <= *last) {
            return false;
        }

        self.seat_seq.insert(event.seat_id.clone(), event.seq);
        let overrides = Arc::make_mut(&mut self.overrides);
        match event.to_override(performance_id) {
            Some(o) => {
                overrides.insert(event.seat_id.clone(), o);
            }
            None => {
                overrides.remove(&event.seat_id);
            }
        }
        true
    }

    fn apply_snapshot(&mut self, snapshot: LockSnapshot) {
        let mut fresh: HashMap<SeatId, SeatOverride> = snapshot
            .locks
            .into_iter()
            .map(|(seat_id, lock)| (seat_id, SeatOverride::Locked(lock)))
            .collect();

        // продажи в снимок не попадают — переносим из текущего состояния
        for (seat_id, o) in self.overrides.iter() {
            if matches!(o, SeatOverride::Settled(_)) {
                fresh.entry(seat_id.clone()).or_insert_with(|| o.clone());
            }
        }

        // собственные результаты новее снимка остаются как есть
        self.seat_seq.retain(|_, seq| *seq > snapshot.seq);
        for seat_id in self.seat_seq.keys() {
            match self.overrides.get(seat_id) {
                Some(o) => {
                    fresh.insert(seat_id.clone(), o.clone());
                }
                None => {
                    fresh.remove(seat_id);
                }
            }
        }

        self.overrides = Arc::new(fresh);
        self.baseline_seq = snapshot.seq;
        self.feed_seq = snapshot.seq;
    }
}

enum FeedStep {
    Applied,
    Skipped,
    Gap { expected: u64, got: u64 },
    Superseded,
}

enum FeedEnd {
    Closed,
    Gap,
    Superseded,
}

struct Shared {
    state: RwLock<LockState>,
    version_tx: watch::Sender<u64>,
    feed_state_tx: watch::Sender<FeedState>,
    /// Поколение отмены по месту: unlock увеличивает его, lock в полёте сверяет.
    cancel: Mutex<HashMap<SeatId, u64>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RwLock::new(LockState::default()),
            version_tx: watch::Sender::new(0),
            feed_state_tx: watch::Sender::new(FeedState::Closed),
            cancel: Mutex::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut LockState) {
        state.version += 1;
        self.version_tx.send_replace(state.version);
        self.feed_state_tx.send_if_modified(|current| {
            if *current != state.feed_state {
                *current = state.feed_state;
                true
            } else {
                false
            }
        });
    }

    /// Сбрасывает состояние под новую подписку и возвращает её эпоху.
    fn reset(&self, performance_id: Option<PerformanceId>) -> u64 {
        let mut state = self.write();
        let epoch = state.epoch + 1;
        *state = LockState {
            performance_id,
            feed_state: if performance_id.is_some() {
                FeedState::Connecting
            } else {
                FeedState::Closed
            },
            version: state.version,
            epoch,
            ..LockState::default()
        };
        self.publish(&mut state);
        epoch
    }

    fn set_feed_state(&self, epoch: u64, feed_state: FeedState) -> bool {
        let mut state = self.write();
        if state.epoch != epoch {
            return false;
        }
        if state.feed_state != feed_state {
            state.feed_state = feed_state;
            self.publish(&mut state);
        }
        true
    }

    fn apply_snapshot(&self, epoch: u64, snapshot: LockSnapshot) -> bool {
        let mut state = self.write();
        if state.epoch != epoch {
            return false;
        }
        let locks = snapshot.locks.len();
        let seq = snapshot.seq;
        state.apply_snapshot(snapshot);
        state.feed_state = FeedState::Live;
        self.publish(&mut state);
        debug!("Applied lock snapshot: {} locks at seq {}", locks, seq);
        true
    }

    fn apply_feed_event(&self, epoch: u64, event: FeedEvent) -> FeedStep {
        let mut state = self.write();
        if state.epoch != epoch {
            return FeedStep::Superseded;
        }
        if event.seq <= state.feed_seq {
            return FeedStep::Skipped;
        }
        if event.seq > state.feed_seq + 1 {
            return FeedStep::Gap {
                expected: state.feed_seq + 1,
                got: event.seq,
            };
        }
        state.feed_seq = event.seq;
        if state.apply_event(&event) {
            self.publish(&mut state);
        }
        FeedStep::Applied
    }

    /// Результат собственного lock/unlock: применяется сразу, копия из канала потом ничего не меняет.
    fn apply_own(&self, performance_id: PerformanceId, event: &FeedEvent) {
        let mut state = self.write();
        if state.performance_id != Some(performance_id) {
            return;
        }
        if state.apply_event(event) {
            self.publish(&mut state);
        }
    }

    fn cancel_generation(&self, seat_id: &SeatId) -> u64 {
        let cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        cancel.get(seat_id).copied().unwrap_or(0)
    }

    fn cancel_pending(&self, seat_id: &SeatId) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        *cancel.entry(seat_id.clone()).or_insert(0) += 1;
    }
}

pub struct SeatLockStore {
    backend: Arc<dyn LockBackend>,
    session_id: SessionId,
    feed: FeedConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SeatLockStore {
    pub fn new(backend: Arc<dyn LockBackend>, session_id: SessionId, feed: FeedConfig) -> Self {
        Self {
            backend,
            session_id,
            feed,
            shared: Arc::new(Shared::new()),
            task: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn performance_id(&self) -> Option<PerformanceId> {
        self.shared.read().performance_id
    }

    /// Одна активная подписка на хранилище. Повторный вызов с тем же id ничего не делает,
    /// с другим — закрывает старую подписку и сбрасывает состояние.
    pub fn subscribe_to_performance(&self, performance_id: PerformanceId) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() && self.performance_id() == Some(performance_id) {
            return;
        }
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let epoch = self.shared.reset(Some(performance_id));
        info!(
            "Session {} subscribing to locks of performance {}",
            self.session_id, performance_id
        );
        *task = Some(tokio::spawn(run_feed(
            Arc::clone(&self.backend),
            Arc::clone(&self.shared),
            performance_id,
            epoch,
            self.feed.clone(),
        )));
    }

    pub fn unsubscribe(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
            self.shared.reset(None);
            info!("Session {} unsubscribed from lock feed", self.session_id);
        }
    }

    /// `true` только если место теперь наше. Конфликт и ошибки транспорта — `false`, без повторов.
    pub async fn lock_seat(&self, seat_id: &SeatId, status: LockStatus, performance_id: PerformanceId) -> bool {
        let generation = self.shared.cancel_generation(seat_id);

        match self
            .backend
            .acquire_lock(seat_id, performance_id, self.session_id, status)
            .await
        {
            Ok(AcquireOutcome::Acquired(event)) => {
                if self.shared.cancel_generation(seat_id) != generation {
                    debug!("Lock of seat {} cancelled by unlock while in flight", seat_id);
                    self.release(seat_id, performance_id).await;
                    return false;
                }
                self.shared.apply_own(performance_id, &event);
                debug!("Seat {} locked by {} (seq {})", seat_id, self.session_id, event.seq);
                true
            }
            Ok(AcquireOutcome::Conflict { holder }) => {
                debug!(
                    "Seat {} of performance {} already locked by {:?}",
                    seat_id, performance_id, holder
                );
                false
            }
            Err(e) => {
                warn!("Failed to lock seat {}: {}", seat_id, e);
                false
            }
        }
    }

    /// Снимает свою блокировку. Безопасно вызывать, пока `lock_seat` по этому месту в полёте:
    /// такой захват будет отменён.
    pub async fn unlock_seat(&self, seat_id: &SeatId, performance_id: PerformanceId) -> bool {
        self.shared.cancel_pending(seat_id);
        self.release(seat_id, performance_id).await
    }

    async fn release(&self, seat_id: &SeatId, performance_id: PerformanceId) -> bool {
        match self
            .backend
            .release_lock(seat_id, performance_id, self.session_id)
            .await
        {
            Ok(ReleaseOutcome::Released(event)) => {
                self.shared.apply_own(performance_id, &event);
                debug!("Seat {} released by {} (seq {})", seat_id, self.session_id, event.seq);
                true
            }
            Ok(ReleaseOutcome::NotOwner) => false,
            Err(e) => {
                warn!("Failed to unlock seat {}: {}", seat_id, e);
                false
            }
        }
    }

    pub fn is_seat_locked(&self, seat_id: &SeatId) -> bool {
        matches!(self.shared.read().overrides.get(seat_id), Some(SeatOverride::Locked(_)))
    }

    pub fn is_seat_locked_by_me(&self, seat_id: &SeatId) -> bool {
        self.shared
            .read()
            .overrides
            .get(seat_id)
            .and_then(SeatOverride::lock)
            .is_some_and(|lock| lock.owner == self.session_id)
    }

    pub fn view(&self) -> LockView {
        let state = self.shared.read();
        LockView {
            version: state.version,
            performance_id: state.performance_id,
            feed_state: state.feed_state,
            overrides: Arc::clone(&state.overrides),
        }
    }

    pub fn version(&self) -> u64 {
        self.shared.read().version
    }

    pub fn feed_state(&self) -> FeedState {
        self.shared.read().feed_state
    }

    /// Новая версия публикуется после каждого применённого изменения.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.version_tx.subscribe()
    }

    /// Ждёт, пока канал не окажется в сети. `false` — если хранилище уничтожено.
    pub async fn wait_until_live(&self) -> bool {
        let mut rx = self.shared.feed_state_tx.subscribe();
        let live = rx.wait_for(|state| *state == FeedState::Live).await.is_ok();
        live
    }
}

impl Drop for SeatLockStore {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

/// Задача канала: подписка → снимок → события, при обрыве — пауза и заново.
async fn run_feed(
    backend: Arc<dyn LockBackend>,
    shared: Arc<Shared>,
    performance_id: PerformanceId,
    epoch: u64,
    config: FeedConfig,
) {
    let mut attempt: u32 = 0;
    loop {
        match tokio::time::timeout(config.connect_timeout(), connect(backend.as_ref(), performance_id)).await {
            Ok(Ok((stream, snapshot))) => {
                if !shared.apply_snapshot(epoch, snapshot) {
                    return;
                }
                attempt = 0;
                info!("Lock feed for performance {} is live", performance_id);

                match follow(stream, &shared, epoch).await {
                    FeedEnd::Superseded => return,
                    FeedEnd::Closed => warn!("Lock feed for performance {} closed", performance_id),
                    FeedEnd::Gap => warn!(
                        "Lock feed for performance {} lost events, resynchronizing",
                        performance_id
                    ),
                }
            }
            Ok(Err(e)) => warn!("Lock feed for performance {} failed: {}", performance_id, e),
            Err(_) => warn!(
                "Lock feed for performance {} timed out after {:?}",
                performance_id,
                config.connect_timeout()
            ),
        }

        if !shared.set_feed_state(epoch, FeedState::Reconnecting) {
            return;
        }
        let delay = config.backoff(attempt);
        attempt = attempt.saturating_add(1);
        debug!("Reconnecting lock feed in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

/// Сначала подписка, потом снимок: события между ними не теряются,
/// а всё, что не новее снимка, отбрасывается по `seq`.
async fn connect(
    backend: &dyn LockBackend,
    performance_id: PerformanceId,
) -> Result<(FeedStream, LockSnapshot), BackendError> {
    let stream = backend.subscribe(performance_id).await?;
    let snapshot = backend.snapshot(performance_id).await?;
    Ok((stream, snapshot))
}

async fn follow(mut stream: FeedStream, shared: &Shared, epoch: u64) -> FeedEnd {
    while let Some(event) = stream.next().await {
        match shared.apply_feed_event(epoch, event) {
            FeedStep::Applied | FeedStep::Skipped => {}
            FeedStep::Gap { expected, got } => {
                debug!("Feed gap: expected seq {}, got {}", expected, got);
                return FeedEnd::Gap;
            }
            FeedStep::Superseded => return FeedEnd::Superseded,
        }
    }
    FeedEnd::Closed
}
