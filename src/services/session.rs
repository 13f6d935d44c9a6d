//! Сессия клиента на одном представлении.
//!
//! Собирает вместе хранилище блокировок, проверку оплаты, ограничитель кликов
//! и места карты. Открытие подписывает хранилище на канал, закрытие отписывает.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ThrottleConfig;
use crate::models::{DisplayStatus, LockStatus, MergedSeatView, Ownership, PaymentStatus, PerformanceId, Seat, SeatId, SessionId};
use crate::services::click_throttle::{ClickThrottle, ThrottleStats};
use crate::services::lock_store::{LockView, SeatLockStore};
use crate::services::map_extractor::MapSeatExtractor;
use crate::services::payment::PaymentStatusCache;
use crate::services::reconciler::{merge_seat, reconcile, ViewTracker};

/// Чем закончился клик по месту.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatClick {
    Locked,
    Unlocked,
    /// Слишком часто; до сети дело не дошло.
    Throttled { wait: Duration },
    AlreadyPaid(PaymentStatus),
    HeldByOther,
    NotAvailable(DisplayStatus),
    UnknownSeat,
    /// Захват или снятие не удались (место перехватили или хранилище не ответило).
    Failed,
}

pub struct SeatingSession {
    performance_id: PerformanceId,
    store: SeatLockStore,
    payments: Arc<PaymentStatusCache>,
    throttle: Mutex<ClickThrottle>,
    extractor: MapSeatExtractor,
    seats: RwLock<Arc<Vec<Seat>>>,
    seat_generation: AtomicU64,
}

impl SeatingSession {
    pub fn open(
        store: SeatLockStore,
        payments: Arc<PaymentStatusCache>,
        throttle: &ThrottleConfig,
        performance_id: PerformanceId,
    ) -> Self {
        store.subscribe_to_performance(performance_id);
        info!(
            "Seating session {} opened for performance {}",
            store.session_id(),
            performance_id
        );
        Self {
            performance_id,
            store,
            payments,
            throttle: Mutex::new(ClickThrottle::new(throttle)),
            extractor: MapSeatExtractor::default(),
            seats: RwLock::new(Arc::new(Vec::new())),
            seat_generation: AtomicU64::new(0),
        }
    }

    pub fn with_extractor(mut self, extractor: MapSeatExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.store.session_id()
    }

    pub fn performance_id(&self) -> PerformanceId {
        self.performance_id
    }

    pub fn store(&self) -> &SeatLockStore {
        &self.store
    }

    pub fn payments(&self) -> &PaymentStatusCache {
        &self.payments
    }

    /// Заменяет места новой картой. Возвращает число мест.
    pub fn load_map(&self, document: &Value) -> usize {
        let seats = self.extractor.extract(document);
        let count = seats.len();
        *self.seats.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(seats);
        self.seat_generation.fetch_add(1, Ordering::SeqCst);
        count
    }

    pub fn seats(&self) -> Arc<Vec<Seat>> {
        Arc::clone(&self.seats.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn seat_generation(&self) -> u64 {
        self.seat_generation.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> LockView {
        self.store.view()
    }

    /// Изменилось ли что-то с прошлого раза (блокировки или карта).
    pub fn needs_render(&self, tracker: &mut ViewTracker) -> bool {
        tracker.needs_update(self.store.version(), self.seat_generation())
    }

    pub fn with_merged<R>(&self, f: impl FnOnce(&[MergedSeatView<'_>]) -> R) -> R {
        let seats = self.seats();
        let view = self.store.view();
        let merged = reconcile(&seats, &view, &self.session_id());
        f(&merged)
    }

    pub fn throttle_stats(&self) -> ThrottleStats {
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }

    /// Клик по месту: ограничитель → снять своё → отказ, если занято → оплата → захват.
    pub async fn toggle_seat(&self, seat_id: &SeatId) -> SeatClick {
        {
            let mut throttle = self.throttle.lock().unwrap_or_else(PoisonError::into_inner);
            let wait = throttle.wait_time(seat_id);
            if !wait.is_zero() {
                debug!("Click on seat {} throttled for {:?}", seat_id, wait);
                return SeatClick::Throttled { wait };
            }
            throttle.register_click(seat_id);
        }

        if self.store.is_seat_locked_by_me(seat_id) {
            return if self.store.unlock_seat(seat_id, self.performance_id).await {
                SeatClick::Unlocked
            } else {
                SeatClick::Failed
            };
        }

        let seats = self.seats();
        let Some(seat) = seats.iter().find(|s| &s.id == seat_id) else {
            return SeatClick::UnknownSeat;
        };

        let merged = merge_seat(seat, &self.store.view(), &self.session_id());
        match (merged.status, merged.ownership) {
            (DisplayStatus::Available, _) => {}
            (DisplayStatus::Selected, Ownership::Other) => return SeatClick::HeldByOther,
            (status, _) => return SeatClick::NotAvailable(status),
        }

        let payment = self
            .payments
            .check_one(seat_id, self.performance_id, self.session_id())
            .await;
        if payment.is_paid {
            debug!("Seat {} already paid ({})", seat_id, payment.source);
            return SeatClick::AlreadyPaid(payment);
        }

        if self
            .store
            .lock_seat(seat_id, LockStatus::Selected, self.performance_id)
            .await
        {
            SeatClick::Locked
        } else {
            SeatClick::Failed
        }
    }

    /// Снимает все свои блокировки на этом представлении. Возвращает число снятых.
    pub async fn release_all(&self) -> usize {
        let mine: Vec<SeatId> = self
            .store
            .view()
            .overrides
            .iter()
            .filter_map(|(id, o)| o.lock().filter(|l| l.owner == self.session_id()).map(|_| id.clone()))
            .collect();

        let mut released = 0;
        for seat_id in &mine {
            if self.store.unlock_seat(seat_id, self.performance_id).await {
                released += 1;
            }
        }
        released
    }

    pub fn close(&self) {
        self.store.unsubscribe();
        info!("Seating session {} closed", self.session_id());
    }
}
