//! payment.rs
//!
//! Проверка "место уже оплачено?" перед захватом блокировки.
//!
//! Ключевые компоненты:
//! 1.  **CircuitBreaker**: автоматический выключатель. В отличие от классической
//!     схемы здесь нет полуоткрытого состояния: однажды разомкнувшись, он остаётся
//!     разомкнутым до конца жизни.
//! 2.  **PaymentStatusCache**: пакетная проверка с TTL-кешем. Оплаченные места
//!     кешируются дольше неоплаченных, весь пакет целиком — совсем ненадолго.
//!     Деградированные ответы (таймаут, ошибка, выключатель) не кешируются никогда.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::PaymentCheckBackend;
use crate::cache::{TtlCache, TtlClass, TtlPolicy};
use crate::config::{CircuitBreakerConfig, PaymentCacheConfig};
use crate::error::{ConfigError, PaymentCheckError};
use crate::models::{PaymentSource, PaymentStatus, PerformanceId, SeatId, SessionId};

/// Состояния "Автоматического выключателя".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Нормальный режим работы, запросы разрешены.
    Closed,
    /// Запросы запрещены навсегда.
    Open,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    /// Счетчик последовательных сбоев.
    failure_count: AtomicU32,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn can_execute(&self) -> bool {
        self.get_state() == CircuitState::Closed
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failure_count >= self.failure_threshold {
            self.open(&format!(
                "{} failures reached threshold {}",
                failure_count, self.failure_threshold
            ));
        }
    }

    /// Размыкает сразу, без счётчика.
    pub fn trip(&self, reason: &str) {
        self.open(reason);
    }

    pub fn get_state(&self) -> CircuitState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, reason: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == CircuitState::Closed {
            *state = CircuitState::Open;
            error!("Payment check circuit breaker OPENED - {}", reason);
        }
    }
}

type SeatKey = (PerformanceId, SessionId, SeatId);
type BatchKey = (PerformanceId, SessionId, Vec<SeatId>);
type StatusMap = HashMap<SeatId, PaymentStatus>;

pub struct PaymentStatusCache {
    backend: Option<Arc<dyn PaymentCheckBackend>>,
    breaker: CircuitBreaker,
    seats: TtlCache<SeatKey, PaymentStatus>,
    batches: TtlCache<BatchKey, Arc<StatusMap>>,
    timeout: Duration,
}

impl PaymentStatusCache {
    pub fn new(
        backend: Option<Arc<dyn PaymentCheckBackend>>,
        config: &PaymentCacheConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = TtlPolicy {
            positive: Duration::from_millis(config.positive_ttl_ms),
            negative: Duration::from_millis(config.negative_ttl_ms),
            batch: Duration::from_millis(config.batch_ttl_ms),
        };
        if backend.is_none() {
            warn!("Payment check backend is not configured, all checks report 'unavailable'");
        }
        Ok(Self {
            backend,
            breaker: CircuitBreaker::new(breaker.failure_threshold),
            seats: TtlCache::new(policy, config.max_capacity),
            batches: TtlCache::new(policy, config.max_capacity / 10 + 1),
            timeout: config.timeout(),
        })
    }

    /// Без хранилища: каждая проверка деградирует в "unavailable".
    pub fn unavailable(config: &PaymentCacheConfig) -> Result<Self, ConfigError> {
        Self::new(None, config, &CircuitBreakerConfig::default())
    }

    pub fn breaker_state(&self) -> CircuitState {
        if self.backend.is_none() {
            return CircuitState::Open;
        }
        self.breaker.get_state()
    }

    /// Проверяет все места одним обращением к хранилищу.
    /// В результате есть каждый запрошенный id.
    pub async fn check_batch(
        &self,
        seat_ids: &[SeatId],
        performance_id: PerformanceId,
        session_id: SessionId,
    ) -> StatusMap {
        let mut requested: Vec<SeatId> = seat_ids.to_vec();
        requested.sort();
        requested.dedup();
        if requested.is_empty() {
            return StatusMap::new();
        }

        let batch_key = (performance_id, session_id, requested.clone());
        if let Some(hit) = self.batches.get(&batch_key) {
            debug!("Payment batch cache hit for {} seats", requested.len());
            return (*hit).clone();
        }

        let mut result = StatusMap::with_capacity(requested.len());
        let mut missing = Vec::new();
        for seat_id in &requested {
            match self.seats.get(&(performance_id, session_id, seat_id.clone())) {
                Some(status) => {
                    result.insert(seat_id.clone(), status);
                }
                None => missing.push(seat_id.clone()),
            }
        }

        if !missing.is_empty() {
            let fetched = self.fetch(&missing, performance_id, session_id).await;
            for (seat_id, status) in fetched {
                if !status.source.is_degraded() {
                    let class = if status.is_paid { TtlClass::Positive } else { TtlClass::Negative };
                    self.seats
                        .insert((performance_id, session_id, seat_id.clone()), status.clone(), class);
                }
                result.insert(seat_id, status);
            }
        }

        if result.values().all(|s| !s.source.is_degraded()) {
            self.batches.insert(batch_key, Arc::new(result.clone()), TtlClass::Batch);
        }
        result
    }

    pub async fn check_one(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        session_id: SessionId,
    ) -> PaymentStatus {
        self.check_batch(std::slice::from_ref(seat_id), performance_id, session_id)
            .await
            .remove(seat_id)
            .unwrap_or_else(PaymentStatus::not_found)
    }

    /// Сбрасывает всё, что известно о месте на представлении (для всех сессий).
    pub fn invalidate(&self, seat_id: &SeatId, performance_id: PerformanceId) {
        self.seats
            .invalidate_where(|(perf, _, seat)| *perf == performance_id && seat == seat_id);
        self.batches
            .invalidate_where(|(perf, _, seats)| *perf == performance_id && seats.contains(seat_id));
    }

    pub fn clear(&self) {
        self.seats.clear();
        self.batches.clear();
    }

    async fn fetch(
        &self,
        missing: &[SeatId],
        performance_id: PerformanceId,
        session_id: SessionId,
    ) -> Vec<(SeatId, PaymentStatus)> {
        let degraded = |source: PaymentSource| {
            missing
                .iter()
                .map(|id| (id.clone(), PaymentStatus::not_paid(source)))
                .collect::<Vec<_>>()
        };

        let Some(backend) = self.backend.as_ref() else {
            return degraded(PaymentSource::Unavailable);
        };
        if !self.breaker.can_execute() {
            debug!("Payment check skipped, circuit breaker is open");
            return degraded(PaymentSource::Unavailable);
        }

        let call = backend.check_seats_payment_status(missing, performance_id, session_id, None);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(records)) => {
                self.breaker.record_success();
                let mut by_id: HashMap<String, PaymentStatus> = records
                    .into_iter()
                    .map(|r| (r.seat_id.clone(), r.into_status()))
                    .collect();
                missing
                    .iter()
                    .map(|id| {
                        let status = by_id.remove(id.as_str()).unwrap_or_else(PaymentStatus::not_found);
                        (id.clone(), status)
                    })
                    .collect()
            }
            Ok(Err(PaymentCheckError::NotFound)) => {
                self.breaker.trip("payment check function is missing");
                degraded(PaymentSource::Unavailable)
            }
            Ok(Err(e)) => {
                warn!("Payment check for {} seats failed: {}", missing.len(), e);
                self.breaker.record_failure();
                degraded(PaymentSource::Error)
            }
            Err(_) => {
                warn!(
                    "Payment check for {} seats timed out after {:?}",
                    missing.len(),
                    self.timeout
                );
                self.breaker.record_failure();
                degraded(PaymentSource::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_at_threshold_and_stays_open() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());

        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute(), "success resets the counter");

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);

        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::Open);
    }

    #[test]
    fn trip_opens_immediately() {
        let breaker = CircuitBreaker::new(10);
        breaker.trip("missing");
        assert!(!breaker.can_execute());
    }

    #[tokio::test]
    async fn no_backend_means_unavailable() {
        let cache = PaymentStatusCache::unavailable(&PaymentCacheConfig::default()).unwrap();
        let pid = PerformanceId::new(1).unwrap();
        let status = cache.check_one(&"S1".into(), pid, SessionId::new()).await;

        assert_eq!(status, PaymentStatus::not_paid(PaymentSource::Unavailable));
        assert_eq!(cache.breaker_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let cache = PaymentStatusCache::unavailable(&PaymentCacheConfig::default()).unwrap();
        let pid = PerformanceId::new(1).unwrap();
        assert!(cache.check_batch(&[], pid, SessionId::new()).await.is_empty());
    }
}
