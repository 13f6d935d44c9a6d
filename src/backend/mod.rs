//! Внешнее хранилище: атомарные блокировки, канал изменений и проверка оплаты.
//!
//! Клиентский код работает только через эти трейты, реализации подставляются
//! при сборке контекста: Redis + Postgres в проде, in-memory в тестах.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{BackendError, PaymentCheckError};
use crate::models::{FeedEvent, LockSnapshot, LockStatus, PaymentRecord, PerformanceId, SeatId, SessionId};

pub mod memory;
pub mod postgres;
pub mod redis;

pub use self::memory::{MemoryLockBackend, MemoryPaymentBackend};
pub use self::postgres::PgPaymentCheckBackend;
pub use self::redis::RedisLockBackend;

/// Упорядоченный поток событий одного представления. Конец потока = обрыв.
pub type FeedStream = BoxStream<'static, FeedEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// Блокировка наша; событие уже опубликовано в канал с этим `seq`.
    Acquired(FeedEvent),
    /// Место держит другая сессия.
    Conflict { holder: Option<SessionId> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released(FeedEvent),
    /// Блокировки нет или она чужая — ничего не сделано.
    NotOwner,
}

#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Атомарно: место свободно или уже наше → записать и опубликовать событие.
    async fn acquire_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
        status: LockStatus,
    ) -> Result<AcquireOutcome, BackendError>;

    /// Атомарно снимает блокировку, только если она принадлежит `owner`.
    async fn release_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
    ) -> Result<ReleaseOutcome, BackendError>;

    async fn subscribe(&self, performance_id: PerformanceId) -> Result<FeedStream, BackendError>;

    /// Полное чтение для ресинхронизации.
    async fn snapshot(&self, performance_id: PerformanceId) -> Result<LockSnapshot, BackendError>;
}

#[async_trait]
pub trait PaymentCheckBackend: Send + Sync {
    async fn check_seats_payment_status(
        &self,
        seat_ids: &[SeatId],
        performance_id: PerformanceId,
        session_id: SessionId,
        user_id: Option<&str>,
    ) -> Result<Vec<PaymentRecord>, PaymentCheckError>;
}
