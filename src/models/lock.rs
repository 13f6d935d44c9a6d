use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{BaseStatus, PerformanceId, SeatId, SessionId};

/// Статус блокировки. Пока существует только "выбрано".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    #[default]
    #[serde(alias = "seleccionado")]
    Selected,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Selected => "selected",
        }
    }
}

/// Временное владение местом одной сессией на одном представлении.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub seat_id: SeatId,
    pub performance_id: PerformanceId,
    pub owner: SessionId,
    pub status: LockStatus,
    pub locked_at: DateTime<Utc>,
}

/// Статус, который может прийти по каналу изменений.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Selected,
    Available,
    Sold,
    Reserved,
    Voided,
}

impl From<LockStatus> for FeedStatus {
    fn from(status: LockStatus) -> Self {
        match status {
            LockStatus::Selected => FeedStatus::Selected,
        }
    }
}

/// Событие канала изменений. `seq` назначается хранилищем атомарно вместе с записью.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub seq: u64,
    pub seat_id: SeatId,
    pub status: FeedStatus,
    #[serde(default)]
    pub owner: Option<SessionId>,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl FeedEvent {
    /// Во что событие превращает состояние места. `None` — место освобождено.
    pub fn to_override(&self, performance_id: PerformanceId) -> Option<SeatOverride> {
        match self.status {
            FeedStatus::Available => None,
            FeedStatus::Sold => Some(SeatOverride::Settled(BaseStatus::Sold)),
            FeedStatus::Reserved => Some(SeatOverride::Settled(BaseStatus::Reserved)),
            FeedStatus::Voided => Some(SeatOverride::Settled(BaseStatus::Voided)),
            // "selected" без владельца — битое событие, считаем место занятым кем-то
            FeedStatus::Selected => Some(SeatOverride::Locked(Lock {
                seat_id: self.seat_id.clone(),
                performance_id,
                owner: self.owner.unwrap_or_else(SessionId::nil),
                status: LockStatus::Selected,
                locked_at: self.at.unwrap_or_else(Utc::now),
            })),
        }
    }
}

/// Что хранилище блокировок знает о месте сверх базового статуса.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatOverride {
    Locked(Lock),
    /// Продано/зарезервировано/аннулировано — приходит только из канала.
    Settled(BaseStatus),
}

impl SeatOverride {
    pub fn lock(&self) -> Option<&Lock> {
        match self {
            SeatOverride::Locked(lock) => Some(lock),
            SeatOverride::Settled(_) => None,
        }
    }
}

/// Полное состояние блокировок представления на момент `seq`.
#[derive(Debug, Clone, Default)]
pub struct LockSnapshot {
    pub seq: u64,
    pub locks: HashMap<SeatId, Lock>,
}

/// Запись блокировки в хранилище (без seat_id/performance_id — они в ключе).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLock {
    pub owner: SessionId,
    pub status: LockStatus,
    pub locked_at: DateTime<Utc>,
}

impl StoredLock {
    pub fn into_lock(self, seat_id: SeatId, performance_id: PerformanceId) -> Lock {
        Lock {
            seat_id,
            performance_id,
            owner: self.owner,
            status: self.status,
            locked_at: self.locked_at,
        }
    }
}
