use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Seat, SessionId};

/// Состояние подписки на канал изменений.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Подписки нет.
    #[default]
    Closed,
    Connecting,
    Live,
    /// Канал оборвался, состояние может быть устаревшим.
    Reconnecting,
}

/// Статус, который видит отрисовка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Available,
    Selected,
    Sold,
    Reserved,
    Voided,
    /// Канал не в сети — свободным место не показываем.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    None,
    Mine,
    Other,
}

/// Итоговое состояние места для отрисовки. Производное, никогда не изменяется напрямую.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedSeatView<'a> {
    pub seat: &'a Seat,
    pub status: DisplayStatus,
    pub ownership: Ownership,
    pub locked_by: Option<SessionId>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl MergedSeatView<'_> {
    pub fn is_selectable(&self) -> bool {
        self.status == DisplayStatus::Available
    }
}
