use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

use crate::error::IdError;

/// Стабильный идентификатор места. Никогда не меняется после создания карты.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    pub fn new(raw: impl Into<String>) -> Self {
        SeatId(raw.into())
    }

    /// Разбирает id, пришедший из UI: обрезает пробелы, пустой id отклоняется.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdError::EmptySeatId);
        }
        Ok(SeatId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SeatId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SeatId {
    fn from(s: &str) -> Self {
        SeatId(s.to_string())
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Идентификатор представления (сеанса, "функции").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceId(i64);

impl PerformanceId {
    pub fn new(id: i64) -> Result<Self, IdError> {
        if id <= 0 {
            return Err(IdError::InvalidPerformance(id));
        }
        Ok(PerformanceId(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Сессия клиента — владелец блокировок.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Владелец неизвестен (битое событие канала).
    pub fn nil() -> Self {
        SessionId(Uuid::nil())
    }

    /// Чистит значение из localStorage/заголовков: невидимые символы, кавычки, пробелы.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
            .collect();
        let cleaned = cleaned.trim().trim_matches(|c| c == '"' || c == '\'').trim();

        Uuid::parse_str(cleaned)
            .map(SessionId)
            .map_err(|_| IdError::InvalidSession(raw.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
