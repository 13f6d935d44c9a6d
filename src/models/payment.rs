use serde::{Deserialize, Serialize};
use std::fmt;

/// Откуда получен ответ о статусе оплаты.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    SeatLocks,
    PaymentTransactions,
    PaymentTransactionsByAnyone,
    NotFound,
    /// Проверка не уложилась в таймаут.
    Timeout,
    /// Проверка отключена автоматическим выключателем или не настроена.
    Unavailable,
    Error,
}

impl PaymentSource {
    /// Ответ по умолчанию, а не реальная проверка.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            PaymentSource::Timeout | PaymentSource::Unavailable | PaymentSource::Error
        )
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "seat_locks" => PaymentSource::SeatLocks,
            "payment_transactions" => PaymentSource::PaymentTransactions,
            "payment_transactions_by_anyone" => PaymentSource::PaymentTransactionsByAnyone,
            "not_found" | "" => PaymentSource::NotFound,
            "timeout" => PaymentSource::Timeout,
            "unavailable" => PaymentSource::Unavailable,
            _ => PaymentSource::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::SeatLocks => "seat_locks",
            PaymentSource::PaymentTransactions => "payment_transactions",
            PaymentSource::PaymentTransactionsByAnyone => "payment_transactions_by_anyone",
            PaymentSource::NotFound => "not_found",
            PaymentSource::Timeout => "timeout",
            PaymentSource::Unavailable => "unavailable",
            PaymentSource::Error => "error",
        }
    }
}

impl fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub is_paid: bool,
    pub status: String,
    pub source: PaymentSource,
}

impl PaymentStatus {
    /// Записи нет — место не оплачено.
    pub fn not_found() -> Self {
        Self::not_paid(PaymentSource::NotFound)
    }

    /// Значение по умолчанию: "не оплачено" с указанием источника.
    pub fn not_paid(source: PaymentSource) -> Self {
        Self {
            is_paid: false,
            status: "available".to_string(),
            source,
        }
    }
}

/// Строка результата `check_seats_payment_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub seat_id: String,
    pub is_paid: bool,
    pub status: Option<String>,
    pub source: Option<String>,
}

impl PaymentRecord {
    pub fn into_status(self) -> PaymentStatus {
        let source = self
            .source
            .as_deref()
            .map(PaymentSource::from_label)
            .unwrap_or(PaymentSource::NotFound);
        PaymentStatus {
            is_paid: self.is_paid,
            status: self.status.unwrap_or_else(|| {
                if self.is_paid { "completed" } else { "available" }.to_string()
            }),
            source,
        }
    }
}
