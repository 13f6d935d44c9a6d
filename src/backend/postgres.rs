use async_trait::async_trait;
use tracing::debug;

use super::PaymentCheckBackend;
use crate::database::Database;
use crate::error::PaymentCheckError;
use crate::models::{PaymentRecord, PerformanceId, SeatId, SessionId};

/// Проверка оплаты через SQL-функцию `check_seats_payment_status`.
///
/// Функция ставится миграцией из `src/migrations`. Если её нет в базе,
/// Postgres отвечает 42883 и вызов завершается `PaymentCheckError::NotFound`.
#[derive(Clone)]
pub struct PgPaymentCheckBackend {
    db: Database,
}

impl PgPaymentCheckBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentCheckBackend for PgPaymentCheckBackend {
    async fn check_seats_payment_status(
        &self,
        seat_ids: &[SeatId],
        performance_id: PerformanceId,
        session_id: SessionId,
        user_id: Option<&str>,
    ) -> Result<Vec<PaymentRecord>, PaymentCheckError> {
        let ids: Vec<&str> = seat_ids.iter().map(SeatId::as_str).collect();

        let records: Vec<PaymentRecord> = sqlx::query_as(
            "SELECT seat_id, is_paid, status, source FROM check_seats_payment_status($1::text[], $2, $3, $4)",
        )
        .bind(&ids)
        .bind(performance_id.get())
        .bind(session_id.to_string())
        .bind(user_id)
        .fetch_all(&self.db.pool)
        .await?;

        debug!(
            "Payment check for {} seats of performance {} returned {} records",
            ids.len(),
            performance_id,
            records.len()
        );
        Ok(records)
    }
}
