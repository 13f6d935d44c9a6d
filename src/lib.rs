pub mod backend;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod redis_client;
pub mod services;

use std::sync::Arc;
use tracing::info;

use backend::{LockBackend, PaymentCheckBackend, PgPaymentCheckBackend, RedisLockBackend};
use config::Config;
use error::{ConfigError, InitError};
use models::{PerformanceId, SessionId};
use services::{PaymentStatusCache, SeatLockStore, SeatingSession};

// Общий контекст процесса: хранилища и кеш проверки оплаты.
// Сессии открываются из него и получают всё нужное явно.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub config: Config,
    pub locks: Arc<dyn LockBackend>,
    pub payments: Arc<PaymentStatusCache>,
}

impl CoordinatorContext {
    pub async fn connect(config: Config) -> Result<Self, InitError> {
        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        info!("Redis connected");
        let locks: Arc<dyn LockBackend> =
            Arc::new(RedisLockBackend::new(redis, config.lock.key_prefix.clone()));

        let payment_backend: Option<Arc<dyn PaymentCheckBackend>> = match &config.database {
            Some(db_config) => {
                let db = database::Database::from_config(db_config).await?;
                Some(Arc::new(PgPaymentCheckBackend::new(db)))
            }
            None => None,
        };

        Ok(Self::with_backends(config, locks, payment_backend)?)
    }

    pub fn with_backends(
        config: Config,
        locks: Arc<dyn LockBackend>,
        payment_backend: Option<Arc<dyn PaymentCheckBackend>>,
    ) -> Result<Self, ConfigError> {
        let payments = PaymentStatusCache::new(
            payment_backend,
            &config.payment_cache,
            &config.circuit_breaker,
        )?;
        Ok(Self {
            config,
            locks,
            payments: Arc::new(payments),
        })
    }

    /// Открывает сессию и подписывает её на канал представления. Нужен рантайм tokio.
    pub fn open_session(&self, performance_id: PerformanceId, session_id: SessionId) -> SeatingSession {
        let store = SeatLockStore::new(Arc::clone(&self.locks), session_id, self.config.feed.clone());
        SeatingSession::open(store, Arc::clone(&self.payments), &self.config.throttle, performance_id)
    }
}
