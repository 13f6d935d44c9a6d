use thiserror::Error;

/// Ошибки хранилища блокировок и канала изменений.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Хранилище недоступно (используется in-memory реализацией для симуляции обрыва сети).
    #[error("backend is offline")]
    Offline,
}

/// Ошибки пакетной проверки оплаты.
#[derive(Debug, Error)]
pub enum PaymentCheckError {
    /// Функция проверки отсутствует в хранилище. Повторять бессмысленно.
    #[error("payment status check is not available in the backing store")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<sqlx::Error> for PaymentCheckError {
    fn from(e: sqlx::Error) -> Self {
        // 42883 = undefined_function
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("42883") {
                return PaymentCheckError::NotFound;
            }
        }
        PaymentCheckError::Backend(BackendError::Database(e))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("negative cache TTL ({negative_ms}ms) must be shorter than positive TTL ({positive_ms}ms)")]
    TtlOrder { negative_ms: u64, positive_ms: u64 },
}

/// Ошибки при разборе идентификаторов, пришедших извне.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("seat id is empty")]
    EmptySeatId,

    #[error("invalid session id '{0}'")]
    InvalidSession(String),

    #[error("performance id must be positive, got {0}")]
    InvalidPerformance(i64),
}

/// Ошибки при сборке контекста из конфигурации.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to connect to payment database: {0}")]
    Database(#[from] sqlx::Error),
}
