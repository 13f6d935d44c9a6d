use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: RedisConfig,
    pub lock: LockConfig,
    pub feed: FeedConfig,
    pub payment_cache: PaymentCacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub throttle: ThrottleConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub rust_log: String,
    /// "json" включает JSON-логи
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            rust_log: "seat_lock_core=debug".to_string(),
            log_format: "text".to_string(),
        }
    }
}

// Настройки базы данных (проверка оплаты). Если DATABASE_URL не задан,
// проверка оплаты считается недоступной.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub run_migrations: bool,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

// Ключи блокировок в хранилище
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_prefix: "seat_locks".to_string(),
        }
    }
}

// Переподключение к каналу изменений
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub connect_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            backoff_initial_ms: 250,
            backoff_max_ms: 5_000,
        }
    }
}

impl FeedConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Экспоненциальная задержка перед попыткой номер `attempt` (с нуля).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let ms = self.backoff_initial_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

// Кеш проверки оплаты
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCacheConfig {
    pub positive_ttl_ms: u64,
    pub negative_ttl_ms: u64,
    pub batch_ttl_ms: u64,
    pub timeout_ms: u64,
    pub max_capacity: u64,
}

impl Default for PaymentCacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_ms: 30_000,
            negative_ttl_ms: 5_000,
            batch_ttl_ms: 2_000,
            timeout_ms: 3_000,
            max_capacity: 10_000,
        }
    }
}

impl PaymentCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.negative_ttl_ms >= self.positive_ttl_ms {
            return Err(ConfigError::TtlOrder {
                negative_ms: self.negative_ttl_ms,
                positive_ms: self.positive_ttl_ms,
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3 }
    }
}

// Ограничение частоты кликов на клиенте
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    pub max_clicks: usize,
    pub window_ms: u64,
    pub min_click_delay_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_clicks: 10,
            window_ms: 5_000,
            min_click_delay_ms: 500,
            cooldown_ms: 300,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn min_click_delay(&self) -> Duration {
        Duration::from_millis(self.min_click_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                pool_size: parse_or("DB_POOL_SIZE", 5)?,
                run_migrations: parse_or("RUN_MIGRATIONS", false)?,
            }),
            _ => None,
        };

        let config = Config {
            app: AppConfig {
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "seat_lock_core=debug,seat_watch=debug".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
            database,
            redis: RedisConfig {
                url: required("REDIS_URL")?,
            },
            lock: LockConfig {
                key_prefix: env::var("LOCK_KEY_PREFIX").unwrap_or_else(|_| "seat_locks".to_string()),
            },
            feed: FeedConfig {
                connect_timeout_ms: parse_or("FEED_CONNECT_TIMEOUT_MS", 5_000)?,
                backoff_initial_ms: parse_or("FEED_BACKOFF_INITIAL_MS", 250)?,
                backoff_max_ms: parse_or("FEED_BACKOFF_MAX_MS", 5_000)?,
            },
            payment_cache: PaymentCacheConfig {
                positive_ttl_ms: parse_or("PAYMENT_POSITIVE_TTL_MS", 30_000)?,
                negative_ttl_ms: parse_or("PAYMENT_NEGATIVE_TTL_MS", 5_000)?,
                batch_ttl_ms: parse_or("PAYMENT_BATCH_TTL_MS", 2_000)?,
                timeout_ms: parse_or("PAYMENT_CHECK_TIMEOUT_MS", 3_000)?,
                max_capacity: parse_or("PAYMENT_CACHE_CAPACITY", 10_000)?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 3)?,
            },
            throttle: ThrottleConfig {
                max_clicks: parse_or("THROTTLE_MAX_CLICKS", 10)?,
                window_ms: parse_or("THROTTLE_WINDOW_MS", 5_000)?,
                min_click_delay_ms: parse_or("THROTTLE_MIN_CLICK_DELAY_MS", 500)?,
                cooldown_ms: parse_or("THROTTLE_COOLDOWN_MS", 300)?,
            },
        };

        config.payment_cache.validate()?;
        Ok(config)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}
