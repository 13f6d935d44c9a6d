//! Блокировки мест в Redis.
//!
//! Раскладка ключей для представления `P`:
//!   `{prefix}:locks:P` — hash seat_id → JSON блокировки
//!   `{prefix}:seq:P`   — счётчик событий
//!   `{prefix}:feed:P`  — канал PUBLISH с событиями
//!
//! Захват и снятие — Lua-скрипты: проверка владельца, запись, INCR и PUBLISH
//! выполняются одной атомарной операцией, поэтому из двух одновременных
//! захватов выигрывает ровно один, а `seq` в канале идёт в порядке записи.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use redis::Script;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{AcquireOutcome, FeedStream, LockBackend, ReleaseOutcome};
use crate::error::BackendError;
use crate::models::{
    FeedEvent, FeedStatus, LockSnapshot, LockStatus, PerformanceId, SeatId, SessionId, StoredLock,
};
use crate::redis_client::RedisClient;

const ACQUIRE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current then
  local lock = cjson.decode(current)
  if lock.owner ~= ARGV[2] then
    return {0, lock.owner}
  end
end
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode({owner = ARGV[2], status = ARGV[3], locked_at = ARGV[4]}))
local seq = redis.call('INCR', KEYS[2])
redis.call('PUBLISH', ARGV[5], cjson.encode({seq = seq, seat_id = ARGV[1], status = ARGV[3], owner = ARGV[2], at = ARGV[4]}))
return {seq, ARGV[2]}
"#;

const RELEASE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then
  return 0
end
local lock = cjson.decode(current)
if lock.owner ~= ARGV[2] then
  return 0
end
redis.call('HDEL', KEYS[1], ARGV[1])
local seq = redis.call('INCR', KEYS[2])
redis.call('PUBLISH', ARGV[4], cjson.encode({seq = seq, seat_id = ARGV[1], status = 'available', owner = ARGV[2], at = ARGV[3]}))
return seq
"#;

#[derive(Clone)]
pub struct RedisLockBackend {
    redis: RedisClient,
    prefix: String,
    acquire: Script,
    release: Script,
}

impl RedisLockBackend {
    pub fn new(redis: RedisClient, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    fn locks_key(&self, performance_id: PerformanceId) -> String {
        format!("{}:locks:{}", self.prefix, performance_id)
    }

    fn seq_key(&self, performance_id: PerformanceId) -> String {
        format!("{}:seq:{}", self.prefix, performance_id)
    }

    fn channel(&self, performance_id: PerformanceId) -> String {
        format!("{}:feed:{}", self.prefix, performance_id)
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn acquire_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
        status: LockStatus,
    ) -> Result<AcquireOutcome, BackendError> {
        let mut conn = self.redis.conn.clone();
        let locked_at = Utc::now();

        let (seq, holder): (i64, String) = self
            .acquire
            .key(self.locks_key(performance_id))
            .key(self.seq_key(performance_id))
            .arg(seat_id.as_str())
            .arg(owner.to_string())
            .arg(status.as_str())
            .arg(locked_at.to_rfc3339())
            .arg(self.channel(performance_id))
            .invoke_async(&mut conn)
            .await?;

        if seq <= 0 {
            debug!("Seat {} of performance {} is held by {}", seat_id, performance_id, holder);
            return Ok(AcquireOutcome::Conflict {
                holder: SessionId::parse(&holder).ok(),
            });
        }

        Ok(AcquireOutcome::Acquired(FeedEvent {
            seq: seq as u64,
            seat_id: seat_id.clone(),
            status: status.into(),
            owner: Some(owner),
            at: Some(locked_at),
        }))
    }

    async fn release_lock(
        &self,
        seat_id: &SeatId,
        performance_id: PerformanceId,
        owner: SessionId,
    ) -> Result<ReleaseOutcome, BackendError> {
        let mut conn = self.redis.conn.clone();
        let released_at = Utc::now();

        let seq: i64 = self
            .release
            .key(self.locks_key(performance_id))
            .key(self.seq_key(performance_id))
            .arg(seat_id.as_str())
            .arg(owner.to_string())
            .arg(released_at.to_rfc3339())
            .arg(self.channel(performance_id))
            .invoke_async(&mut conn)
            .await?;

        if seq <= 0 {
            return Ok(ReleaseOutcome::NotOwner);
        }

        Ok(ReleaseOutcome::Released(FeedEvent {
            seq: seq as u64,
            seat_id: seat_id.clone(),
            status: FeedStatus::Available,
            owner: Some(owner),
            at: Some(released_at),
        }))
    }

    async fn subscribe(&self, performance_id: PerformanceId) -> Result<FeedStream, BackendError> {
        let channel = self.channel(performance_id);
        let mut pubsub = self.redis.pubsub().await?;
        pubsub.subscribe(&channel).await?;
        info!("Subscribed to redis channel {}", channel);

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Non-text message on lock feed: {:?}", e);
                        return None;
                    }
                };
                match serde_json::from_str::<FeedEvent>(&payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!("Malformed lock feed event {}: {}", payload, e);
                        None
                    }
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn snapshot(&self, performance_id: PerformanceId) -> Result<LockSnapshot, BackendError> {
        let mut conn = self.redis.conn.clone();

        // HGETALL + GET одной транзакцией, чтобы seq соответствовал содержимому hash
        let (raw, seq): (HashMap<String, String>, Option<u64>) = redis::pipe()
            .atomic()
            .hgetall(self.locks_key(performance_id))
            .get(self.seq_key(performance_id))
            .query_async(&mut conn)
            .await?;

        let mut locks = HashMap::with_capacity(raw.len());
        for (seat, json) in raw {
            match serde_json::from_str::<StoredLock>(&json) {
                Ok(stored) => {
                    let seat_id = SeatId::new(seat);
                    locks.insert(seat_id.clone(), stored.into_lock(seat_id, performance_id));
                }
                Err(e) => warn!("Skipping malformed lock record for seat {}: {}", seat, e),
            }
        }

        Ok(LockSnapshot {
            seq: seq.unwrap_or(0),
            locks,
        })
    }
}
