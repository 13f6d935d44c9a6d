//! Небольшой кеш с TTL по классу записи.
//!
//! Срок жизни зависит не от ключа, а от того, что лежит внутри: положительные
//! ответы живут дольше отрицательных. Поверх `moka` с политикой `Expiry`.

use moka::sync::Cache;
use moka::Expiry;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    Positive,
    Negative,
    Batch,
}

#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub positive: Duration,
    pub negative: Duration,
    pub batch: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Positive => self.positive,
            TtlClass::Negative => self.negative,
            TtlClass::Batch => self.batch,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    class: TtlClass,
}

struct ClassExpiry {
    policy: TtlPolicy,
}

impl<K, V> Expiry<K, CacheEntry<V>> for ClassExpiry {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.policy.ttl(entry.class))
    }

    // перезапись ключа начинает отсчёт заново по классу новой записи
    fn expire_after_update(
        &self,
        _key: &K,
        entry: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.policy.ttl(entry.class))
    }
}

#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: TtlPolicy, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(ClassExpiry { policy })
            .build();
        Self { inner }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value)
    }

    pub fn insert(&self, key: K, value: V, class: TtlClass) {
        self.inner.insert(key, CacheEntry { value, class });
    }

    pub fn invalidate_where<F>(&self, predicate: F)
    where
        F: Fn(&K) -> bool,
    {
        // moka умеет invalidate_entries_if, но только с включённой поддержкой;
        // карта маленькая, проще пройтись итератором
        let keys: Vec<_> = self
            .inner
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.inner.invalidate(key.as_ref());
        }
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
