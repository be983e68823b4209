//! NPC instance pool (§4.2.6): an LRU map keyed by `(world_id, npc_id)` with
//! per-key creation locking. Eviction is exposed to the caller rather than
//! hidden inside `insert`, so the admin orchestrator can persist/graphize an
//! evicted instance's state before it is dropped (§5 `InstanceManager`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use runtime_domain::{CharacterId, WorldId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub world_id: WorldId,
    pub npc_id: CharacterId,
}

struct PoolEntry<T> {
    value: T,
    last_access: DateTime<Utc>,
}

/// LRU instance pool. `T` is cloned out on read so callers never hold the
/// pool's internal lock while using a value.
pub struct InstancePool<T> {
    max_instances: usize,
    evict_after: Duration,
    entries: Mutex<HashMap<InstanceKey, PoolEntry<T>>>,
    key_locks: Mutex<HashMap<InstanceKey, Arc<AsyncMutex<()>>>>,
}

impl<T: Clone> InstancePool<T> {
    pub fn new(max_instances: usize, evict_after: Duration) -> Self {
        Self {
            max_instances,
            evict_after,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("instance pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.entries
            .lock()
            .expect("instance pool lock poisoned")
            .contains_key(key)
    }

    /// Acquire (creating if necessary) the per-key lock serializing creation
    /// for `key` (§5: "per-key mutex").
    async fn lock_key(&self, key: InstanceKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock().expect("instance pool lock poisoned");
            locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        lock.lock_owned().await
    }

    fn get(&self, key: &InstanceKey, now: DateTime<Utc>) -> Option<T> {
        let mut entries = self.entries.lock().expect("instance pool lock poisoned");
        let entry = entries.get_mut(key)?;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Insert a freshly built value, evicting the least-recently-used entry
    /// first if at capacity and `key` itself is not already present.
    /// Prefers evicting an entry whose last access is older than
    /// `evict_after`; falls back to the absolute least-recent otherwise.
    fn insert(&self, key: InstanceKey, value: T, now: DateTime<Utc>) -> Option<(InstanceKey, T)> {
        let mut entries = self.entries.lock().expect("instance pool lock poisoned");
        let evicted = if entries.len() >= self.max_instances && !entries.contains_key(&key) {
            self.evict_one(&mut entries, now)
        } else {
            None
        };
        entries.insert(key, PoolEntry { value, last_access: now });
        evicted
    }

    fn evict_one(&self, entries: &mut HashMap<InstanceKey, PoolEntry<T>>, now: DateTime<Utc>) -> Option<(InstanceKey, T)> {
        let stale_key = entries
            .iter()
            .filter(|(_, entry)| now - entry.last_access > self.evict_after)
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key);

        let victim = stale_key.or_else(|| entries.iter().min_by_key(|(_, entry)| entry.last_access).map(|(key, _)| *key))?;
        entries.remove(&victim).map(|entry| (victim, entry.value))
    }

    /// Get-or-create serialized by a per-key lock. Returns the (possibly
    /// freshly created) value and, if a different entry had to be evicted
    /// to make room for it, that evicted `(key, value)` pair.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: InstanceKey,
        now: DateTime<Utc>,
        create: F,
    ) -> (T, Option<(InstanceKey, T)>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock_key(key).await;
        if let Some(existing) = self.get(&key, now) {
            return (existing, None);
        }
        let value = create().await;
        let evicted = self.insert(key, value.clone(), now);
        (value, evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> InstanceKey {
        InstanceKey {
            world_id: WorldId::new(),
            npc_id: CharacterId::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_entry() {
        let pool: InstancePool<u32> = InstancePool::new(4, Duration::minutes(30));
        let k = key();
        let (first, evicted) = pool.get_or_create(k, now(), || async { 1 }).await;
        assert_eq!(first, 1);
        assert!(evicted.is_none());

        let (second, evicted) = pool.get_or_create(k, now(), || async { 2 }).await;
        assert_eq!(second, 1, "second call should see the cached value, not recreate");
        assert!(evicted.is_none());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used_when_at_capacity() {
        let pool: InstancePool<u32> = InstancePool::new(2, Duration::minutes(30));
        let a = InstanceKey {
            world_id: WorldId::new(),
            npc_id: CharacterId::new(),
        };
        let b = InstanceKey {
            world_id: WorldId::new(),
            npc_id: CharacterId::new(),
        };
        let c = InstanceKey {
            world_id: WorldId::new(),
            npc_id: CharacterId::new(),
        };

        let t0 = now();
        pool.get_or_create(a, t0, || async { 1u32 }).await;
        pool.get_or_create(b, t0 + Duration::seconds(1), || async { 2u32 }).await;
        // touch `a` so `b` becomes the LRU entry
        pool.get_or_create(a, t0 + Duration::seconds(2), || async { 1u32 }).await;

        let (_value, evicted) = pool
            .get_or_create(c, t0 + Duration::seconds(3), || async { 3u32 })
            .await;
        let (evicted_key, evicted_value) = evicted.expect("pool was at capacity, an eviction must occur");
        assert_eq!(evicted_key, b);
        assert_eq!(evicted_value, 2);
        assert_eq!(pool.len(), 2);
    }
}
