use dashmap::DashMap;
use pinnwand_common::model::{Id, user::UserMarker};
use std::time::{Duration, Instant};

#[derive(Clone, Eq, PartialEq, Debug)]
struct CacheEntry {
    texts: Vec<String>,
    inserted_at: Instant,
}

/// Time- and capacity-bounded cache of each user's rendered post list.
///
/// Entries are keyed strictly by the authenticated user's id. Handlers must
/// invalidate the owner's entry immediately after every successful post
/// mutation, before responding, so a later `get` never serves a list older
/// than that write. The sharded map gives concurrent reads with per-key
/// exclusive writes.
#[derive(Debug)]
pub struct PostCache {
    entries: DashMap<Id<UserMarker>, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl PostCache {
    /// The capacity is a memory bound on distinct owners and is clamped to at
    /// least one entry, since an insert always lands after eviction.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, owner: Id<UserMarker>) -> Option<Vec<String>> {
        self.get_at(owner, Instant::now())
    }

    fn get_at(&self, owner: Id<UserMarker>, now: Instant) -> Option<Vec<String>> {
        let entry = self.entries.get(&owner)?;

        if now.duration_since(entry.inserted_at) >= self.ttl {
            drop(entry);
            self.entries
                .remove_if(&owner, |_, entry| {
                    now.duration_since(entry.inserted_at) >= self.ttl
                });
            return None;
        }

        Some(entry.texts.clone())
    }

    pub fn put(&self, owner: Id<UserMarker>, texts: Vec<String>) {
        self.put_at(owner, texts, Instant::now());
    }

    fn put_at(&self, owner: Id<UserMarker>, texts: Vec<String>, now: Instant) {
        if !self.entries.contains_key(&owner) && self.entries.len() >= self.capacity {
            self.evict_least_recently_inserted();
        }

        self.entries.insert(
            owner,
            CacheEntry {
                texts,
                inserted_at: now,
            },
        );
    }

    pub fn invalidate(&self, owner: Id<UserMarker>) {
        self.entries.remove(&owner);
    }

    fn evict_least_recently_inserted(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| *entry.key());

        if let Some(owner) = oldest {
            self.entries.remove(&owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::cache::PostCache;
    use pinnwand_common::model::{Id, user::UserMarker};
    use std::time::{Duration, Instant};

    const TTL: Duration = Duration::from_secs(300);

    fn owner(id: i64) -> Id<UserMarker> {
        Id::new(id)
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|&value| value.to_owned()).collect()
    }

    #[test]
    fn hit_within_ttl_returns_stored_value() {
        let cache = PostCache::new(100, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["hello", "world"]), now);

        assert_eq!(
            cache.get_at(owner(1), now + TTL - Duration::from_secs(1)),
            Some(texts(&["hello", "world"]))
        );
    }

    #[test]
    fn unknown_owner_misses() {
        let cache = PostCache::new(100, TTL);

        assert_eq!(cache.get_at(owner(1), Instant::now()), None);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = PostCache::new(100, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["hello"]), now);

        assert_eq!(cache.get_at(owner(1), now + TTL), None);
        // The expired entry is dropped, not just hidden.
        assert_eq!(cache.get_at(owner(1), now), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = PostCache::new(100, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["hello"]), now);
        cache.invalidate(owner(1));

        assert_eq!(cache.get_at(owner(1), now), None);
    }

    #[test]
    fn invalidate_only_touches_the_given_owner() {
        let cache = PostCache::new(100, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["one"]), now);
        cache.put_at(owner(2), texts(&["two"]), now);
        cache.invalidate(owner(1));

        assert_eq!(cache.get_at(owner(2), now), Some(texts(&["two"])));
    }

    #[test]
    fn overflow_evicts_least_recently_inserted() {
        let cache = PostCache::new(2, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["one"]), now);
        cache.put_at(owner(2), texts(&["two"]), now + Duration::from_secs(1));
        cache.put_at(owner(3), texts(&["three"]), now + Duration::from_secs(2));

        assert_eq!(cache.get_at(owner(1), now + Duration::from_secs(3)), None);
        assert!(cache.get_at(owner(2), now + Duration::from_secs(3)).is_some());
        assert!(cache.get_at(owner(3), now + Duration::from_secs(3)).is_some());
    }

    #[test]
    fn zero_capacity_is_clamped_to_one_entry() {
        let cache = PostCache::new(0, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["one"]), now);
        cache.put_at(owner(2), texts(&["two"]), now + Duration::from_secs(1));

        assert_eq!(cache.get_at(owner(1), now + Duration::from_secs(2)), None);
        assert_eq!(
            cache.get_at(owner(2), now + Duration::from_secs(2)),
            Some(texts(&["two"]))
        );
    }

    #[test]
    fn reinsert_for_existing_owner_does_not_evict_others() {
        let cache = PostCache::new(2, TTL);
        let now = Instant::now();

        cache.put_at(owner(1), texts(&["one"]), now);
        cache.put_at(owner(2), texts(&["two"]), now + Duration::from_secs(1));
        cache.put_at(owner(1), texts(&["one again"]), now + Duration::from_secs(2));

        assert_eq!(
            cache.get_at(owner(1), now + Duration::from_secs(3)),
            Some(texts(&["one again"]))
        );
        assert_eq!(
            cache.get_at(owner(2), now + Duration::from_secs(3)),
            Some(texts(&["two"]))
        );
    }
}
