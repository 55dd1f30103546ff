//! In-process result caches with pluggable eviction policies.
//!
//! Unlike most of the surrounding stack, these caches are synchronous: they
//! sit in front of a storage backend during a single dispatcher tick, not
//! behind an async network call, so there is nothing here worth an await
//! point over.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, SelinonError};

/// Key a cache entry by. Resolved once, at cache-construction time, from the
/// `(flow, task)` pair the entry's owning node identifies.
pub type CacheKey = String;

trait EvictionOrder: Send {
    /// Called whenever `key` is looked up or freshly inserted.
    fn touch(&mut self, key: &CacheKey);
    /// Called once, on insert, before `touch`.
    fn on_insert(&mut self, key: &CacheKey);
    fn evict(&mut self) -> Option<CacheKey>;
    fn remove(&mut self, key: &CacheKey);
}

#[derive(Default)]
struct Fifo {
    order: VecDeque<CacheKey>,
}
impl EvictionOrder for Fifo {
    fn touch(&mut self, _key: &CacheKey) {}
    fn on_insert(&mut self, key: &CacheKey) {
        self.order.push_back(key.clone());
    }
    fn evict(&mut self) -> Option<CacheKey> {
        self.order.pop_front()
    }
    fn remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }
}

#[derive(Default)]
struct Lifo {
    order: VecDeque<CacheKey>,
}
impl EvictionOrder for Lifo {
    fn touch(&mut self, _key: &CacheKey) {}
    fn on_insert(&mut self, key: &CacheKey) {
        self.order.push_back(key.clone());
    }
    fn evict(&mut self) -> Option<CacheKey> {
        self.order.pop_back()
    }
    fn remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }
}

/// Shared by LRU and MRU: a deque kept in recency order, most-recent at the
/// back. LRU evicts the front, MRU evicts the back.
#[derive(Default)]
struct Recency {
    order: VecDeque<CacheKey>,
    evict_front: bool,
}
impl EvictionOrder for Recency {
    fn touch(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.clone());
    }
    fn on_insert(&mut self, key: &CacheKey) {
        self.order.push_back(key.clone());
    }
    fn evict(&mut self) -> Option<CacheKey> {
        if self.evict_front {
            self.order.pop_front()
        } else {
            self.order.pop_back()
        }
    }
    fn remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }
}

struct Random {
    keys: Vec<CacheKey>,
    rng: rand::rngs::ThreadRng,
}
impl Default for Random {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            rng: rand::thread_rng(),
        }
    }
}
impl EvictionOrder for Random {
    fn touch(&mut self, _key: &CacheKey) {}
    fn on_insert(&mut self, key: &CacheKey) {
        self.keys.push(key.clone());
    }
    fn evict(&mut self) -> Option<CacheKey> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = rand::Rng::gen_range(&mut self.rng, 0..self.keys.len());
        Some(self.keys.remove(idx))
    }
    fn remove(&mut self, key: &CacheKey) {
        self.keys.retain(|k| k != key);
    }
}

/// The five eviction policies a `cache_config` can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    Fifo,
    Lifo,
    Lru,
    Mru,
    Random,
}

impl std::str::FromStr for EvictionPolicy {
    type Err = SelinonError;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "fifo" => EvictionPolicy::Fifo,
            "lifo" => EvictionPolicy::Lifo,
            "lru" => EvictionPolicy::Lru,
            "mru" => EvictionPolicy::Mru,
            "rr" | "random" => EvictionPolicy::Random,
            other => {
                return Err(SelinonError::Configuration(format!(
                    "unknown cache eviction policy '{other}'"
                )))
            }
        })
    }
}

fn make_order(policy: EvictionPolicy) -> Box<dyn EvictionOrder> {
    match policy {
        EvictionPolicy::Fifo => Box::<Fifo>::default(),
        EvictionPolicy::Lifo => Box::<Lifo>::default(),
        EvictionPolicy::Lru => Box::new(Recency {
            order: VecDeque::new(),
            evict_front: true,
        }),
        EvictionPolicy::Mru => Box::new(Recency {
            order: VecDeque::new(),
            evict_front: false,
        }),
        EvictionPolicy::Random => Box::<Random>::default(),
    }
}

/// A bounded, synchronous cache over `serde_json::Value` results. `capacity`
/// of `0` disables eviction entirely — the cache just grows (used for caches
/// the config marks unbounded).
pub struct Cache {
    capacity: usize,
    policy: EvictionPolicy,
    entries: HashMap<CacheKey, serde_json::Value>,
    order: Box<dyn EvictionOrder>,
}

impl Cache {
    pub fn new(policy: EvictionPolicy, capacity: usize) -> Self {
        Self {
            capacity,
            policy,
            entries: HashMap::new(),
            order: make_order(policy),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or overwrites `key`. If this pushes the cache past `capacity`,
    /// evicts according to the configured policy first. A size-0 cache is a
    /// permanent no-op: nothing is ever stored, so every `get` misses.
    pub fn add(&mut self, key: impl Into<CacheKey>, value: serde_json::Value) {
        if self.capacity == 0 {
            return;
        }
        let key = key.into();
        if self.entries.contains_key(&key) {
            self.entries.insert(key.clone(), value);
            self.order.touch(&key);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.evict() {
                self.entries.remove(&evicted);
            }
        }
        self.order.on_insert(&key);
        self.entries.insert(key, value);
    }

    /// Returns the cached value for `key`, if present, updating recency for
    /// LRU/MRU policies. A miss is a normal, expected outcome — callers fall
    /// back to the storage backend.
    pub fn get(&mut self, key: &str) -> Option<&serde_json::Value> {
        if self.entries.contains_key(key) {
            self.order.touch(&key.to_string());
            self.entries.get(key)
        } else {
            None
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.remove(&key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_evicts_oldest_insert() {
        let mut c = Cache::new(EvictionPolicy::Fifo, 2);
        c.add("a", serde_json::json!(1));
        c.add("b", serde_json::json!(2));
        c.add("c", serde_json::json!(3));
        assert!(c.get("a").is_none());
        assert!(c.get("b").is_some());
        assert!(c.get("c").is_some());
    }

    #[test]
    fn lifo_evicts_newest_insert() {
        let mut c = Cache::new(EvictionPolicy::Lifo, 2);
        c.add("a", serde_json::json!(1));
        c.add("b", serde_json::json!(2));
        c.add("c", serde_json::json!(3));
        assert!(c.get("a").is_some());
        assert!(c.get("b").is_none());
        assert!(c.get("c").is_some());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut c = Cache::new(EvictionPolicy::Lru, 2);
        c.add("a", serde_json::json!(1));
        c.add("b", serde_json::json!(2));
        c.get("a"); // touch a, so b is now least-recently-used
        c.add("c", serde_json::json!(3));
        assert!(c.get("a").is_some());
        assert!(c.get("b").is_none());
        assert!(c.get("c").is_some());
    }

    #[test]
    fn mru_evicts_most_recently_used() {
        let mut c = Cache::new(EvictionPolicy::Mru, 2);
        c.add("a", serde_json::json!(1));
        c.add("b", serde_json::json!(2));
        c.get("b"); // touch b, so b is now most-recently-used
        c.add("c", serde_json::json!(3));
        assert!(c.get("a").is_some());
        assert!(c.get("b").is_none());
        assert!(c.get("c").is_some());
    }

    #[test]
    fn zero_capacity_cache_is_a_permanent_no_op() {
        let mut c = Cache::new(EvictionPolicy::Fifo, 0);
        for i in 0..100 {
            c.add(format!("k{i}"), serde_json::json!(i));
        }
        assert_eq!(c.len(), 0);
        assert!(c.get("k0").is_none());
    }

    #[test]
    fn policy_parses_from_str() {
        use std::str::FromStr;
        assert_eq!(EvictionPolicy::from_str("lru").unwrap(), EvictionPolicy::Lru);
        assert!(EvictionPolicy::from_str("bogus").is_err());
    }
}
