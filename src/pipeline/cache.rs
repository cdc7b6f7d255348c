//! Fingerprint-keyed decision cache
//!
//! Entries expire after a fixed TTL and the oldest insertion is evicted once
//! the cache is over capacity. All operations are safe under concurrent
//! access from the worker pool.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::pipeline::fingerprint::{ContextFingerprint, DecisionRecord};

#[derive(Debug)]
struct Entry {
    record: DecisionRecord,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: AHashMap<ContextFingerprint, Entry>,
    /// Insertion order, oldest first
    order: VecDeque<ContextFingerprint>,
}

impl CacheInner {
    fn forget(&mut self, key: &ContextFingerprint) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

#[derive(Debug)]
pub struct DecisionCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Live record for `key`; an expired entry is dropped and reported as a miss
    pub fn get(&self, key: &ContextFingerprint) -> Option<DecisionRecord> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted.elapsed() >= self.ttl,
        };
        if expired {
            inner.forget(key);
            return None;
        }
        inner.entries.get(key).map(|e| e.record.clone())
    }

    /// Insert or refresh; returns the number of entries evicted to make room
    pub fn insert(&self, key: ContextFingerprint, record: DecisionRecord) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.entries.insert(
            key,
            Entry {
                record,
                inserted: Instant::now(),
            },
        );
        inner.order.push_back(key);

        let mut evicted = 0;
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.entries.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.inserted.elapsed() < ttl);
        let CacheInner { entries, order } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
        before - inner.entries.len()
    }

    pub fn contains(&self, key: &ContextFingerprint) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::CandidateAction;
    use crate::core::types::UnitId;
    use std::sync::Arc;

    fn key(unit: u32, hp: u32) -> ContextFingerprint {
        ContextFingerprint {
            unit: UnitId(unit),
            hp,
            mp: 0,
            action_points: 2,
            enemies_in_attack_range: 0,
            enemies_in_reach: 1,
            enemies_aware: 1,
        }
    }

    fn record(unit: u32) -> DecisionRecord {
        DecisionRecord::new(UnitId(unit), CandidateAction::wait("cached"), None, 1)
    }

    #[test]
    fn test_hit_returns_stored_record() {
        let cache = DecisionCache::new(8, Duration::from_secs(60));
        cache.insert(key(1, 50), record(1));
        assert_eq!(cache.get(&key(1, 50)).map(|r| r.unit), Some(UnitId(1)));
        assert!(cache.get(&key(1, 49)).is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = DecisionCache::new(8, Duration::from_millis(0));
        cache.insert(key(1, 50), record(1));
        assert!(cache.get(&key(1, 50)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oldest_insertion_is_evicted() {
        let cache = DecisionCache::new(2, Duration::from_secs(60));
        assert_eq!(cache.insert(key(1, 1), record(1)), 0);
        assert_eq!(cache.insert(key(1, 2), record(1)), 0);
        assert_eq!(cache.insert(key(1, 3), record(1)), 1);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1, 1)));
        assert!(cache.contains(&key(1, 3)));
    }

    #[test]
    fn test_refresh_moves_entry_to_back() {
        let cache = DecisionCache::new(2, Duration::from_secs(60));
        cache.insert(key(1, 1), record(1));
        cache.insert(key(1, 2), record(1));
        cache.insert(key(1, 1), record(1));
        cache.insert(key(1, 3), record(1));
        assert!(cache.contains(&key(1, 1)));
        assert!(!cache.contains(&key(1, 2)));
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = Arc::new(DecisionCache::new(16, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for hp in 0..50 {
                        cache.insert(key(t, hp), record(t));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
