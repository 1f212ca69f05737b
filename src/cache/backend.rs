//! In-memory entry store with TTL expiry and access-weighted LRU eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

struct CacheEntry {
    value: String,
    /// `None` when the TTL reaches past what the clock can represent.
    expires_at: Option<Instant>,
    aux_hash: Option<String>,
    created_at: Instant,
    /// Nanoseconds since the store epoch; atomic so hits can run under the read lock.
    last_accessed: AtomicU64,
    access_count: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Point-in-time view of one entry's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
    pub last_accessed: Instant,
    pub access_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLookup {
    Hit(String),
    Absent,
    /// Entry was past its expiry and has been removed.
    Expired,
    AuxiliaryMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted {
        expired: usize,
        lru_evicted: Option<String>,
    },
    Replaced,
    Full {
        size: usize,
    },
}

pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    epoch: Instant,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            epoch: Instant::now(),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamp(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_nanos() as u64
    }

    fn visit(&self, entry: &CacheEntry, aux_hash: Option<&str>, now: Instant) -> StoreLookup {
        if let Some(expected) = aux_hash {
            if entry.aux_hash.as_deref() != Some(expected) {
                return StoreLookup::AuxiliaryMismatch;
            }
        }
        entry.last_accessed.store(self.stamp(now), Ordering::Relaxed);
        entry.access_count.fetch_add(1, Ordering::Relaxed);
        StoreLookup::Hit(entry.value.clone())
    }

    /// Look up `key`. `aux_hash` is checked against the stored auxiliary hash
    /// only when supplied.
    pub fn lookup(&self, key: &str, aux_hash: Option<&str>, now: Instant) -> StoreLookup {
        {
            let entries = self.read();
            match entries.get(key) {
                None => return StoreLookup::Absent,
                Some(entry) if !entry.is_expired(now) => return self.visit(entry, aux_hash, now),
                Some(_) => {}
            }
        }

        // Expired under the read lock; re-check under the write lock since a
        // concurrent writer may have replaced or removed it.
        let mut entries = self.write();
        match entries.get(key) {
            None => StoreLookup::Absent,
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                StoreLookup::Expired
            }
            Some(entry) => self.visit(entry, aux_hash, now),
        }
    }

    /// Insert or replace `key`.
    ///
    /// A new key arriving at capacity escalates: purge expired entries, then
    /// evict one entry by access weight, then give up with `Full`.
    pub fn insert(
        &self,
        key: &str,
        value: String,
        aux_hash: Option<String>,
        ttl: Duration,
        now: Instant,
    ) -> InsertOutcome {
        let mut entries = self.write();
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl),
            aux_hash,
            created_at: now,
            last_accessed: AtomicU64::new(self.stamp(now)),
            access_count: AtomicU64::new(0),
        };

        if let Some(existing) = entries.get_mut(key) {
            *existing = entry;
            return InsertOutcome::Replaced;
        }

        let mut expired = 0;
        let mut lru_evicted = None;
        if entries.len() >= self.max_entries {
            expired = Self::purge_locked(&mut entries, now);
            if entries.len() >= self.max_entries {
                lru_evicted = Self::evict_lru_locked(&mut entries);
            }
            if entries.len() >= self.max_entries {
                return InsertOutcome::Full {
                    size: entries.len(),
                };
            }
        }

        entries.insert(key.to_string(), entry);
        InsertOutcome::Inserted {
            expired,
            lru_evicted,
        }
    }

    fn purge_locked(entries: &mut HashMap<String, CacheEntry>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Fewest accesses first; ties go to the least recently accessed.
    fn evict_lru_locked(entries: &mut HashMap<String, CacheEntry>) -> Option<String> {
        let victim = entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                let a_count = a.access_count.load(Ordering::Relaxed);
                let b_count = b.access_count.load(Ordering::Relaxed);
                a_count.cmp(&b_count).then_with(|| {
                    a.last_accessed
                        .load(Ordering::Relaxed)
                        .cmp(&b.last_accessed.load(Ordering::Relaxed))
                })
            })
            .map(|(k, _)| k.clone())?;
        entries.remove(&victim);
        Some(victim)
    }

    /// Remove every entry whose expiry has passed. Returns the number removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        Self::purge_locked(&mut self.write(), now)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Drop all entries, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.write();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry_meta(&self, key: &str) -> Option<EntryMeta> {
        let entries = self.read();
        let e = entries.get(key)?;
        Some(EntryMeta {
            created_at: e.created_at,
            expires_at: e.expires_at,
            last_accessed: self.epoch
                + Duration::from_nanos(e.last_accessed.load(Ordering::Relaxed)),
            access_count: e.access_count.load(Ordering::Relaxed),
        })
    }
}
