// crates/trunkline-store/src/memory.rs
// ============================================================================
// Module: In-Memory Coordination Store
// Description: Mutex-guarded reference backend with lazy TTL eviction.
// Purpose: Back tests and single-node deployments without external infra.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! The in-memory backend keeps every key behind one mutex, which makes each
//! trait method trivially atomic. Expiry is lazy: a key past its deadline is
//! treated as absent (and removed) by whichever operation touches it next.
//! Poisoned guards are recovered so one panicking worker cannot take the
//! store down with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::store::CoordinationStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Value shapes a key can hold.
#[derive(Debug, Clone)]
enum StoreValue {
    /// Plain text value (also used for locks, the owner being the text).
    Text(String),
    /// Monotonic counter.
    Counter(u64),
    /// Score-ordered members; insertion keeps (score, member) sorted.
    SortedSet(Vec<(i64, String)>),
}

impl StoreValue {
    /// Returns a stable shape label for error messages.
    const fn shape(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Counter(_) => "counter",
            Self::SortedSet(_) => "sorted_set",
        }
    }
}

/// One stored key with its optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    /// Held value.
    value: StoreValue,
    /// Lazy-evicted expiry deadline.
    expires_at: Option<Instant>,
}

impl Entry {
    /// Returns true when the entry is past its deadline.
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Mutex-guarded in-memory coordination store.
///
/// # Invariants
/// - Every trait method is atomic under the single guard.
/// - Expired keys behave exactly like absent keys.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    /// Guarded key space.
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the key space, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a live (non-expired) entry, evicting it when stale.
    fn live_entry<'guard>(
        guard: &'guard mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'guard mut Entry> {
        if guard.get(key).is_some_and(|entry| entry.is_expired(now)) {
            guard.remove(key);
            return None;
        }
        guard.get_mut(key)
    }

    /// Converts a TTL into an absolute deadline.
    fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| now + ttl)
    }

    /// Number of live keys, for diagnostics and tests.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.lock();
        guard.values().filter(|entry| !entry.is_expired(now)).count()
    }

    /// Returns true when no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoordinationStore for InMemoryCoordinationStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let Some(entry) = Self::live_entry(&mut guard, key, now) else {
            return Ok(None);
        };
        match &entry.value {
            StoreValue::Text(text) => Ok(Some(text.clone())),
            other => Err(StoreError::WrongShape {
                key: key.to_string(),
                expected: "text",
                found: other.shape(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        guard.insert(
            key.to_string(),
            Entry {
                value: StoreValue::Text(value.to_string()),
                expires_at: Self::deadline(now, ttl),
            },
        );
        Ok(())
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        if Self::live_entry(&mut guard, key, now).is_some() {
            return Ok(false);
        }
        guard.insert(
            key.to_string(),
            Entry {
                value: StoreValue::Text(value.to_string()),
                expires_at: Self::deadline(now, ttl),
            },
        );
        Ok(true)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let current = match Self::live_entry(&mut guard, key, now) {
            Some(entry) => match &entry.value {
                StoreValue::Text(text) => Some(text.clone()),
                other => {
                    return Err(StoreError::WrongShape {
                        key: key.to_string(),
                        expected: "text",
                        found: other.shape(),
                    });
                }
            },
            None => None,
        };
        if current.as_deref() != expected {
            return Ok(false);
        }
        guard.insert(
            key.to_string(),
            Entry {
                value: StoreValue::Text(value.to_string()),
                expires_at: Self::deadline(now, ttl),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let existed = Self::live_entry(&mut guard, key, now).is_some();
        guard.remove(key);
        Ok(existed)
    }

    fn fetch_increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        match Self::live_entry(&mut guard, key, now) {
            Some(entry) => match &mut entry.value {
                StoreValue::Counter(count) => {
                    let previous = *count;
                    *count = count.saturating_add(1);
                    entry.expires_at = Self::deadline(now, ttl);
                    Ok(previous)
                }
                other => Err(StoreError::WrongShape {
                    key: key.to_string(),
                    expected: "counter",
                    found: other.shape(),
                }),
            },
            None => {
                guard.insert(
                    key.to_string(),
                    Entry {
                        value: StoreValue::Counter(1),
                        expires_at: Self::deadline(now, ttl),
                    },
                );
                Ok(0)
            }
        }
    }

    fn sorted_insert(
        &self,
        key: &str,
        score: i64,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        match Self::live_entry(&mut guard, key, now) {
            Some(entry) => match &mut entry.value {
                StoreValue::SortedSet(members) => {
                    let position = members
                        .partition_point(|(existing, _)| *existing <= score);
                    members.insert(position, (score, member.to_string()));
                    entry.expires_at = Self::deadline(now, ttl);
                    Ok(())
                }
                other => Err(StoreError::WrongShape {
                    key: key.to_string(),
                    expected: "sorted_set",
                    found: other.shape(),
                }),
            },
            None => {
                guard.insert(
                    key.to_string(),
                    Entry {
                        value: StoreValue::SortedSet(vec![(score, member.to_string())]),
                        expires_at: Self::deadline(now, ttl),
                    },
                );
                Ok(())
            }
        }
    }

    fn prune_scores_below(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let Some(entry) = Self::live_entry(&mut guard, key, now) else {
            return Ok(0);
        };
        match &mut entry.value {
            StoreValue::SortedSet(members) => {
                let before = members.len();
                members.retain(|(score, _)| *score >= min_score);
                Ok(u64::try_from(before - members.len()).unwrap_or(u64::MAX))
            }
            other => Err(StoreError::WrongShape {
                key: key.to_string(),
                expected: "sorted_set",
                found: other.shape(),
            }),
        }
    }

    fn count_scores_at_least(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let Some(entry) = Self::live_entry(&mut guard, key, now) else {
            return Ok(0);
        };
        match &entry.value {
            StoreValue::SortedSet(members) => {
                let count = members.iter().filter(|(score, _)| *score >= min_score).count();
                Ok(u64::try_from(count).unwrap_or(u64::MAX))
            }
            other => Err(StoreError::WrongShape {
                key: key.to_string(),
                expected: "sorted_set",
                found: other.shape(),
            }),
        }
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        if let Some(entry) = Self::live_entry(&mut guard, key, now) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    fn acquire_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        match Self::live_entry(&mut guard, key, now) {
            Some(entry) => match &entry.value {
                StoreValue::Text(holder) if holder == owner => {
                    entry.expires_at = Some(now + ttl);
                    Ok(true)
                }
                StoreValue::Text(_) => Ok(false),
                other => Err(StoreError::WrongShape {
                    key: key.to_string(),
                    expected: "text",
                    found: other.shape(),
                }),
            },
            None => {
                guard.insert(
                    key.to_string(),
                    Entry {
                        value: StoreValue::Text(owner.to_string()),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(true)
            }
        }
    }

    fn release_lock(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock();
        let Some(entry) = Self::live_entry(&mut guard, key, now) else {
            return Ok(false);
        };
        let held_by_owner = matches!(&entry.value, StoreValue::Text(holder) if holder == owner);
        if held_by_owner {
            guard.remove(key);
            Ok(true)
        } else {
            // Non-owner release: leave the lock to expire on its own.
            Ok(false)
        }
    }
}
