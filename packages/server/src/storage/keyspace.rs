//! In-memory keyspace backed by [`DashMap`].
//!
//! Maps each key to a value and an optional expiry instant. Reads are
//! lock-free against the sharded map and may run concurrently with
//! writes; mutating operations are additionally serialized by the
//! owning partition's lock, so the map's internal sharding only has to
//! keep readers consistent.
//!
//! Expiry is lazy on read (`get`/`ttl` delete entries they find
//! expired) and periodic via the partition's garbage collector, which
//! sweeps [`Keyspace::expired_keys`].

use std::sync::Arc;

use dashmap::DashMap;

use creek_core::{Clock, TTL_MISSING, TTL_NO_EXPIRY};

use crate::error::StoreError;

/// A stored value with an optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The value bytes. Whitespace-free by router contract.
    pub value: String,
    /// Unix seconds at which the entry expires; `None` means no expiry.
    pub expires_at: Option<i64>,
}

/// The key-to-entry mapping of one partition.
pub struct Keyspace {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Keyspace {
    /// Creates an empty keyspace driven by the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Inserts or replaces a key.
    ///
    /// `ttl_seconds <= 0` means no expiry; otherwise the entry expires
    /// `ttl_seconds` from now.
    pub fn set(&self, key: &str, value: &str, ttl_seconds: i64) {
        let expires_at = (ttl_seconds > 0).then(|| self.clock.unix_secs() + ttl_seconds);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Retrieves the value for a key, deleting it if it has expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an absent key and
    /// [`StoreError::Expired`] for a key whose expiry has passed
    /// (the entry is removed as a side effect).
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        let now = self.clock.unix_secs();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), is_expired(&entry, now)));

        match lookup {
            None => Err(StoreError::NotFound),
            Some((_, true)) => {
                // The read guard is dropped; removing here cannot deadlock
                // against the shard we just released.
                self.entries.remove_if(key, |_, entry| is_expired(entry, now));
                Err(StoreError::Expired)
            }
            Some((value, false)) => Ok(value),
        }
    }

    /// Removes a key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Replaces the expiry of an existing key.
    ///
    /// A missing key is a no-op: the recovered-state and follower apply
    /// paths routinely expire keys that no longer exist. A
    /// `ttl_seconds <= 0` puts the expiry in the past, so the entry
    /// dies on the next read or GC sweep.
    pub fn expire(&self, key: &str, ttl_seconds: i64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(self.clock.unix_secs() + ttl_seconds);
        }
    }

    /// Remaining lifetime of a key in whole seconds.
    ///
    /// Returns [`TTL_NO_EXPIRY`] (−1) for a key with no expiry and
    /// [`TTL_MISSING`] (−2) for a missing or expired key; an expired
    /// entry is removed as a side effect.
    pub fn ttl(&self, key: &str) -> i64 {
        let now = self.clock.unix_secs();
        let remaining = match self.entries.get(key) {
            None => return TTL_MISSING,
            Some(entry) => match entry.expires_at {
                None => return TTL_NO_EXPIRY,
                Some(expires_at) => expires_at - now,
            },
        };

        if remaining <= 0 {
            self.entries.remove_if(key, |_, entry| is_expired(entry, now));
            TTL_MISSING
        } else {
            remaining
        }
    }

    /// Keys whose expiry has passed, for the GC sweep.
    #[must_use]
    pub fn expired_keys(&self) -> Vec<String> {
        let now = self.clock.unix_secs();
        self.entries
            .iter()
            .filter(|entry| is_expired(entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Removes every expired entry directly, bypassing the log.
    ///
    /// Follower partitions never call this; their deletions arrive as
    /// replicated `DELETE`s from the leader's GC.
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.unix_secs();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !is_expired(entry, now));
        before - self.entries.len()
    }

    /// Number of live-or-expired entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the keyspace holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_expired(entry: &Entry, now: i64) -> bool {
    entry.expires_at.is_some_and(|expires_at| expires_at <= now)
}
