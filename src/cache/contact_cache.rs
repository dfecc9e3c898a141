//! Contact cache — TTL- and size-bounded snapshots for single-contact lookups.
//!
//! Entries live in a `KeyValueStore` namespace owned by one user, stored as a
//! JSON list ordered most-recent-first. The cache is eventually consistent
//! with the contact store: writers remove entries, misses fall back to the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::contacts::{Contact, normalize_email};
use crate::error::{DatabaseError, EngineError};
use crate::sequence::SequenceEngine;
use crate::store::{ContactStore, KeyValueStore};

const ENTRIES_KEY: &str = "entries";

/// A stored snapshot plus its capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub contact: Contact,
    pub cached_at: DateTime<Utc>,
}

/// A cache hit, with readiness derived at read time.
#[derive(Debug, Clone, Serialize)]
pub struct CachedContact {
    #[serde(flatten)]
    pub contact: Contact,
    pub is_ready: bool,
    pub cached_at: DateTime<Utc>,
}

/// Per-user contact snapshot cache.
pub struct ContactCache {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl: chrono::Duration,
    capacity: usize,
    engine: SequenceEngine,
    clock: Arc<dyn Clock>,
}

impl ContactCache {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        user_id: &str,
        config: &CacheConfig,
        engine: SequenceEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kv,
            namespace: format!("contact_cache:{user_id}"),
            ttl: to_chrono(config.ttl),
            capacity: config.capacity.max(1),
            engine,
            clock,
        }
    }

    /// Look up a contact by email. Expired entries count as absent.
    pub async fn get(&self, email: &str) -> Result<Option<CachedContact>, DatabaseError> {
        let key = normalize_email(email);
        let now = self.clock.now();
        let entries = self.load().await?;
        let before = entries.len();
        let fresh: Vec<CacheEntry> = entries
            .into_iter()
            .filter(|e| !self.is_expired(e, now))
            .collect();

        if fresh.len() != before {
            debug!(pruned = before - fresh.len(), "Pruned expired cache entries");
            self.save(&fresh).await?;
        }

        Ok(fresh
            .into_iter()
            .find(|e| e.contact.email == key)
            .map(|e| CachedContact {
                is_ready: self.engine.is_ready(&e.contact, now),
                contact: e.contact,
                cached_at: e.cached_at,
            }))
    }

    /// Insert or replace the snapshot for `contact`, moving it to the front.
    pub async fn put(&self, contact: &Contact) -> Result<(), DatabaseError> {
        self.put_many(std::slice::from_ref(contact)).await
    }

    /// Insert several snapshots; the first element ends up most recent.
    ///
    /// Snapshots are keyed by normalized email, so a later duplicate in
    /// `contacts` is ignored.
    pub async fn put_many(&self, contacts: &[Contact]) -> Result<(), DatabaseError> {
        if contacts.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();

        let mut fresh: Vec<CacheEntry> = Vec::with_capacity(contacts.len());
        for c in contacts {
            let mut contact = c.clone();
            contact.email = normalize_email(&c.email);
            if fresh.iter().any(|e| e.contact.email == contact.email) {
                continue;
            }
            fresh.push(CacheEntry {
                contact,
                cached_at: now,
            });
        }

        let mut entries = self.load().await?;
        entries.retain(|e| {
            !self.is_expired(e, now) && !fresh.iter().any(|f| f.contact.email == e.contact.email)
        });
        fresh.extend(entries);
        fresh.truncate(self.capacity);
        self.save(&fresh).await
    }

    /// Drop the entry for `email`, if any.
    pub async fn remove(&self, email: &str) -> Result<(), DatabaseError> {
        let key = normalize_email(email);
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| e.contact.email != key);
        if entries.len() != before {
            self.save(&entries).await?;
            debug!(email = %key, "Cache entry invalidated");
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), DatabaseError> {
        self.kv.delete(&self.namespace, ENTRIES_KEY).await
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> Result<usize, DatabaseError> {
        let now = self.clock.now();
        Ok(self
            .load()
            .await?
            .iter()
            .filter(|e| !self.is_expired(e, now))
            .count())
    }

    /// Warm the cache with the `limit` most recently added store rows.
    pub async fn prefetch(
        &self,
        store: &dyn ContactStore,
        limit: usize,
    ) -> Result<usize, EngineError> {
        let limit = limit.min(self.capacity);
        if limit == 0 {
            return Ok(0);
        }
        let recent = store.read_recent(limit).await?;
        self.put_many(&recent).await?;
        debug!(count = recent.len(), "Contact cache prefetched");
        Ok(recent.len())
    }

    /// Cache-first lookup: on a miss, read the store and fill the cache.
    pub async fn lookup(
        &self,
        store: &dyn ContactStore,
        email: &str,
    ) -> Result<Option<CachedContact>, EngineError> {
        match self.get(email).await {
            Ok(Some(hit)) => return Ok(Some(hit)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Contact cache read failed, falling back to store"),
        }

        let Some(contact) = store.find_by_email(email).await? else {
            return Ok(None);
        };

        if let Err(e) = self.put(&contact).await {
            warn!(email = %contact.email, error = %e, "Failed to fill contact cache");
        }

        let now = self.clock.now();
        Ok(Some(CachedContact {
            is_ready: self.engine.is_ready(&contact, now),
            contact,
            cached_at: now,
        }))
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.cached_at) >= self.ttl
    }

    async fn load(&self) -> Result<Vec<CacheEntry>, DatabaseError> {
        let Some(raw) = self.kv.get(&self.namespace, ENTRIES_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "Discarding unreadable contact cache");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, entries: &[CacheEntry]) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(entries)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.kv.set(&self.namespace, ENTRIES_KEY, &json).await
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::hours(2))
}
