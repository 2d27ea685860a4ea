use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use anchor_client::solana_sdk::pubkey::Pubkey;
use lazy_static::lazy_static;

use crate::dex::PoolDescriptor;

/// TTL cache entry that stores a value with an expiration time
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Venue-migration status cache, keyed by mint.
///
/// Only successful resolutions are inserted; a failed probe is never cached
/// so the next call re-checks. Expired entries are dropped on read.
pub struct MigrationCache {
    entries: RwLock<HashMap<Pubkey, CacheEntry<bool>>>,
    default_ttl: Duration,
}

impl MigrationCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn get(&self, mint: &Pubkey) -> Option<bool> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(mint) {
                Some(entry) if !entry.is_expired() => return Some(entry.value),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().unwrap().remove(mint);
        None
    }

    pub fn insert(&self, mint: Pubkey, migrated: bool, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write().unwrap();
        entries.insert(mint, CacheEntry::new(migrated, ttl));
    }

    pub fn invalidate(&self, mint: &Pubkey) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(mint);
    }

    pub fn clear_expired(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn size(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.len()
    }
}

/// Pool descriptor cache, keyed by mint. Same shape as [`MigrationCache`];
/// entries are replaced on expiry or invalidated after a failed swap.
pub struct PoolDescriptorCache {
    entries: RwLock<HashMap<Pubkey, CacheEntry<PoolDescriptor>>>,
    default_ttl: Duration,
}

impl PoolDescriptorCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn get(&self, mint: &Pubkey) -> Option<PoolDescriptor> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(mint) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().unwrap().remove(mint);
        None
    }

    pub fn insert(&self, mint: Pubkey, pool: PoolDescriptor, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write().unwrap();
        entries.insert(mint, CacheEntry::new(pool, ttl));
    }

    pub fn invalidate(&self, mint: &Pubkey) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(mint);
    }

    pub fn clear_expired(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn size(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.len()
    }
}

// Global cache instances. Both venues keep state for 5 minutes; a mint that
// migrates mid-session is picked up after expiry or explicit invalidation.
lazy_static! {
    pub static ref MIGRATION_CACHE: MigrationCache =
        MigrationCache::new(Duration::from_secs(300));
    pub static ref POOL_CACHE: PoolDescriptorCache =
        PoolDescriptorCache::new(Duration::from_secs(300));
}
