//! Hierarchy Cache: read-through cache over the Organization Store, keyed by
//! organization id, holding the resolved subtree and the tenants reachable
//! from a node.
//!
//! Reads hit an immutable snapshot per key; a miss recomputes under a per-key
//! gate so concurrent readers of the same key collapse into one store query
//! while different keys proceed independently. Mutations invalidate the
//! affected key explicitly; the TTL is the backstop for anything missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::organization::OrganizationNode;

use super::store::HierarchySource;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let ttl = std::env::var("HIERARCHY_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TTL_SECS);
        let sweep = std::env::var("HIERARCHY_CACHE_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_SECS);

        Self {
            ttl: Duration::from_secs(ttl),
            sweep_interval: Duration::from_secs(sweep),
        }
    }
}

struct Entry<T> {
    value: Arc<T>,
    cached_at: Instant,
}

impl<T> Entry<T> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Keyspace {
    Subtree,
    Tenants,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub recomputes: u64,
    pub evictions: u64,
}

pub struct HierarchyCache {
    source: Arc<dyn HierarchySource>,
    ttl: Duration,
    subtrees: DashMap<Uuid, Entry<Vec<OrganizationNode>>>,
    tenants: DashMap<Uuid, Entry<Vec<Uuid>>>,
    // One gate per (keyspace, org); persists for the life of the cache so the
    // gate set stays bounded by the organization count.
    inflight: DashMap<(Keyspace, Uuid), Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    recomputes: AtomicU64,
    evictions: AtomicU64,
}

impl HierarchyCache {
    pub fn new(source: Arc<dyn HierarchySource>, config: CacheConfig) -> Self {
        Self {
            source,
            ttl: config.ttl,
            subtrees: DashMap::new(),
            tenants: DashMap::new(),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recomputes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Resolved subtree (root included) for an organization.
    pub async fn get_subtree(&self, root_id: Uuid) -> AppResult<Arc<Vec<OrganizationNode>>> {
        {
            if let Some(entry) = self.subtrees.get(&root_id) {
                if entry.is_fresh(self.ttl) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value.clone());
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let gate = self.gate(Keyspace::Subtree, root_id);
        let _guard = gate.lock().await;

        // Another flight may have repopulated while we queued on the gate.
        {
            if let Some(entry) = self.subtrees.get(&root_id) {
                if entry.is_fresh(self.ttl) {
                    return Ok(entry.value.clone());
                }
            }
        }

        self.recomputes.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(self.source.load_subtree(root_id).await?);
        self.subtrees.insert(
            root_id,
            Entry {
                value: value.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Tenants reachable from an organization (its links plus its subtree's).
    pub async fn get_accessible_tenants(&self, org_id: Uuid) -> AppResult<Arc<Vec<Uuid>>> {
        {
            if let Some(entry) = self.tenants.get(&org_id) {
                if entry.is_fresh(self.ttl) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value.clone());
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let gate = self.gate(Keyspace::Tenants, org_id);
        let _guard = gate.lock().await;

        {
            if let Some(entry) = self.tenants.get(&org_id) {
                if entry.is_fresh(self.ttl) {
                    return Ok(entry.value.clone());
                }
            }
        }

        self.recomputes.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(self.source.load_accessible_tenants(org_id).await?);
        self.tenants.insert(
            org_id,
            Entry {
                value: value.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Drop both keyspaces for an organization. Ancestors and descendants are
    /// not touched; the TTL bounds their staleness.
    pub fn invalidate(&self, org_id: Uuid) {
        if self.subtrees.remove(&org_id).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        if self.tenants.remove(&org_id).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(organization_id = %org_id, "hierarchy cache invalidated");
    }

    pub fn invalidate_many(&self, org_ids: impl IntoIterator<Item = Uuid>) {
        for org_id in org_ids {
            self.invalidate(org_id);
        }
    }

    /// Discard expired entries. Never blocks readers beyond shard locking.
    pub fn sweep_expired(&self) -> u64 {
        let before = self.subtrees.len() + self.tenants.len();
        let ttl = self.ttl;
        self.subtrees.retain(|_, entry| entry.is_fresh(ttl));
        self.tenants.retain(|_, entry| entry.is_fresh(ttl));
        let after = self.subtrees.len() + self.tenants.len();
        let evicted = before.saturating_sub(after) as u64;
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        evicted
    }

    /// Background expiry sweep; dies with the cache.
    pub fn spawn_ttl_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let evicted = cache.sweep_expired();
                if evicted > 0 {
                    let stats = cache.stats();
                    tracing::debug!(
                        evicted,
                        hits = stats.hits,
                        misses = stats.misses,
                        "hierarchy cache sweep"
                    );
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn gate(&self, keyspace: Keyspace, org_id: Uuid) -> Arc<Mutex<()>> {
        let entry = self.inflight.entry((keyspace, org_id)).or_default();
        entry.clone()
    }
}
