//! Bounded cache of ready-to-show page instances with pluggable eviction.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::Page;

/// Policy governing which resident page is removed when capacity or
/// freshness constraints are exceeded.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EvictionStrategy {
    /// Remove the least recently accessed entry once over capacity.
    #[default]
    Lru,
    /// Expire entries older than the configured time-to-live. The capacity
    /// cap still applies, ranked by creation order.
    Ttl,
    /// Never evict; inserting into a full cache is refused.
    None,
}

impl EvictionStrategy {
    /// Returns the string representation of the strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Ttl => "ttl",
            EvictionStrategy::None => "none",
        }
    }

    /// Parses a strategy from a string (case-insensitive).
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "lru" => Some(EvictionStrategy::Lru),
            "ttl" => Some(EvictionStrategy::Ttl),
            "none" => Some(EvictionStrategy::None),
            _ => None,
        }
    }
}

/// Configuration options for the page cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch; a disabled cache refuses every insert.
    pub enabled: bool,
    /// Eviction policy applied by [`PageCache::evict_pages`] and the
    /// insert path.
    pub strategy: EvictionStrategy,
    /// Maximum number of resident pages.
    pub max_size: usize,
    /// Time-to-live for resident pages; read only under
    /// [`EvictionStrategy::Ttl`].
    pub ttl: Duration,
    /// Whether deadline-based cleanup passes run from the idle driver.
    pub auto_cleanup: bool,
    /// Minimum delay between two auto-cleanup passes.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    /// Creates a default config: LRU over ten pages with periodic cleanup.
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: EvictionStrategy::Lru,
            max_size: 10,
            ttl: Duration::from_secs(300),
            auto_cleanup: true,
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Creates an LRU config bounded to `max_size` pages.
    pub fn lru(max_size: usize) -> Self {
        Self {
            strategy: EvictionStrategy::Lru,
            max_size,
            ..Self::default()
        }
    }

    /// Creates a TTL config expiring pages older than `ttl`.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            strategy: EvictionStrategy::Ttl,
            ttl,
            ..Self::default()
        }
    }

    /// Creates a config that refuses every insert.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the maximum number of resident pages.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enables or disables deadline-based cleanup passes.
    pub fn auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = enabled;
        self
    }

    /// Sets the minimum delay between auto-cleanup passes.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Snapshot of cache occupancy and effectiveness counters.
#[derive(Clone, Debug, Serialize)]
pub struct CacheInfo {
    /// Whether the cache accepts inserts.
    pub enabled: bool,
    /// Number of resident pages.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Active eviction strategy.
    pub strategy: EvictionStrategy,
    /// Number of lookups that found a resident page.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// `hits / (hits + misses)`, `0.0` when no lookup has happened.
    pub hit_rate: f64,
    /// Number of pages removed by capacity pressure.
    pub evictions: u64,
    /// Number of pages removed by TTL expiry.
    pub expired: u64,
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}/{} strategy={} hits={} misses={} hit_rate={:.2} evictions={} expired={}",
            self.size,
            self.max_size,
            self.strategy.as_str(),
            self.hits,
            self.misses,
            self.hit_rate,
            self.evictions,
            self.expired
        )
    }
}

struct CacheEntry {
    page: Box<dyn Page>,
    created_at: Instant,
    created_seq: u64,
    last_access: Instant,
    touch_seq: u64,
    access_count: u64,
}

/// Bounded owner of ready-to-show page instances, keyed by page id.
///
/// The cache is the sole owner of resident pages: anything removed by
/// eviction, replacement, or [`PageCache::clear`] has its `destroy` hook
/// invoked before the instance is dropped. The single pinned id (the
/// active page) is exempt from every eviction pass.
///
/// LRU and creation-order ranking use monotonic sequence numbers rather
/// than raw timestamps so that two touches inside one clock tick still
/// order deterministically.
pub struct PageCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    pinned: Option<String>,
    seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
    next_cleanup: Option<Instant>,
}

impl PageCache {
    /// Creates an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let next_cleanup = config
            .auto_cleanup
            .then(|| Instant::now() + config.cleanup_interval);
        Self {
            config,
            entries: HashMap::new(),
            pinned: None,
            seq: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expired: 0,
            next_cleanup,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Stores a page, evicting per strategy if capacity requires it.
    ///
    /// Returns the page back as `Err` when it cannot be stored: the cache
    /// is disabled, or the cache is full and the strategy refuses to evict
    /// (`None`, or only the pinned entry remains). A same-id resident page
    /// is destroyed and replaced.
    pub fn put(
        &mut self,
        id: &str,
        page: Box<dyn Page>,
    ) -> std::result::Result<(), Box<dyn Page>> {
        if !self.config.enabled || self.config.max_size == 0 {
            return Err(page);
        }
        if let Some(old) = self.entries.remove(id) {
            debug!(page_id = %id, "cache.replace");
            Self::destroy_page(old.page);
        } else {
            if self.config.strategy == EvictionStrategy::Ttl {
                self.expire_entries();
            }
            if self.entries.len() >= self.config.max_size
                && self.config.strategy != EvictionStrategy::None
            {
                self.shrink_to(self.config.max_size.saturating_sub(1));
            }
            if self.entries.len() >= self.config.max_size {
                debug!(
                    page_id = %id,
                    strategy = self.config.strategy.as_str(),
                    "cache.put.rejected"
                );
                return Err(page);
            }
        }
        let now = Instant::now();
        self.seq += 1;
        self.entries.insert(
            id.to_owned(),
            CacheEntry {
                page,
                created_at: now,
                created_seq: self.seq,
                last_access: now,
                touch_seq: self.seq,
                access_count: 0,
            },
        );
        Ok(())
    }

    /// Looks up a resident page, refreshing its access metadata.
    ///
    /// A found page counts as a hit and becomes the most recently used
    /// entry; absence counts as a miss. Under the TTL strategy an expired
    /// entry is removed here and reported as a miss, so a stale page is
    /// never served even when no cleanup pass has run.
    pub fn get(&mut self, id: &str) -> Option<&mut dyn Page> {
        if self.config.strategy == EvictionStrategy::Ttl
            && self.pinned.as_deref() != Some(id)
            && self
                .entries
                .get(id)
                .is_some_and(|entry| entry.created_at.elapsed() > self.config.ttl)
        {
            self.remove_expired(id);
        }
        match self.entries.get_mut(id) {
            Some(entry) => {
                self.seq += 1;
                entry.last_access = Instant::now();
                entry.touch_seq = self.seq;
                entry.access_count += 1;
                self.hits += 1;
                Some(entry.page.as_mut())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Mutable access to a resident page without counting a lookup or
    /// refreshing recency. Lifecycle hooks go through here.
    pub fn peek(&mut self, id: &str) -> Option<&mut dyn Page> {
        self.entries
            .get_mut(id)
            .map(|entry| &mut *entry.page as &mut dyn Page)
    }

    /// Runs one strategy-specific eviction pass.
    ///
    /// LRU removes least-recently-used entries while over capacity; TTL
    /// removes every expired entry regardless of size and then enforces the
    /// capacity cap in creation order; `None` does nothing. The pinned id
    /// is never touched.
    pub fn evict_pages(&mut self) {
        match self.config.strategy {
            EvictionStrategy::Lru => self.shrink_to(self.config.max_size),
            EvictionStrategy::Ttl => {
                self.expire_entries();
                self.shrink_to(self.config.max_size);
            }
            EvictionStrategy::None => {}
        }
    }

    /// Runs [`PageCache::evict_pages`] when the auto-cleanup deadline has
    /// passed, returning how many pages were removed.
    pub fn maybe_cleanup(&mut self) -> usize {
        if !self.config.auto_cleanup {
            return 0;
        }
        let now = Instant::now();
        match self.next_cleanup {
            Some(deadline) if now < deadline => 0,
            _ => {
                let before = self.evictions + self.expired;
                self.evict_pages();
                self.next_cleanup = Some(now + self.config.cleanup_interval);
                (self.evictions + self.expired - before) as usize
            }
        }
    }

    /// Pins one id (the active page) against eviction, replacing any
    /// previous pin. `None` clears the pin.
    pub fn set_pinned(&mut self, id: Option<&str>) {
        self.pinned = id.map(str::to_owned);
    }

    /// Returns the currently pinned id, if any.
    pub fn pinned(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    /// Removes a page without destroying it, handing ownership back.
    ///
    /// Not a lookup: hit/miss counters are untouched.
    pub fn take(&mut self, id: &str) -> Option<Box<dyn Page>> {
        let entry = self.entries.remove(id)?;
        if self.pinned.as_deref() == Some(id) {
            self.pinned = None;
        }
        Some(entry.page)
    }

    /// Returns whether a page is resident, without counting a lookup.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no pages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroys every resident page and resets the counters.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            Self::destroy_page(entry.page);
        }
        self.pinned = None;
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expired = 0;
    }

    /// Returns a snapshot of occupancy and effectiveness counters.
    pub fn info(&self) -> CacheInfo {
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
        CacheInfo {
            enabled: self.config.enabled,
            size: self.entries.len(),
            max_size: self.config.max_size,
            strategy: self.config.strategy,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            evictions: self.evictions,
            expired: self.expired,
        }
    }

    /// Removes expired entries under the TTL strategy.
    fn expire_entries(&mut self) {
        let ttl = self.config.ttl;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(id, entry)| {
                self.pinned.as_deref() != Some(id.as_str()) && entry.created_at.elapsed() > ttl
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.remove_expired(&id);
        }
    }

    fn remove_expired(&mut self, id: &str) {
        if let Some(entry) = self.entries.remove(id) {
            debug!(page_id = %id, "cache.evict.expired");
            self.expired += 1;
            Self::destroy_page(entry.page);
        }
    }

    /// Evicts unpinned entries until at most `target` remain, ranked by
    /// touch order (LRU) or creation order (TTL).
    fn shrink_to(&mut self, target: usize) {
        while self.entries.len() > target {
            let rank_by_creation = self.config.strategy == EvictionStrategy::Ttl;
            let victim = self
                .entries
                .iter()
                .filter(|(id, _)| self.pinned.as_deref() != Some(id.as_str()))
                .min_by_key(|(_, entry)| {
                    if rank_by_creation {
                        entry.created_seq
                    } else {
                        entry.touch_seq
                    }
                })
                .map(|(id, _)| id.clone());
            let Some(id) = victim else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                debug!(
                    page_id = %id,
                    strategy = self.config.strategy.as_str(),
                    access_count = entry.access_count,
                    idle_ms = entry.last_access.elapsed().as_millis() as u64,
                    "cache.evict"
                );
                self.evictions += 1;
                Self::destroy_page(entry.page);
            }
        }
    }

    fn destroy_page(mut page: Box<dyn Page>) {
        page.destroy();
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("size", &self.entries.len())
            .field("max_size", &self.config.max_size)
            .field("strategy", &self.config.strategy)
            .field("pinned", &self.pinned)
            .finish()
    }
}
