//! Orchestrates registration, navigation, preloading, and teardown of
//! pages across the cache, the loader, and the monitor.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, CacheInfo, PageCache};
use crate::error::{Result, VitrineError};
use crate::history::NavigationHistory;
use crate::loader::{LazyPageLoader, LoadCompletion};
use crate::monitor::{MonitorConfig, PageMetrics, PerformanceMonitor, PerformanceReport};
use crate::page::{Page, PageConfig, PageParams, PageState};

/// Top-level configuration for a [`PageManager`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Cache sizing and eviction settings.
    pub cache: CacheConfig,
    /// Performance tracking thresholds.
    pub monitor: MonitorConfig,
}

/// Notification emitted as navigation and preloading progress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageEvent {
    /// A page became the visible page.
    Activated {
        /// Id of the page now shown.
        page_id: String,
    },
    /// The previously visible page was hidden.
    Deactivated {
        /// Id of the page that left the foreground.
        page_id: String,
    },
    /// A navigation or preload construction failed.
    LoadFailed {
        /// Id of the page whose construction failed.
        page_id: String,
    },
    /// A background preload finished and the page entered the cache.
    Preloaded {
        /// Id of the freshly cached page.
        page_id: String,
    },
}

/// Outcome of one [`PageManager::tick`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Load completions integrated this tick, failures included.
    pub applied: usize,
    /// Background constructions started this tick.
    pub started: usize,
    /// Pages removed by the cache cleanup pass.
    pub evicted: usize,
}

impl TickReport {
    /// Returns whether the tick did anything at all.
    pub fn is_idle(&self) -> bool {
        self.applied == 0 && self.started == 0 && self.evicted == 0
    }
}

/// Snapshot of the manager wiring for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ManagerInfo {
    /// Id of the visible page, if any.
    pub current_page: Option<String>,
    /// Number of registered page configurations.
    pub registered_pages: usize,
    /// Depth of the navigation history, current page included.
    pub history_depth: usize,
    /// Number of in-flight background constructions.
    pub loading: usize,
    /// Number of queued preload requests.
    pub queued_preloads: usize,
    /// Cache occupancy and effectiveness counters.
    pub cache: CacheInfo,
    /// Aggregate performance view.
    pub performance: PerformanceReport,
}

struct ActivePage {
    id: String,
    // Some when the page lives here because it could not be cached;
    // None when it resides in the cache under `id`.
    uncached: Option<Box<dyn Page>>,
}

/// Single entry point for page presentation.
///
/// The manager owns the registry, the cache, the loader, the monitor,
/// and the history, and is driven from one thread. Only page
/// construction leaves that thread; finished pages come back through
/// [`PageManager::tick`].
pub struct PageManager {
    registry: HashMap<String, PageConfig>,
    cache: PageCache,
    loader: LazyPageLoader,
    monitor: PerformanceMonitor,
    history: NavigationHistory,
    active: Option<ActivePage>,
    loaded_once: HashSet<String>,
    subscribers: Vec<Box<dyn FnMut(&PageEvent)>>,
}

impl Default for PageManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl PageManager {
    /// Creates a manager with the given cache and monitor settings.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            registry: HashMap::new(),
            cache: PageCache::new(config.cache),
            loader: LazyPageLoader::new(),
            monitor: PerformanceMonitor::new(config.monitor),
            history: NavigationHistory::new(),
            active: None,
            loaded_once: HashSet::new(),
            subscribers: Vec::new(),
        }
    }

    /// Registers a page configuration under its id.
    ///
    /// A config flagged for preloading is queued right away unless the
    /// page is uncacheable, in which case preloading would build a page
    /// with nowhere to live.
    pub fn register(&mut self, config: PageConfig) -> Result<()> {
        if self.registry.contains_key(&config.id) {
            return Err(VitrineError::DuplicatePage(config.id.clone()));
        }
        debug!(page_id = %config.id, preload = config.preload, "manager.page.registered");
        if config.preload {
            if config.cache_enabled {
                self.loader
                    .enqueue_preload(&config.id, config.preload_priority);
            } else {
                debug!(page_id = %config.id, "manager.preload.uncacheable");
            }
        }
        self.registry.insert(config.id.clone(), config);
        Ok(())
    }

    /// Returns whether an id has a registered configuration.
    pub fn is_registered(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    /// Makes `id` the visible page, constructing it on a cache miss.
    ///
    /// Returns whether navigation succeeded. On failure nothing changes:
    /// the previous page stays visible and the history is untouched.
    pub fn navigate_to(&mut self, id: &str, params: Option<PageParams>) -> bool {
        match self.navigate_inner(id, params, true) {
            Ok(()) => true,
            Err(err) => {
                warn!(page_id = %id, error = %err, "manager.navigate.failed");
                false
            }
        }
    }

    /// Returns to the previous history entry.
    ///
    /// Needs at least two entries. When re-activating the target fails,
    /// the history is restored and the current page stays visible.
    pub fn go_back(&mut self) -> bool {
        if self.history.len() < 2 {
            return false;
        }
        let Some(current) = self.history.pop() else {
            return false;
        };
        let Some(target) = self.history.top().map(str::to_owned) else {
            self.history.push(&current);
            return false;
        };
        match self.navigate_inner(&target, None, false) {
            Ok(()) => true,
            Err(err) => {
                warn!(page_id = %target, error = %err, "manager.back.failed");
                self.history.push(&current);
                false
            }
        }
    }

    /// Queues a registered page for background construction.
    ///
    /// Pages that are already visible, resident, or being constructed are
    /// skipped, as are uncacheable pages.
    pub fn preload_page(&mut self, id: &str, priority: i32) -> Result<()> {
        let Some(config) = self.registry.get(id) else {
            return Err(VitrineError::UnknownPage(id.to_owned()));
        };
        if !config.cache_enabled {
            debug!(page_id = %id, "manager.preload.uncacheable");
            return Ok(());
        }
        if self.is_active(id) || self.cache.contains(id) || self.loader.is_loading(id) {
            debug!(page_id = %id, "manager.preload.skipped");
            return Ok(());
        }
        self.loader.enqueue_preload(id, priority);
        Ok(())
    }

    /// Drives background work: integrates finished loads, starts the next
    /// queued preload when the loader is idle, and runs the cache cleanup
    /// pass when its deadline has passed.
    ///
    /// Call this periodically from the owning thread's idle loop.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for completion in self.loader.drain_completions() {
            report.applied += 1;
            let LoadCompletion {
                page_id,
                elapsed,
                outcome,
            } = completion;
            match outcome {
                Ok(page) => self.integrate_preload(page_id, elapsed, page),
                Err(err) => {
                    warn!(page_id = %page_id, error = %err, "manager.preload.failed");
                    self.emit(PageEvent::LoadFailed { page_id });
                }
            }
        }
        if self.loader.loading_count() == 0 {
            report.started += self.start_next_preload();
        }
        report.evicted = self.cache.maybe_cleanup();
        if !report.is_idle() {
            debug!(
                applied = report.applied,
                started = report.started,
                evicted = report.evicted,
                "manager.tick"
            );
        }
        report
    }

    /// Hides and destroys everything: the visible page, every cached
    /// page, queued and in-flight loads, history, and metrics.
    ///
    /// Registrations survive, so the manager is immediately usable again.
    /// Calling this twice is harmless.
    pub fn cleanup(&mut self) {
        let resident =
            self.cache.len() + usize::from(self.active.as_ref().is_some_and(|a| a.uncached.is_some()));
        self.deactivate_current();
        self.cache.clear();
        self.loader.invalidate();
        self.history.clear();
        self.monitor.reset();
        self.loaded_once.clear();
        info!(pages_destroyed = resident, "manager.cleanup.completed");
    }

    /// Id of the visible page.
    pub fn current_page(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    /// The visit order, oldest first, current page last.
    pub fn history(&self) -> &[String] {
        self.history.as_slice()
    }

    /// Where a page currently is in its lifecycle.
    ///
    /// Derived from the live structures rather than a shadow table, so a
    /// page silently evicted by the cache reports `Evicted` without any
    /// bookkeeping hook.
    pub fn page_state(&self, id: &str) -> PageState {
        if self.is_active(id) {
            PageState::Active
        } else if self.cache.contains(id) {
            PageState::Cached
        } else if self.loader.is_loading(id) {
            PageState::Loading
        } else if self.loader.is_ready(id) {
            PageState::Loaded
        } else if self.loaded_once.contains(id) {
            PageState::Evicted
        } else {
            PageState::NotLoaded
        }
    }

    /// Registers an observer for page events. Subscribers stay for the
    /// life of the manager.
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&PageEvent) + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Records an externally observed memory footprint for a page.
    pub fn record_memory(&mut self, id: &str, memory_mb: f64) {
        self.monitor.record_memory(id, memory_mb);
    }

    /// Latest performance observations for one page.
    pub fn page_metrics(&self, id: &str) -> Option<&PageMetrics> {
        self.monitor.metrics(id)
    }

    /// Aggregate performance view across tracked pages.
    pub fn performance_report(&self) -> PerformanceReport {
        self.monitor.report()
    }

    /// Cache occupancy and effectiveness counters.
    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    /// Full diagnostic snapshot.
    pub fn info(&self) -> ManagerInfo {
        ManagerInfo {
            current_page: self.current_page().map(str::to_owned),
            registered_pages: self.registry.len(),
            history_depth: self.history.len(),
            loading: self.loader.loading_count(),
            queued_preloads: self.loader.queue_len(),
            cache: self.cache.info(),
            performance: self.monitor.report(),
        }
    }

    fn is_active(&self, id: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    fn navigate_inner(
        &mut self,
        id: &str,
        params: Option<PageParams>,
        push_history: bool,
    ) -> Result<()> {
        if self.is_active(id) {
            self.refresh_active(id, params);
            if push_history {
                self.history.push(id);
            }
            self.emit(PageEvent::Activated {
                page_id: id.to_owned(),
            });
            return Ok(());
        }
        let config = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| VitrineError::UnknownPage(id.to_owned()))?;

        let resident = self.cache.get(id).is_some();
        let mut incoming: Option<Box<dyn Page>> = None;
        if !resident {
            let (outcome, elapsed) = self.loader.load_blocking(id, Arc::clone(&config.factory));
            match outcome {
                Ok(page) => {
                    self.monitor.record_load(id, elapsed);
                    self.loaded_once.insert(id.to_owned());
                    incoming = Some(page);
                }
                Err(err) => {
                    self.emit(PageEvent::LoadFailed {
                        page_id: id.to_owned(),
                    });
                    return Err(err);
                }
            }
        }

        if let Some(params) = &params {
            match incoming.as_mut() {
                Some(page) => page.apply_params(params),
                None => {
                    if let Some(page) = self.cache.peek(id) {
                        page.apply_params(params);
                    }
                }
            }
        }

        self.deactivate_current();

        let started = Instant::now();
        match incoming {
            Some(mut page) => {
                page.on_show();
                self.monitor.record_show(id, started.elapsed());
                if config.cache_enabled {
                    match self.cache.put(id, page) {
                        Ok(()) => {
                            self.cache.set_pinned(Some(id));
                            self.active = Some(ActivePage {
                                id: id.to_owned(),
                                uncached: None,
                            });
                        }
                        Err(page) => {
                            debug!(page_id = %id, "manager.active.uncached");
                            self.active = Some(ActivePage {
                                id: id.to_owned(),
                                uncached: Some(page),
                            });
                        }
                    }
                } else {
                    self.active = Some(ActivePage {
                        id: id.to_owned(),
                        uncached: Some(page),
                    });
                }
            }
            None => {
                if let Some(page) = self.cache.peek(id) {
                    page.on_show();
                }
                self.monitor.record_show(id, started.elapsed());
                self.cache.set_pinned(Some(id));
                self.active = Some(ActivePage {
                    id: id.to_owned(),
                    uncached: None,
                });
            }
        }

        if push_history {
            self.history.push(id);
        }
        info!(page_id = %id, cache_hit = resident, "manager.navigate.completed");
        self.emit(PageEvent::Activated {
            page_id: id.to_owned(),
        });
        Ok(())
    }

    /// Re-applies params and re-runs `on_show` for the page that is
    /// already visible.
    fn refresh_active(&mut self, id: &str, params: Option<PageParams>) {
        let started = Instant::now();
        if let Some(page) = self.active.as_mut().and_then(|a| a.uncached.as_mut()) {
            if let Some(params) = &params {
                page.apply_params(params);
            }
            page.on_show();
        } else if let Some(page) = self.cache.peek(id) {
            if let Some(params) = &params {
                page.apply_params(params);
            }
            page.on_show();
        }
        self.monitor.record_show(id, started.elapsed());
    }

    /// Hides the visible page. A resident page stays cached; an uncached
    /// one has reached the end of its life and is destroyed.
    fn deactivate_current(&mut self) {
        let Some(previous) = self.active.take() else {
            return;
        };
        self.cache.set_pinned(None);
        match previous.uncached {
            Some(mut page) => {
                page.on_hide();
                page.destroy();
                debug!(page_id = %previous.id, "manager.page.discarded");
            }
            None => {
                if let Some(page) = self.cache.peek(&previous.id) {
                    page.on_hide();
                }
            }
        }
        self.emit(PageEvent::Deactivated {
            page_id: previous.id,
        });
    }

    /// Files one finished background build into the cache.
    fn integrate_preload(&mut self, page_id: String, elapsed: Duration, page: Box<dyn Page>) {
        self.monitor.record_load(&page_id, elapsed);
        self.loaded_once.insert(page_id.clone());
        if self.is_active(&page_id) || self.cache.contains(&page_id) {
            debug!(page_id = %page_id, "manager.preload.duplicate");
            destroy(page);
            return;
        }
        match self.cache.put(&page_id, page) {
            Ok(()) => {
                debug!(page_id = %page_id, "manager.preload.completed");
                self.emit(PageEvent::Preloaded { page_id });
            }
            Err(page) => {
                debug!(page_id = %page_id, "manager.preload.rejected");
                destroy(page);
            }
        }
    }

    /// Pops queue entries until one spawns, dropping entries whose page
    /// became resident since it was queued. Returns how many started.
    fn start_next_preload(&mut self) -> usize {
        while let Some(request) = self.loader.pop_next_preload() {
            let id = request.page_id;
            if self.is_active(&id) || self.cache.contains(&id) {
                continue;
            }
            let Some(config) = self.registry.get(&id) else {
                continue;
            };
            match self.loader.spawn_load(&id, Arc::clone(&config.factory)) {
                Ok(true) => {
                    debug!(page_id = %id, priority = request.priority, "manager.preload.started");
                    return 1;
                }
                Ok(false) => continue,
                Err(err) => {
                    warn!(page_id = %id, error = %err, "manager.preload.spawn_failed");
                    self.emit(PageEvent::LoadFailed { page_id: id });
                }
            }
        }
        0
    }

    fn emit(&mut self, event: PageEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

impl fmt::Debug for PageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageManager")
            .field("registered", &self.registry.len())
            .field("current_page", &self.current_page())
            .field("history_depth", &self.history.len())
            .field("cache", &self.cache)
            .finish()
    }
}

fn destroy(mut page: Box<dyn Page>) {
    page.destroy();
}
