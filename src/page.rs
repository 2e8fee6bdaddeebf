//! Page capability contract, lifecycle states, and registration config.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Data context handed to a page when a navigation supplies parameters.
pub type PageParams = serde_json::Value;

/// Capability set implemented by every concrete page.
///
/// The runtime only ever calls through this trait; it never inspects the
/// concrete type behind it. Instances may be constructed on a worker thread
/// and handed back to the owning thread, hence the `Send` bound. All hooks
/// default to no-ops so a minimal page implements nothing.
pub trait Page: Send {
    /// Invoked each time this page becomes the active page.
    fn on_show(&mut self) {}

    /// Invoked when this page stops being the active page.
    fn on_hide(&mut self) {}

    /// Applies a navigation data context to the page.
    fn apply_params(&mut self, _params: &PageParams) {}

    /// Releases the page's resources. Called exactly once, when the page is
    /// evicted or the runtime shuts down.
    fn destroy(&mut self) {}
}

/// No-argument constructor producing a [`Page`].
///
/// Factories are shared with the background construction worker, hence
/// `Send + Sync`. Closures returning `Result<Box<dyn Page>>` implement this
/// trait directly.
pub trait PageFactory: Send + Sync {
    /// Builds a fresh page instance.
    fn create(&self) -> Result<Box<dyn Page>>;
}

impl<F> PageFactory for F
where
    F: Fn() -> Result<Box<dyn Page>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Page>> {
        self()
    }
}

/// Lifecycle state tracked per page id.
///
/// `NotLoaded → Loading → Loaded → Active ⇄ Cached → Evicted`. `Evicted`
/// is terminal for a page instance; navigating to the id again starts a
/// fresh lifecycle from `Loading`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum PageState {
    /// Registered but never constructed.
    #[default]
    NotLoaded,
    /// Construction is in flight on the caller or a worker thread.
    Loading,
    /// Constructed but not yet shown.
    Loaded,
    /// The single page currently displayed.
    Active,
    /// Resident in the page cache, ready to show without reconstruction.
    Cached,
    /// Destroyed; resources released.
    Evicted,
}

impl PageState {
    /// Returns the lowercase label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            PageState::NotLoaded => "not_loaded",
            PageState::Loading => "loading",
            PageState::Loaded => "loaded",
            PageState::Active => "active",
            PageState::Cached => "cached",
            PageState::Evicted => "evicted",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable registration record for one page id.
///
/// Built once via the constructor and builder setters, then handed to
/// [`crate::manager::PageManager::register`]; never mutated afterwards.
#[derive(Clone)]
pub struct PageConfig {
    /// Unique page id.
    pub id: String,
    /// Human-readable title for the navigation surface.
    pub title: String,
    /// Constructor invoked on cache miss or preload.
    pub factory: Arc<dyn PageFactory>,
    /// Whether this page may be kept warm in the cache after deactivation.
    pub cache_enabled: bool,
    /// Whether this page is enqueued for preloading at registration.
    pub preload: bool,
    /// Preload ordering; higher priorities are constructed sooner.
    pub preload_priority: i32,
    /// Service tag consumed by an external dependency-resolution step.
    /// Recorded verbatim; the runtime never interprets it.
    pub requires_service: Option<String>,
}

impl PageConfig {
    /// Creates a config with caching enabled and preloading disabled.
    ///
    /// Any closure returning `Result<Box<dyn Page>>` works as the factory.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        factory: impl PageFactory + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            factory: Arc::new(factory),
            cache_enabled: true,
            preload: false,
            preload_priority: 0,
            requires_service: None,
        }
    }

    /// Enables or disables caching for this page.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Marks this page for preloading at the given priority.
    pub fn preload(mut self, priority: i32) -> Self {
        self.preload = true;
        self.preload_priority = priority;
        self
    }

    /// Tags the page with a service required by an external resolver.
    pub fn requires_service(mut self, service: impl Into<String>) -> Self {
        self.requires_service = Some(service.into());
        self
    }
}

impl fmt::Debug for PageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageConfig")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("cache_enabled", &self.cache_enabled)
            .field("preload", &self.preload)
            .field("preload_priority", &self.preload_priority)
            .field("requires_service", &self.requires_service)
            .finish()
    }
}
