//! Embeddable page-presentation runtime: a registry of lazily constructed
//! pages, a bounded cache with pluggable eviction, a priority preload
//! queue, and per-page performance tracking.
//!
//! The [`PageManager`] is the single entry point. It is owned and driven
//! by one thread; only page construction leaves that thread, and finished
//! pages are handed back through [`PageManager::tick`].
//!
//! ```
//! use vitrine::{Page, PageConfig, PageManager};
//!
//! struct Dashboard;
//! impl Page for Dashboard {}
//!
//! let mut manager = PageManager::default();
//! manager.register(PageConfig::new("dashboard", "Dashboard", || {
//!     Ok(Box::new(Dashboard) as Box<dyn Page>)
//! }))?;
//!
//! assert!(manager.navigate_to("dashboard", None));
//! assert_eq!(manager.current_page(), Some("dashboard"));
//! # Ok::<(), vitrine::VitrineError>(())
//! ```

#![warn(missing_docs)]

/// Bounded page cache with LRU, TTL, and no-eviction strategies.
pub mod cache;

/// Error and result types shared across the crate.
pub mod error;

/// Back-stack of visited page ids.
pub mod history;

/// Preload queue and background page construction.
pub mod loader;

/// Navigation, lifecycle, and teardown orchestration.
pub mod manager;

/// Per-page performance observations and threshold warnings.
pub mod monitor;

/// Page capability contract, lifecycle states, and registration config.
pub mod page;

pub use cache::{CacheConfig, CacheInfo, EvictionStrategy, PageCache};
pub use error::{Result, VitrineError};
pub use history::NavigationHistory;
pub use loader::{LazyPageLoader, LoadCallback, LoadCompletion, PreloadRequest};
pub use manager::{ManagerConfig, ManagerInfo, PageEvent, PageManager, TickReport};
pub use monitor::{MonitorConfig, PageMetrics, PerformanceMonitor, PerformanceReport};
pub use page::{Page, PageConfig, PageFactory, PageParams, PageState};
