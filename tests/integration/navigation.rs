#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use vitrine::{
    CacheConfig, EvictionStrategy, ManagerConfig, Page, PageConfig, PageEvent, PageManager,
    PageParams, PageState, VitrineError,
};

type Log = Arc<Mutex<Vec<String>>>;

struct CrmPage {
    id: String,
    log: Log,
    last_params: Option<PageParams>,
}

impl Page for CrmPage {
    fn on_show(&mut self) {
        self.log.lock().push(format!("{}:show", self.id));
    }

    fn on_hide(&mut self) {
        self.log.lock().push(format!("{}:hide", self.id));
    }

    fn apply_params(&mut self, params: &PageParams) {
        self.last_params = Some(params.clone());
        self.log.lock().push(format!("{}:params:{}", self.id, params));
    }

    fn destroy(&mut self) {
        self.log.lock().push(format!("{}:destroy", self.id));
    }
}

fn crm_page(id: &str, log: &Log, builds: &Arc<AtomicUsize>) -> PageConfig {
    let id_owned = id.to_owned();
    let log = Arc::clone(log);
    let builds = Arc::clone(builds);
    PageConfig::new(id, id, move || {
        builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CrmPage {
            id: id_owned.clone(),
            log: Arc::clone(&log),
            last_params: None,
        }) as Box<dyn Page>)
    })
}

fn crm_manager(log: &Log, builds: &Arc<AtomicUsize>, ids: &[&str]) -> PageManager {
    let mut manager = PageManager::default();
    for id in ids {
        manager.register(crm_page(id, log, builds)).unwrap();
    }
    manager
}

#[test]
fn full_navigation_journey_reuses_cached_pages() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["home", "contacts", "settings"]);

    assert!(manager.navigate_to("home", None));
    assert!(manager.navigate_to("contacts", None));
    assert!(manager.navigate_to("settings", None));
    assert!(manager.navigate_to("home", None));

    assert_eq!(builds.load(Ordering::SeqCst), 3, "home must be served warm");
    assert_eq!(manager.current_page(), Some("home"));
    assert_eq!(manager.history(), ["home", "contacts", "settings", "home"]);
    assert_eq!(manager.page_state("home"), PageState::Active);
    assert_eq!(manager.page_state("contacts"), PageState::Cached);
    assert_eq!(manager.page_state("settings"), PageState::Cached);

    let info = manager.info();
    assert_eq!(info.cache.hits, 1);
    assert_eq!(info.cache.misses, 3);
    assert_eq!(info.cache.size, 3);
    assert_eq!(info.registered_pages, 3);
    assert_eq!(info.current_page.as_deref(), Some("home"));

    let entries = log.lock();
    assert_eq!(
        entries.as_slice(),
        [
            "home:show",
            "home:hide",
            "contacts:show",
            "contacts:hide",
            "settings:show",
            "settings:hide",
            "home:show",
        ]
    );
}

#[test]
fn params_reach_the_page_before_it_shows() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["contact_detail"]);

    assert!(manager.navigate_to("contact_detail", Some(json!({"contact_id": 42}))));

    let entries = log.lock();
    assert_eq!(
        entries.as_slice(),
        [
            "contact_detail:params:{\"contact_id\":42}",
            "contact_detail:show",
        ]
    );
}

#[test]
fn go_back_chain_walks_history_without_reconstruction() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["home", "deals", "reports"]);

    assert!(manager.navigate_to("home", None));
    assert!(manager.navigate_to("deals", None));
    assert!(manager.navigate_to("reports", None));

    assert!(manager.go_back());
    assert!(manager.go_back());
    assert_eq!(manager.current_page(), Some("home"));
    assert_eq!(manager.history(), ["home"]);
    assert_eq!(
        builds.load(Ordering::SeqCst),
        3,
        "going back must reuse resident pages"
    );
    assert!(!manager.go_back());
    assert_eq!(manager.current_page(), Some("home"));
}

#[test]
fn overflow_page_lives_uncached_and_dies_on_leave() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = PageManager::new(ManagerConfig {
        cache: CacheConfig {
            strategy: EvictionStrategy::None,
            max_size: 2,
            ..CacheConfig::default()
        },
        ..ManagerConfig::default()
    });
    for id in ["a", "b", "c"] {
        manager.register(crm_page(id, &log, &builds)).unwrap();
    }

    assert!(manager.navigate_to("a", None));
    assert!(manager.navigate_to("b", None));
    assert!(manager.navigate_to("c", None));

    assert_eq!(manager.page_state("c"), PageState::Active);
    assert_eq!(manager.cache_info().size, 2, "a full cache refuses c");
    assert_eq!(manager.cache_info().evictions, 0);

    assert!(manager.navigate_to("a", None));

    assert_eq!(manager.page_state("c"), PageState::Evicted);
    assert_eq!(manager.page_state("a"), PageState::Active);
    assert_eq!(manager.page_state("b"), PageState::Cached);
    assert!(log.lock().contains(&"c:destroy".to_owned()));

    assert!(manager.navigate_to("c", None), "c can be rebuilt after eviction");
    assert_eq!(builds.load(Ordering::SeqCst), 4);
}

#[test]
fn failed_navigation_is_atomic() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["home"]);
    manager
        .register(PageConfig::new("flaky", "Flaky", || {
            Err(VitrineError::construction("flaky", "service unavailable"))
        }))
        .unwrap();
    let events: Arc<Mutex<Vec<PageEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    manager.subscribe(move |event| sink.lock().push(event.clone()));

    assert!(manager.navigate_to("home", None));
    assert!(!manager.navigate_to("flaky", None));
    assert!(!manager.navigate_to("missing", None));

    assert_eq!(manager.current_page(), Some("home"));
    assert_eq!(manager.history(), ["home"]);
    assert_eq!(manager.page_state("flaky"), PageState::NotLoaded);
    assert!(events.lock().contains(&PageEvent::LoadFailed {
        page_id: "flaky".to_owned()
    }));
    assert!(
        !log.lock().contains(&"home:hide".to_owned()),
        "the visible page stays up when navigation fails"
    );
}

#[test]
fn cleanup_tears_down_and_the_registry_survives() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["home", "contacts"]);

    assert!(manager.navigate_to("home", None));
    assert!(manager.navigate_to("contacts", None));
    manager.record_memory("home", 21.0);

    manager.cleanup();

    assert_eq!(manager.current_page(), None);
    assert!(manager.history().is_empty());
    assert_eq!(manager.cache_info().size, 0);
    assert_eq!(manager.performance_report().total_pages, 0);
    {
        let entries = log.lock();
        assert!(entries.contains(&"home:destroy".to_owned()));
        assert!(entries.contains(&"contacts:destroy".to_owned()));
    }

    assert!(manager.navigate_to("contacts", None));
    assert_eq!(manager.current_page(), Some("contacts"));
    assert_eq!(
        builds.load(Ordering::SeqCst),
        3,
        "pages rebuild from scratch after cleanup"
    );
}

#[test]
fn performance_report_tracks_the_journey() {
    let log: Log = Arc::default();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut manager = crm_manager(&log, &builds, &["home"]);
    let slow_builds = Arc::new(AtomicUsize::new(0));
    let slow_counter = Arc::clone(&slow_builds);
    manager
        .register(PageConfig::new("analytics", "Analytics", move || {
            slow_counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(60));
            Ok(Box::new(Blank) as Box<dyn Page>)
        }))
        .unwrap();

    assert!(manager.navigate_to("home", None));
    assert!(manager.navigate_to("analytics", None));
    manager.record_memory("home", 12.0);
    manager.record_memory("analytics", 34.5);

    let report = manager.performance_report();
    assert_eq!(report.total_pages, 2);
    assert!(report.average_load_time.is_some());
    assert!(report.average_show_time.is_some());
    assert_eq!(report.average_memory_mb, Some(23.25));
    let (slowest, load) = report.slowest_load.expect("two loads were recorded");
    assert_eq!(slowest, "analytics");
    assert!(load >= Duration::from_millis(60));
    assert_eq!(
        report.highest_memory,
        Some(("analytics".to_owned(), 34.5))
    );

    let metrics = manager.page_metrics("analytics").unwrap();
    assert!(metrics.load_time.unwrap() >= Duration::from_millis(60));
}

struct Blank;
impl Page for Blank {}
