#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use vitrine::{
    CacheConfig, ManagerConfig, Page, PageConfig, PageEvent, PageManager, PageState, Result,
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("vitrine=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

struct Blank;
impl Page for Blank {}

struct Tracked(Arc<AtomicUsize>);
impl Page for Tracked {
    fn destroy(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn ordered_config(id: &str, order: &Arc<Mutex<Vec<String>>>, delay: Duration) -> PageConfig {
    let order = Arc::clone(order);
    let page_id = id.to_owned();
    PageConfig::new(id, id, move || {
        order.lock().push(page_id.clone());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(Box::new(Blank) as Box<dyn Page>)
    })
}

fn tick_until<F>(manager: &mut PageManager, mut done: F)
where
    F: FnMut(&PageManager) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        manager.tick();
        if done(manager) {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for background work");
}

#[test]
fn preloads_construct_in_priority_order() -> Result<()> {
    init_tracing();
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut manager = PageManager::default();
    manager.register(ordered_config("a", &order, Duration::ZERO))?;
    manager.register(ordered_config("b", &order, Duration::ZERO))?;
    manager.register(ordered_config("c", &order, Duration::ZERO))?;

    manager.preload_page("a", 1)?;
    manager.preload_page("b", 2)?;
    manager.preload_page("c", 1)?;
    assert_eq!(manager.info().queued_preloads, 3);

    tick_until(&mut manager, |m| {
        ["a", "b", "c"]
            .iter()
            .all(|id| m.page_state(id) == PageState::Cached)
    });

    assert_eq!(
        order.lock().as_slice(),
        ["b", "a", "c"],
        "priority first, then arrival order"
    );
    Ok(())
}

#[test]
fn one_background_build_runs_at_a_time() -> Result<()> {
    init_tracing();
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut manager = PageManager::default();
    manager.register(ordered_config("slow", &order, Duration::from_millis(150)))?;
    manager.register(ordered_config("next", &order, Duration::ZERO))?;
    manager.preload_page("slow", 5)?;
    manager.preload_page("next", 1)?;

    let first = manager.tick();
    assert_eq!(first.started, 1);
    assert_eq!(manager.info().loading, 1);
    let second = manager.tick();
    assert_eq!(second.started, 0, "the loader is busy, nothing new starts");

    tick_until(&mut manager, |m| {
        m.page_state("slow") == PageState::Cached && m.page_state("next") == PageState::Cached
    });
    Ok(())
}

#[test]
fn navigation_claims_the_in_flight_preload() -> Result<()> {
    init_tracing();
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut manager = PageManager::default();
    manager.register(ordered_config("contacts", &order, Duration::from_millis(80)))?;
    manager.preload_page("contacts", 3)?;

    let report = manager.tick();
    assert_eq!(report.started, 1);

    assert!(manager.navigate_to("contacts", None));
    assert_eq!(manager.current_page(), Some("contacts"));
    assert_eq!(
        order.lock().len(),
        1,
        "navigation must claim the running build instead of constructing again"
    );

    let after = manager.tick();
    assert_eq!(after.applied, 0, "the claimed result is not delivered twice");
    let metrics = manager.page_metrics("contacts").expect("load was recorded");
    assert!(metrics.load_time.unwrap() >= Duration::from_millis(80));
    Ok(())
}

#[test]
fn failed_preload_reports_and_leaves_no_trace() -> Result<()> {
    init_tracing();
    let mut manager = PageManager::default();
    manager.register(
        PageConfig::new("flaky", "Flaky", || {
            Err(vitrine::VitrineError::construction("flaky", "backend down"))
        })
        .preload(4),
    )?;
    let events: Arc<Mutex<Vec<PageEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    manager.subscribe(move |event| sink.lock().push(event.clone()));

    let mut applied = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while applied == 0 && Instant::now() < deadline {
        applied += manager.tick().applied;
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(applied, 1);
    assert_eq!(manager.page_state("flaky"), PageState::NotLoaded);
    assert_eq!(manager.cache_info().size, 0);
    assert_eq!(
        events.lock().as_slice(),
        [PageEvent::LoadFailed {
            page_id: "flaky".to_owned()
        }]
    );
    Ok(())
}

#[test]
fn panicking_factory_does_not_wedge_the_loader() -> Result<()> {
    init_tracing();
    let mut manager = PageManager::default();
    manager.register(
        PageConfig::new("explosive", "Explosive", || -> Result<Box<dyn Page>> {
            panic!("renderer crashed");
        })
        .preload(9),
    )?;
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    manager.register(ordered_config("steady", &order, Duration::ZERO).preload(1))?;

    tick_until(&mut manager, |m| m.page_state("steady") == PageState::Cached);

    assert_eq!(manager.page_state("explosive"), PageState::NotLoaded);
    assert_eq!(manager.info().loading, 0);
    Ok(())
}

#[test]
fn cleanup_discards_results_landing_late() -> Result<()> {
    init_tracing();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let mut manager = PageManager::default();
    manager.register(PageConfig::new("doomed", "Doomed", move || {
        thread::sleep(Duration::from_millis(50));
        Ok(Box::new(Tracked(Arc::clone(&counter))) as Box<dyn Page>)
    }))?;
    let events: Arc<Mutex<Vec<PageEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    manager.subscribe(move |event| sink.lock().push(event.clone()));

    manager.preload_page("doomed", 2)?;
    let report = manager.tick();
    assert_eq!(report.started, 1);

    manager.cleanup();

    let deadline = Instant::now() + Duration::from_secs(5);
    while destroyed.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        let report = manager.tick();
        assert_eq!(report.applied, 0, "a stale result must never be applied");
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(manager.page_state("doomed"), PageState::NotLoaded);
    assert_eq!(manager.cache_info().size, 0);
    assert!(!events.lock().iter().any(|e| matches!(e, PageEvent::Preloaded { .. })));
    Ok(())
}

#[test]
fn preload_with_no_unpinned_slot_is_dropped() -> Result<()> {
    init_tracing();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let mut manager = PageManager::new(ManagerConfig {
        cache: CacheConfig::lru(1),
        ..ManagerConfig::default()
    });
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    manager.register(ordered_config("active", &order, Duration::ZERO))?;
    manager.register(PageConfig::new("extra", "Extra", move || {
        Ok(Box::new(Tracked(Arc::clone(&counter))) as Box<dyn Page>)
    }))?;

    assert!(manager.navigate_to("active", None));
    manager.preload_page("extra", 1)?;

    tick_until(&mut manager, |m| m.page_state("extra") == PageState::Evicted);

    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(manager.current_page(), Some("active"));
    assert_eq!(manager.cache_info().size, 1);
    Ok(())
}

#[test]
fn queue_entry_for_a_now_resident_page_is_dropped() -> Result<()> {
    init_tracing();
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut manager = PageManager::default();
    manager.register(ordered_config("home", &order, Duration::ZERO))?;

    manager.preload_page("home", 1)?;
    assert!(manager.navigate_to("home", None));
    assert_eq!(order.lock().len(), 1);

    let report = manager.tick();
    assert_eq!(report.started, 0, "the stale queue entry must be skipped");
    assert_eq!(manager.info().queued_preloads, 0);
    assert_eq!(order.lock().len(), 1);
    Ok(())
}
