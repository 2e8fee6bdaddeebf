//! Walks a small CRM page set through the runtime: background
//! preloading, warm cache reuse, parameterized navigation, back
//! history, and the closing performance report.

use std::thread;
use std::time::{Duration, Instant};

use vitrine::{
    CacheConfig, ManagerConfig, MonitorConfig, Page, PageConfig, PageManager, PageParams,
    PageState, Result,
};

struct Panel {
    title: String,
    records: usize,
    filter: Option<String>,
}

impl Panel {
    fn build(title: &str, records: usize, cost: Duration) -> Result<Box<dyn Page>> {
        // Stands in for the data access a real business panel performs.
        thread::sleep(cost);
        Ok(Box::new(Panel {
            title: title.to_owned(),
            records,
            filter: None,
        }))
    }
}

impl Page for Panel {
    fn on_show(&mut self) {
        match &self.filter {
            Some(filter) => println!(
                "  [{}] showing {} records, filtered by {filter}",
                self.title, self.records
            ),
            None => println!("  [{}] showing {} records", self.title, self.records),
        }
    }

    fn apply_params(&mut self, params: &PageParams) {
        self.filter = params
            .get("filter")
            .and_then(|value| value.as_str())
            .map(str::to_owned);
    }

    fn destroy(&mut self) {
        println!("  [{}] destroyed", self.title);
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut manager = PageManager::new(ManagerConfig {
        cache: CacheConfig::lru(4),
        monitor: MonitorConfig::default(),
    });

    manager.register(PageConfig::new("dashboard", "Dashboard", || {
        Panel::build("Dashboard", 12, Duration::from_millis(40))
    }))?;
    manager.register(PageConfig::new("contacts", "Contacts", || {
        Panel::build("Contacts", 876, Duration::from_millis(120))
    }))?;
    manager.register(PageConfig::new("contact_detail", "Contact detail", || {
        Panel::build("Contact detail", 1, Duration::from_millis(25))
    }))?;
    manager.register(
        PageConfig::new("reports", "Reports", || {
            Panel::build("Reports", 44, Duration::from_millis(200))
        })
        .preload(5),
    )?;

    println!("--- Preloading reports in the background ---");
    let deadline = Instant::now() + Duration::from_secs(2);
    while manager.page_state("reports") != PageState::Cached && Instant::now() < deadline {
        manager.tick();
        thread::sleep(Duration::from_millis(10));
    }
    println!("  reports is now {}", manager.page_state("reports"));

    println!("\n--- Forward navigation ---");
    manager.navigate_to("dashboard", None);
    manager.navigate_to("contacts", None);
    manager.navigate_to(
        "contact_detail",
        Some(serde_json::json!({ "filter": "overdue" })),
    );

    println!("\n--- The preloaded page opens warm ---");
    manager.navigate_to("reports", None);

    println!("\n--- Back through the history ---");
    while manager.go_back() {}
    println!("  landed on {:?}", manager.current_page());

    manager.record_memory("contacts", 34.2);
    manager.record_memory("dashboard", 8.1);

    println!("\n--- Cache ---");
    println!("  {}", manager.cache_info());
    println!("\n--- Performance ---");
    println!("  {}", manager.performance_report());
    println!("\n--- Snapshot ---");
    println!("{}", serde_json::to_string_pretty(&manager.info())?);

    println!("\n--- Shutdown ---");
    manager.cleanup();
    Ok(())
}
