//! Per-page performance tracking with latest-observation semantics and
//! threshold warnings.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Thresholds and master switch for performance tracking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Master switch; a disabled monitor records nothing.
    pub enabled: bool,
    /// Load durations above this emit a slow-load warning.
    pub slow_load: Duration,
    /// Show durations above this emit a slow-show warning.
    pub slow_show: Duration,
    /// Memory observations above this many megabytes emit a warning.
    pub high_memory_mb: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_load: Duration::from_secs(2),
            slow_show: Duration::from_millis(500),
            high_memory_mb: 50.0,
        }
    }
}

impl MonitorConfig {
    /// Creates a config with tracking switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Latest recorded observations for one page.
///
/// Each recording replaces the previous value; no history is kept.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PageMetrics {
    /// Most recent construction time.
    pub load_time: Option<Duration>,
    /// Most recent activation time.
    pub show_time: Option<Duration>,
    /// Most recent memory observation in megabytes.
    pub memory_mb: Option<f64>,
}

/// Aggregate view across every tracked page.
///
/// Averages cover only the pages that carry the respective observation;
/// they are `None` when no page does.
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceReport {
    /// Number of pages with at least one observation.
    pub total_pages: usize,
    /// Mean of the latest load times.
    pub average_load_time: Option<Duration>,
    /// Mean of the latest show times.
    pub average_show_time: Option<Duration>,
    /// Mean of the latest memory observations in megabytes.
    pub average_memory_mb: Option<f64>,
    /// Page with the largest latest load time.
    pub slowest_load: Option<(String, Duration)>,
    /// Page with the largest latest memory observation.
    pub highest_memory: Option<(String, f64)>,
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pages={}", self.total_pages)?;
        if let Some(avg) = self.average_load_time {
            write!(f, " avg_load={}ms", avg.as_millis())?;
        }
        if let Some(avg) = self.average_show_time {
            write!(f, " avg_show={}ms", avg.as_millis())?;
        }
        if let Some(avg) = self.average_memory_mb {
            write!(f, " avg_memory={avg:.1}MB")?;
        }
        if let Some((id, load)) = &self.slowest_load {
            write!(f, " slowest={id}/{}ms", load.as_millis())?;
        }
        if let Some((id, mb)) = &self.highest_memory {
            write!(f, " heaviest={id}/{mb:.1}MB")?;
        }
        Ok(())
    }
}

/// Records load, show, and memory observations per page.
#[derive(Debug)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    metrics: HashMap<String, PageMetrics>,
    warnings: u64,
}

impl PerformanceMonitor {
    /// Creates a monitor with the given thresholds.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            metrics: HashMap::new(),
            warnings: 0,
        }
    }

    /// Returns whether observations are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Switches recording on or off. Existing observations are kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Records a construction time, warning when it crosses the slow-load
    /// threshold.
    pub fn record_load(&mut self, id: &str, elapsed: Duration) {
        if !self.config.enabled {
            return;
        }
        self.entry(id).load_time = Some(elapsed);
        if elapsed > self.config.slow_load {
            self.warnings += 1;
            warn!(
                page_id = %id,
                load_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_load.as_millis() as u64,
                "monitor.load.slow"
            );
        }
    }

    /// Records an activation time, warning when it crosses the slow-show
    /// threshold.
    pub fn record_show(&mut self, id: &str, elapsed: Duration) {
        if !self.config.enabled {
            return;
        }
        self.entry(id).show_time = Some(elapsed);
        if elapsed > self.config.slow_show {
            self.warnings += 1;
            warn!(
                page_id = %id,
                show_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_show.as_millis() as u64,
                "monitor.show.slow"
            );
        }
    }

    /// Records a memory observation in megabytes, warning when it crosses
    /// the high-memory threshold.
    pub fn record_memory(&mut self, id: &str, memory_mb: f64) {
        if !self.config.enabled {
            return;
        }
        self.entry(id).memory_mb = Some(memory_mb);
        if memory_mb > self.config.high_memory_mb {
            self.warnings += 1;
            warn!(
                page_id = %id,
                memory_mb,
                threshold_mb = self.config.high_memory_mb,
                "monitor.memory.high"
            );
        }
    }

    /// Returns the latest observations for one page.
    pub fn metrics(&self, id: &str) -> Option<&PageMetrics> {
        self.metrics.get(id)
    }

    /// Number of threshold warnings emitted since the last reset.
    pub fn warning_count(&self) -> u64 {
        self.warnings
    }

    /// Builds the aggregate report over every tracked page.
    pub fn report(&self) -> PerformanceReport {
        let loads: Vec<(&String, Duration)> = self
            .metrics
            .iter()
            .filter_map(|(id, m)| m.load_time.map(|t| (id, t)))
            .collect();
        let shows: Vec<Duration> = self
            .metrics
            .values()
            .filter_map(|m| m.show_time)
            .collect();
        let memories: Vec<(&String, f64)> = self
            .metrics
            .iter()
            .filter_map(|(id, m)| m.memory_mb.map(|mb| (id, mb)))
            .collect();

        let average_load_time = mean_duration(loads.iter().map(|(_, t)| *t));
        let average_show_time = mean_duration(shows.iter().copied());
        let average_memory_mb = if memories.is_empty() {
            None
        } else {
            Some(memories.iter().map(|(_, mb)| mb).sum::<f64>() / memories.len() as f64)
        };
        let slowest_load = loads
            .iter()
            .max_by_key(|(_, t)| *t)
            .map(|(id, t)| ((*id).clone(), *t));
        let highest_memory = memories
            .iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, mb)| ((*id).clone(), *mb));

        PerformanceReport {
            total_pages: self.metrics.len(),
            average_load_time,
            average_show_time,
            average_memory_mb,
            slowest_load,
            highest_memory,
        }
    }

    /// Drops every observation and resets the warning counter.
    pub fn reset(&mut self) {
        self.metrics.clear();
        self.warnings = 0;
    }

    fn entry(&mut self, id: &str) -> &mut PageMetrics {
        self.metrics.entry(id.to_owned()).or_default()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

fn mean_duration(values: impl ExactSizeIterator<Item = Duration>) -> Option<Duration> {
    let count = values.len() as u32;
    if count == 0 {
        None
    } else {
        Some(values.sum::<Duration>() / count)
    }
}
