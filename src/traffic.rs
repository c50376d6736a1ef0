//! Interface byte counters and transfer-rate sampling.
//!
//! The router only exposes cumulative RX/TX byte counters. Rates are derived
//! from two readings at least [`RATE_FLOOR_SECS`](crate::config::RATE_FLOOR_SECS)
//! apart; calls in between get the last computed rate back unchanged.

use std::time::{Duration, Instant};

use log::{debug, trace};
use moka::future::Cache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cumulative bytes received and sent on the WAN-facing interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ByteTotals {
    pub rx: u64,
    pub tx: u64,
}

impl ByteTotals {
    pub fn new(rx: u64, tx: u64) -> Self {
        Self { rx, tx }
    }
}

/// Transfer rates in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransferRates {
    pub rx: u64,
    pub tx: u64,
}

impl TransferRates {
    /// Formats both rates as `"<size>/s"`.
    pub fn human_readable(&self) -> (String, String) {
        (
            format!("{}/s", convert_size(self.rx)),
            format!("{}/s", convert_size(self.tx)),
        )
    }
}

/// Rate state carried between calls for one router.
#[derive(Debug, Clone)]
pub struct RateTracker {
    floor: Duration,
    latest: Option<ByteTotals>,
    latest_check: Option<Instant>,
    rates: TransferRates,
}

impl RateTracker {
    pub fn new(floor: Duration) -> Self {
        Self {
            floor,
            latest: None,
            latest_check: None,
            rates: TransferRates::default(),
        }
    }

    /// Feeds a counter reading taken at `now` and returns the current rates.
    ///
    /// The first reading only sets the baseline and yields zero. Readings
    /// closer than the floor to the last computation return the cached rate.
    pub fn update(&mut self, sample: ByteTotals, now: Instant) -> TransferRates {
        let (Some(previous), Some(checked_at)) = (self.latest, self.latest_check) else {
            debug!("Transfer baseline set: rx={} tx={}", sample.rx, sample.tx);
            self.latest = Some(sample);
            self.latest_check = Some(now);
            return self.rates;
        };

        let elapsed = now.saturating_duration_since(checked_at);
        if elapsed < self.floor || elapsed.is_zero() {
            trace!("Rate sample skipped, only {:?} elapsed", elapsed);
            return self.rates;
        }

        let rx = counter_delta(previous.rx, sample.rx);
        let tx = counter_delta(previous.tx, sample.tx);
        let secs = elapsed.as_secs_f64();

        self.latest = Some(sample);
        self.latest_check = Some(now);
        self.rates = TransferRates {
            rx: per_second(rx, secs),
            tx: per_second(tx, secs),
        };
        debug!(
            "Transfer rates over {:.1}s: rx={} B/s tx={} B/s",
            secs, self.rates.rx, self.rates.tx
        );
        self.rates
    }

    /// Last computed rates.
    pub fn rates(&self) -> TransferRates {
        self.rates
    }
}

/// Bytes transferred between two counter readings.
///
/// A reading below the previous one means the counter restarted, so the new
/// value itself is the amount counted since.
fn counter_delta(previous: u64, current: u64) -> u64 {
    if current < previous {
        current
    } else {
        current - previous
    }
}

fn per_second(bytes: u64, secs: f64) -> u64 {
    if bytes == 0 {
        return 0;
    }
    (bytes as f64 / secs).ceil() as u64
}

/// Short-lived cache of the last byte totals, so a burst of polls issues
/// the counter commands only once.
#[derive(Clone)]
pub struct ByteTotalsCache {
    cache: Option<Cache<(), ByteTotals>>,
}

impl ByteTotalsCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| Cache::builder().max_capacity(1).time_to_live(ttl).build());
        Self { cache }
    }

    pub async fn get(&self) -> Option<ByteTotals> {
        match self.cache.as_ref() {
            Some(cache) => cache.get(&()).await,
            None => None,
        }
    }

    pub async fn insert(&self, totals: ByteTotals) {
        if let Some(cache) = self.cache.as_ref() {
            cache.insert((), totals).await;
        }
    }
}

const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Formats a byte count with 1024-based units, e.g. `1.5 KB`.
pub fn convert_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", format_decimal(rounded), SIZE_UNITS[unit])
}

/// Prints at most two decimals and always keeps one, like `1.0` or `1.25`.
fn format_decimal(value: f64) -> String {
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0');
    if text.ends_with('.') {
        format!("{text}0")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: Duration = Duration::from_secs(30);

    #[test]
    fn first_reading_sets_baseline() {
        let mut tracker = RateTracker::new(FLOOR);
        let rates = tracker.update(ByteTotals::new(100, 100), Instant::now());
        assert_eq!(rates, TransferRates::default());
    }

    #[test]
    fn rates_round_up_after_floor() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(FLOOR);
        tracker.update(ByteTotals::new(100, 100), start);

        let rates = tracker.update(ByteTotals::new(1100, 600), start + Duration::from_secs(30));
        assert_eq!(rates, TransferRates { rx: 34, tx: 17 });
    }

    #[test]
    fn readings_inside_floor_return_cached_rates() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(FLOOR);
        tracker.update(ByteTotals::new(100, 100), start);
        let computed = tracker.update(ByteTotals::new(1100, 600), start + Duration::from_secs(30));

        let cached = tracker.update(
            ByteTotals::new(9_000_000, 9_000_000),
            start + Duration::from_secs(45),
        );
        assert_eq!(cached, computed);
        assert_eq!(tracker.rates(), computed);
    }

    #[test]
    fn counter_reset_uses_new_reading_as_delta() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(FLOOR);
        tracker.update(ByteTotals::new(100, 100), start);
        tracker.update(ByteTotals::new(1100, 600), start + Duration::from_secs(30));

        let rates = tracker.update(ByteTotals::new(50, 600), start + Duration::from_secs(80));
        assert_eq!(rates, TransferRates { rx: 1, tx: 0 });
    }

    #[test]
    fn sub_floor_elapsed_is_measured_from_last_computation() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(FLOOR);
        tracker.update(ByteTotals::new(0, 0), start);
        tracker.update(ByteTotals::new(600, 0), start + Duration::from_secs(20));

        let rates = tracker.update(ByteTotals::new(600, 0), start + Duration::from_secs(60));
        assert_eq!(rates, TransferRates { rx: 10, tx: 0 });
    }

    #[test]
    fn convert_size_uses_binary_units() {
        assert_eq!(convert_size(0), "0B");
        assert_eq!(convert_size(512), "512.0 B");
        assert_eq!(convert_size(1024), "1.0 KB");
        assert_eq!(convert_size(1536), "1.5 KB");
        assert_eq!(convert_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn human_readable_rates_append_per_second() {
        let rates = TransferRates { rx: 2048, tx: 0 };
        assert_eq!(
            rates.human_readable(),
            ("2.0 KB/s".to_string(), "0B/s".to_string())
        );
    }

    #[tokio::test]
    async fn cache_returns_value_within_ttl() {
        let cache = ByteTotalsCache::new(Duration::from_secs(5));
        assert_eq!(cache.get().await, None);
        cache.insert(ByteTotals::new(1, 2)).await;
        assert_eq!(cache.get().await, Some(ByteTotals::new(1, 2)));
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let cache = ByteTotalsCache::new(Duration::ZERO);
        cache.insert(ByteTotals::new(1, 2)).await;
        assert_eq!(cache.get().await, None);
    }
}
