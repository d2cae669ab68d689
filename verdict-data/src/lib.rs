//! Market data contract consumed by the decision loop.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use verdict_core::{Bar, Interval, Symbol};

/// Result alias for data source operations.
pub type DataResult<T> = Result<T, DataError>;

/// Failure variants surfaced by data sources. Both skip the current loop.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no bars found for {symbol} in the requested range")]
    NotFound { symbol: Symbol },
    #[error("bar series failed validation: {0}")]
    Validation(String),
    #[error("data source error: {0}")]
    Source(String),
}

/// Supplies ordered, gap-free bar sequences per symbol.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch bars in `[since, until)`, ordered by timestamp ascending.
    async fn bars(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DataResult<Vec<Bar>>;
}

/// Validate ordering and continuity of a bar series for the given interval.
///
/// No gaps are permitted within a queried range.
pub fn validate_continuity(bars: &[Bar], interval: Interval) -> DataResult<()> {
    let step = interval.as_duration();
    for window in bars.windows(2) {
        let prev = &window[0];
        let next = &window[1];
        if next.timestamp <= prev.timestamp {
            return Err(DataError::Validation(format!(
                "bars out of order at {}",
                next.timestamp
            )));
        }
        if next.timestamp - prev.timestamp != step {
            return Err(DataError::Validation(format!(
                "gap between {} and {}",
                prev.timestamp, next.timestamp
            )));
        }
    }
    Ok(())
}

/// In-memory source replaying preloaded bars; used in tests and dry runs.
#[derive(Default)]
pub struct ReplaySource {
    series: Mutex<HashMap<Symbol, Vec<Bar>>>,
}

impl ReplaySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a full series for a symbol, replacing any previous one.
    pub fn load(&self, symbol: impl Into<Symbol>, mut bars: Vec<Bar>) {
        bars.sort_by_key(|bar| bar.timestamp);
        self.series
            .lock()
            .expect("replay source poisoned")
            .insert(symbol.into(), bars);
    }

    /// Append one bar to a symbol's series.
    pub fn push(&self, bar: Bar) {
        self.series
            .lock()
            .expect("replay source poisoned")
            .entry(bar.symbol.clone())
            .or_default()
            .push(bar);
    }
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn bars(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DataResult<Vec<Bar>> {
        let series = self.series.lock().expect("replay source poisoned");
        let bars: Vec<Bar> = series
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|bar| bar.timestamp >= since && bar.timestamp < until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(DataError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        validate_continuity(&bars, interval)?;
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(ts: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            symbol: "BTCUSDT".into(),
            interval: Interval::OneMinute,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            timestamp: ts,
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn continuity_rejects_gaps() {
        let start = base();
        let bars = vec![
            bar(start, 100.0),
            bar(start + Duration::minutes(1), 101.0),
            bar(start + Duration::minutes(3), 102.0),
        ];
        assert!(validate_continuity(&bars, Interval::OneMinute).is_err());
    }

    #[test]
    fn continuity_accepts_dense_series() {
        let start = base();
        let bars: Vec<Bar> = (0..5)
            .map(|i| bar(start + Duration::minutes(i), 100.0 + i as f64))
            .collect();
        assert!(validate_continuity(&bars, Interval::OneMinute).is_ok());
    }

    #[tokio::test]
    async fn replay_source_filters_by_range() {
        let source = ReplaySource::new();
        let start = base();
        for i in 0..10 {
            source.push(bar(start + Duration::minutes(i), 100.0));
        }
        let bars = source
            .bars(
                "BTCUSDT",
                Interval::OneMinute,
                start + Duration::minutes(2),
                start + Duration::minutes(6),
            )
            .await
            .unwrap();
        assert_eq!(bars.len(), 4);

        let missing = source
            .bars("ETHUSDT", Interval::OneMinute, start, start + Duration::minutes(5))
            .await;
        assert!(matches!(missing, Err(DataError::NotFound { .. })));
    }
}
