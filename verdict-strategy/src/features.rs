//! Bar-feature helpers shared by the built-in witnesses.

use verdict_core::Bar;

/// True range of a bar given the previous close.
#[must_use]
pub fn true_range(prev_close: f64, bar: &Bar) -> f64 {
    let high_low = bar.high - bar.low;
    let high_close = (bar.high - prev_close).abs();
    let low_close = (bar.low - prev_close).abs();
    high_low.max(high_close).max(low_close)
}

/// Average true range over the trailing `period` bars.
///
/// Requires `period + 1` bars so every bar has a previous close.
#[must_use]
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let window = &bars[bars.len() - period - 1..];
    let mut sum = 0.0;
    for pair in window.windows(2) {
        sum += true_range(pair[0].close, &pair[1]);
    }
    Some(sum / period as f64)
}

/// Ratio of short-term to long-term ATR; values well below 1 indicate a
/// volatility compression.
#[must_use]
pub fn compression_ratio(bars: &[Bar], atr_period: usize, lookback: usize) -> Option<f64> {
    let short = atr(bars, atr_period)?;
    let long = atr(bars, lookback)?;
    if long == 0.0 {
        return None;
    }
    Some(short / long)
}

/// Highest high over the trailing `period` bars, excluding the last
/// `exclude_last` bars.
#[must_use]
pub fn rolling_high(bars: &[Bar], period: usize, exclude_last: usize) -> Option<f64> {
    window(bars, period, exclude_last)?
        .iter()
        .map(|bar| bar.high)
        .fold(None, |acc, value| Some(acc.map_or(value, |prev| prev.max(value))))
}

/// Lowest low over the trailing `period` bars, excluding the last
/// `exclude_last` bars.
#[must_use]
pub fn rolling_low(bars: &[Bar], period: usize, exclude_last: usize) -> Option<f64> {
    window(bars, period, exclude_last)?
        .iter()
        .map(|bar| bar.low)
        .fold(None, |acc, value| Some(acc.map_or(value, |prev| prev.min(value))))
}

fn window(bars: &[Bar], period: usize, exclude_last: usize) -> Option<&[Bar]> {
    if period == 0 || bars.len() < period + exclude_last {
        return None;
    }
    let end = bars.len() - exclude_last;
    Some(&bars[end - period..end])
}

/// Close-to-close change of the last bar as a signed fraction.
#[must_use]
pub fn last_change_pct(bars: &[Bar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }
    let prev = &bars[bars.len() - 2];
    let last = &bars[bars.len() - 1];
    if prev.close == 0.0 {
        return None;
    }
    Some((last.close - prev.close) / prev.close)
}

/// Net signed body over total range across the trailing `period` bars,
/// in `[-1, 1]`. Positive values mean buy pressure.
#[must_use]
pub fn body_imbalance(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let mut signed = 0.0;
    let mut total = 0.0;
    for bar in window {
        signed += bar.close - bar.open;
        total += (bar.high - bar.low).abs();
    }
    if total == 0.0 {
        return None;
    }
    Some((signed / total).clamp(-1.0, 1.0))
}

/// Mean volume over the trailing `period` bars, excluding the last bar.
#[must_use]
pub fn mean_volume(bars: &[Bar], period: usize) -> Option<f64> {
    let window = window(bars, period, 1)?;
    Some(window.iter().map(|bar| bar.volume).sum::<f64>() / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use verdict_core::Interval;

    fn series(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open,
                high,
                low,
                close,
                volume: 1.0,
                timestamp: start + Duration::minutes(i as i64),
            })
            .collect()
    }

    #[test]
    fn atr_requires_enough_bars() {
        let bars = series(&[(100.0, 101.0, 99.0, 100.0); 3]);
        assert!(atr(&bars, 3).is_none());
        assert!(atr(&bars, 2).is_some());
    }

    #[test]
    fn compression_ratio_drops_when_recent_range_narrows() {
        let mut quotes = vec![(100.0, 104.0, 96.0, 100.0); 20];
        quotes.extend(vec![(100.0, 100.5, 99.5, 100.0); 5]);
        let bars = series(&quotes);
        let ratio = compression_ratio(&bars, 5, 20).unwrap();
        assert!(ratio < 0.5, "ratio {ratio} should reflect compression");
    }

    #[test]
    fn rolling_extremes_exclude_recent_bars() {
        let bars = series(&[
            (100.0, 110.0, 90.0, 100.0),
            (100.0, 105.0, 95.0, 100.0),
            (100.0, 120.0, 80.0, 100.0),
        ]);
        assert_eq!(rolling_high(&bars, 2, 1).unwrap(), 110.0);
        assert_eq!(rolling_low(&bars, 2, 1).unwrap(), 90.0);
    }

    #[test]
    fn body_imbalance_is_signed() {
        let up = series(&[(100.0, 102.0, 99.5, 101.8); 5]);
        assert!(body_imbalance(&up, 5).unwrap() > 0.5);
        let down = series(&[(100.0, 100.5, 98.0, 98.2); 5]);
        assert!(body_imbalance(&down, 5).unwrap() < -0.5);
    }
}
