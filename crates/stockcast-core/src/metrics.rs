use serde::{Deserialize, Serialize};
use time::Date;

use crate::data_source::SourceError;
use crate::NormalizedSeries;

/// Default trailing window for the moving average.
pub const DEFAULT_MA_WINDOW: usize = 5;

/// Summary indicators derived from a normalized series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub last_close: f64,
    pub prev_close: f64,
    /// Day-over-day change in percent.
    pub pct_change: f64,
    pub moving_average: f64,
    /// Number of closes actually averaged.
    pub window: usize,
    /// Date of the last bar.
    pub as_of: Date,
}

/// Derives last price, day-over-day change and a trailing moving average.
///
/// Needs at least two bars and a non-zero previous close.
pub fn derive(series: &NormalizedSeries, trailing_n: usize) -> Result<DerivedMetrics, SourceError> {
    let bars = series.bars();
    let [.., prev, last] = bars else {
        return Err(SourceError::insufficient_data(format!(
            "{} has {} bar(s); day-over-day change needs 2",
            series.symbol(),
            bars.len()
        )));
    };

    if prev.close == 0.0 {
        return Err(SourceError::insufficient_data(format!(
            "{} previous close on {} is zero",
            series.symbol(),
            prev.date
        )));
    }

    let (moving_average, window) = trailing_mean(series, trailing_n)?;

    Ok(DerivedMetrics {
        last_close: last.close,
        prev_close: prev.close,
        pct_change: (last.close - prev.close) / prev.close * 100.0,
        moving_average,
        window,
        as_of: last.date,
    })
}

/// Mean of the last `n` closes, truncated to what the series holds.
///
/// `n = 0` is treated as 1. Fails only on an empty series.
pub fn moving_average(series: &NormalizedSeries, n: usize) -> Result<f64, SourceError> {
    trailing_mean(series, n).map(|(mean, _)| mean)
}

fn trailing_mean(series: &NormalizedSeries, n: usize) -> Result<(f64, usize), SourceError> {
    let window = n.max(1).min(series.len());
    if window == 0 {
        return Err(SourceError::insufficient_data(format!(
            "{} has no bars to average",
            series.symbol()
        )));
    }

    let sum: f64 = series.closes().rev().take(window).sum();
    Ok((sum / window as f64, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NormalizedBar, Symbol};
    use time::{Duration, Month};

    fn series(closes: &[f64]) -> NormalizedSeries {
        let start = Date::from_calendar_date(2024, Month::January, 1).expect("valid date");
        let bars = closes
            .iter()
            .enumerate()
            .map(|(offset, close)| {
                NormalizedBar::new(
                    start + Duration::days(offset as i64),
                    *close,
                    *close,
                    *close,
                    *close,
                    1_000,
                )
                .expect("valid bar")
            })
            .collect();
        NormalizedSeries::new(Symbol::parse("2330").expect("valid"), bars).expect("ordered")
    }

    #[test]
    fn derives_change_and_trailing_average() {
        let closes = (100..110).map(f64::from).collect::<Vec<_>>();
        let metrics = derive(&series(&closes), 5).expect("enough data");

        assert_eq!(metrics.last_close, 109.0);
        assert_eq!(metrics.prev_close, 108.0);
        assert!((metrics.pct_change - 0.925_925_9).abs() < 1e-6);
        assert_eq!(metrics.moving_average, 107.0);
        assert_eq!(metrics.window, 5);
    }

    #[test]
    fn single_bar_has_average_but_no_change() {
        let single = series(&[42.0]);

        let err = derive(&single, 5).expect_err("one bar is not enough");
        assert_eq!(err.code(), "source.insufficient_data");
        assert_eq!(moving_average(&single, 5), Ok(42.0));
    }

    #[test]
    fn window_truncates_and_zero_means_one() {
        let short = series(&[1.0, 2.0, 3.0]);

        assert_eq!(moving_average(&short, 10), Ok(2.0));
        assert_eq!(moving_average(&short, 0), Ok(3.0));
    }

    #[test]
    fn zero_previous_close_is_insufficient() {
        let err = derive(&series(&[0.0, 5.0]), 5).expect_err("division by zero");
        assert_eq!(err.code(), "source.insufficient_data");
    }

    #[test]
    fn empty_series_has_no_average() {
        let empty = NormalizedSeries::empty(Symbol::parse("2330").expect("valid"));
        assert!(moving_average(&empty, 5).is_err());
    }
}
