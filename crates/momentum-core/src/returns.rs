//! Trailing-return computation over a price series.

use time::{Date, Duration};

use crate::{DataError, PricePoint, PriceSeries};

/// Monthly candles are stamped at month boundaries, so the point nearest a
/// lookback boundary can sit a few weeks away from it.
pub const DEFAULT_TOLERANCE_DAYS: i64 = 35;

/// Percentage return between the point nearest `as_of - period` and the last
/// point on or before `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnsCalculator {
    tolerance: Duration,
}

impl Default for ReturnsCalculator {
    fn default() -> Self {
        Self {
            tolerance: Duration::days(DEFAULT_TOLERANCE_DAYS),
        }
    }
}

impl ReturnsCalculator {
    pub fn with_tolerance(tolerance: Duration) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub const fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn compute(
        &self,
        series: &PriceSeries,
        period: Duration,
        as_of: Date,
    ) -> Result<f64, DataError> {
        let points = series.points();
        if points.len() < 2 {
            return Err(DataError::insufficient(format!(
                "need at least 2 prices, got {}",
                points.len()
            )));
        }

        let end = points
            .iter()
            .rev()
            .find(|point| point.date <= as_of)
            .ok_or_else(|| DataError::insufficient(format!("no price on or before {as_of}")))?;

        if as_of - end.date > self.tolerance {
            return Err(DataError::insufficient(format!(
                "latest price {} is stale for {as_of}",
                end.date
            )));
        }

        let boundary = as_of.saturating_sub(period);
        let start = self.start_point(points, boundary).ok_or_else(|| {
            DataError::insufficient(format!("no price within tolerance of {boundary}"))
        })?;

        if start.date >= end.date {
            return Err(DataError::insufficient(format!(
                "start {} is not before end {}",
                start.date, end.date
            )));
        }

        let pct = (end.close - start.close) / start.close * 100.0;
        if !pct.is_finite() {
            return Err(DataError::insufficient("return is not finite"));
        }
        Ok(pct)
    }

    /// First point on or after the boundary when it is close enough, otherwise
    /// whichever point lies nearest the boundary within tolerance.
    fn start_point<'a>(&self, points: &'a [PricePoint], boundary: Date) -> Option<&'a PricePoint> {
        let within = |point: &&PricePoint| (point.date - boundary).abs() <= self.tolerance;

        if let Some(point) = points.iter().find(|point| point.date >= boundary) {
            if within(&point) {
                return Some(point);
            }
        }

        points
            .iter()
            .filter(within)
            .min_by_key(|point| ((point.date - boundary).abs(), point.date))
    }
}

/// [`ReturnsCalculator::compute`] with the default tolerance.
pub fn compute_return(series: &PriceSeries, period: Duration, as_of: Date) -> Result<f64, DataError> {
    ReturnsCalculator::default().compute(series, period, as_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn series(points: &[(Date, f64)]) -> PriceSeries {
        PriceSeries::new(
            points
                .iter()
                .map(|&(date, close)| PricePoint { date, close })
                .collect(),
        )
        .expect("valid series")
    }

    #[test]
    fn computes_percentage_return_over_lookback() {
        let series = series(&[
            (date!(2025 - 01 - 01), 100.0),
            (date!(2025 - 04 - 01), 110.0),
            (date!(2025 - 07 - 01), 125.0),
        ]);

        let pct = compute_return(&series, Duration::weeks(26), date!(2025 - 07 - 01))
            .expect("return");
        assert!((pct - 25.0).abs() < 1e-9, "pct={pct}");
    }

    #[test]
    fn negative_returns_are_preserved() {
        let series = series(&[(date!(2024 - 07 - 01), 200.0), (date!(2025 - 07 - 01), 150.0)]);

        let pct = compute_return(&series, Duration::weeks(52), date!(2025 - 07 - 01))
            .expect("return");
        assert!((pct + 25.0).abs() < 1e-9, "pct={pct}");
    }

    #[test]
    fn ignores_points_after_as_of() {
        let series = series(&[
            (date!(2025 - 01 - 01), 100.0),
            (date!(2025 - 07 - 01), 120.0),
            (date!(2025 - 08 - 01), 500.0),
        ]);

        let pct = compute_return(&series, Duration::weeks(26), date!(2025 - 07 - 01))
            .expect("return");
        assert!((pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn single_point_is_insufficient() {
        let series = series(&[(date!(2025 - 07 - 01), 100.0)]);
        let err = compute_return(&series, Duration::weeks(26), date!(2025 - 07 - 01))
            .expect_err("must fail");
        assert!(matches!(err, DataError::InsufficientHistory { .. }));
    }

    #[test]
    fn short_listing_history_is_insufficient() {
        // Listed in May; a 12-month lookback has nothing near its boundary.
        let series = series(&[(date!(2025 - 05 - 01), 100.0), (date!(2025 - 07 - 01), 130.0)]);
        let err = compute_return(&series, Duration::weeks(52), date!(2025 - 07 - 01))
            .expect_err("must fail");
        assert!(matches!(err, DataError::InsufficientHistory { .. }));
    }

    #[test]
    fn stale_end_point_is_insufficient() {
        let series = series(&[(date!(2024 - 07 - 01), 100.0), (date!(2025 - 01 - 01), 130.0)]);
        let err = compute_return(&series, Duration::weeks(52), date!(2025 - 07 - 01))
            .expect_err("must fail");
        assert!(matches!(err, DataError::InsufficientHistory { .. }));
    }

    #[test]
    fn falls_back_to_nearest_point_before_boundary() {
        // Boundary is 2024-12-31; the only nearby point is a few days earlier.
        let series = series(&[
            (date!(2024 - 12 - 27), 80.0),
            (date!(2025 - 03 - 01), 90.0),
            (date!(2025 - 07 - 01), 100.0),
        ]);

        let calculator = ReturnsCalculator::with_tolerance(Duration::days(10));
        let pct = calculator
            .compute(&series, Duration::weeks(26), date!(2025 - 07 - 01))
            .expect("return");
        assert!((pct - 25.0).abs() < 1e-9, "pct={pct}");
    }
}
