use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, Duration};

use crate::ValidationError;

/// Trailing-return strategy; only changes the lookback fed to fetch and returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "6m")]
    SixMonth,
    #[serde(rename = "12m")]
    TwelveMonth,
}

impl Strategy {
    pub const ALL: [Self; 2] = [Self::SixMonth, Self::TwelveMonth];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SixMonth => "6m",
            Self::TwelveMonth => "12m",
        }
    }

    pub const fn lookback_weeks(self) -> i64 {
        match self {
            Self::SixMonth => 26,
            Self::TwelveMonth => 52,
        }
    }

    pub fn lookback(self) -> Duration {
        Duration::weeks(self.lookback_weeks())
    }

    /// Portfolio file each strategy keeps its paper holdings in.
    pub const fn default_portfolio_file(self) -> &'static str {
        match self {
            Self::SixMonth => "portfolio6.csv",
            Self::TwelveMonth => "portfolio.csv",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "6m" => Ok(Self::SixMonth),
            "12m" => Ok(Self::TwelveMonth),
            other => Err(ValidationError::InvalidStrategy {
                value: other.to_owned(),
            }),
        }
    }
}

/// Candle granularity requested from the price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date range shared by every fetch in one rebalance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub granularity: Granularity,
    pub start_date: Date,
    pub end_date: Date,
}

impl HistoryWindow {
    pub fn for_strategy(strategy: Strategy, as_of: Date) -> Self {
        Self {
            granularity: Granularity::Month,
            start_date: as_of.saturating_sub(strategy.lookback()),
            end_date: as_of,
        }
    }

    /// Daily candles for the week leading up to `as_of`, used to price a
    /// position on a given day.
    pub fn pricing(as_of: Date) -> Self {
        Self {
            granularity: Granularity::Day,
            start_date: as_of.saturating_sub(Duration::days(7)),
            end_date: as_of,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.end_date - self.start_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_strategy() {
        assert_eq!(Strategy::from_str("12M").expect("must parse"), Strategy::TwelveMonth);
        assert_eq!(Strategy::from_str("6m").expect("must parse"), Strategy::SixMonth);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = Strategy::from_str("3m").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidStrategy { .. }));
    }

    #[test]
    fn window_spans_the_strategy_lookback() {
        let window = HistoryWindow::for_strategy(Strategy::SixMonth, date!(2025 - 07 - 01));
        assert_eq!(window.end_date, date!(2025 - 07 - 01));
        assert_eq!(window.start_date, date!(2024 - 12 - 31));
        assert_eq!(window.lookback(), Duration::weeks(26));
    }

    #[test]
    fn pricing_window_is_one_week_of_daily_candles() {
        let window = HistoryWindow::pricing(date!(2025 - 03 - 03));
        assert_eq!(window.granularity, Granularity::Day);
        assert_eq!(window.start_date, date!(2025 - 02 - 24));
        assert_eq!(window.lookback(), Duration::days(7));
    }
}
