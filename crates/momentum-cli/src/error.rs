use momentum_core::{BacktestError, CacheError, PortfolioError, RebalanceError, UniverseError};
use thiserror::Error;

use crate::config::ConfigError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] momentum_core::ValidationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Rebalance(#[from] RebalanceError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) | Self::Universe(_) => 3,
            Self::Rebalance(RebalanceError::Fatal { .. }) => 4,
            Self::Rebalance(_) => 12,
            Self::Backtest(BacktestError::InvalidCapital(_) | BacktestError::Schedule { .. }) => 2,
            Self::Backtest(
                BacktestError::Rebalance(RebalanceError::Fatal { .. })
                | BacktestError::Pricing { .. },
            ) => 4,
            Self::Backtest(_) => 12,
            Self::Serialization(_) => 5,
            Self::Portfolio(_) | Self::Io(_) => 10,
            Self::Cache(_) => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momentum_core::{FetchError, Symbol};

    #[test]
    fn fatal_fetch_and_aborted_runs_have_distinct_codes() {
        let fatal = CliError::from(RebalanceError::Fatal {
            symbol: Symbol::parse("TCS").expect("valid"),
            source: FetchError::fatal("upstox returned status 401"),
        });
        let aborted = CliError::from(RebalanceError::NoUsableReturns { skipped: 200 });

        assert_eq!(fatal.exit_code(), 4);
        assert_eq!(aborted.exit_code(), 12);
        assert_eq!(CliError::from(ConfigError::MissingToken).exit_code(), 3);
    }

    #[test]
    fn backtest_failures_reuse_rebalance_codes() {
        let fatal = CliError::from(BacktestError::Pricing {
            symbol: Symbol::parse("TCS").expect("valid"),
            date: time::macros::date!(2025 - 01 - 01),
            source: FetchError::fatal("upstox returned status 401"),
        });
        let empty = CliError::from(BacktestError::Rebalance(RebalanceError::EmptyUniverse));

        assert_eq!(fatal.exit_code(), 4);
        assert_eq!(empty.exit_code(), 12);
        assert_eq!(CliError::from(BacktestError::InvalidCapital(0.0)).exit_code(), 2);
    }
}
