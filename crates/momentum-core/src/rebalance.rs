//! One monthly rebalance: fetch, rank, decide.
//!
//! All inputs travel in [`RebalanceRequest`]; the pipeline holds no mutable
//! state between runs. Persisting the target portfolio is left to the caller
//! so dry runs share the exact same path.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;
use time::Date;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::decision::{decide_for, Decision};
use crate::fetch::PriceFetcher;
use crate::ranking::{rank, RankedList, Selection, BUY_RANK, KEEP_RANK};
use crate::returns::ReturnsCalculator;
use crate::source::{FetchError, FetchErrorKind, HistoryRequest};
use crate::{HistoryWindow, Instrument, Portfolio, PriceSeries, ReturnRecord, Strategy, Symbol};

#[derive(Debug, Clone)]
pub struct RebalanceRequest {
    pub strategy: Strategy,
    pub as_of: Date,
    pub universe: Vec<Instrument>,
    pub current: Portfolio,
}

/// Why a symbol was left out of the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited,
    Transient,
    NotFound,
    InvalidData,
    InsufficientHistory,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::NotFound => "not_found",
            Self::InvalidData => "invalid_data",
            Self::InsufficientHistory => "insufficient_history",
        }
    }

    fn from_fetch(kind: FetchErrorKind) -> Option<Self> {
        match kind {
            FetchErrorKind::RateLimited => Some(Self::RateLimited),
            FetchErrorKind::Transient => Some(Self::Transient),
            FetchErrorKind::NotFound => Some(Self::NotFound),
            FetchErrorKind::InvalidData => Some(Self::InvalidData),
            FetchErrorKind::Fatal => None,
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: Symbol,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub as_of: Date,
    pub window: HistoryWindow,
    pub universe_size: usize,
    pub ranked: RankedList,
    pub selection: Selection,
    pub decision: Decision,
    pub skipped: Vec<SkippedSymbol>,
    pub cache: CacheStats,
    pub target: Portfolio,
}

impl RebalanceReport {
    pub fn top_performers(&self, n: usize) -> &[ReturnRecord] {
        let records = self.ranked.records();
        &records[..n.min(records.len())]
    }
}

#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("universe is empty")]
    EmptyUniverse,
    #[error("rebalance aborted while fetching {symbol}: {source}")]
    Fatal {
        symbol: Symbol,
        #[source]
        source: FetchError,
    },
    #[error("no symbol produced a usable return ({skipped} skipped); refusing to rebalance")]
    NoUsableReturns { skipped: usize },
    #[error("fetch worker failed: {0}")]
    Worker(String),
}

pub struct Rebalancer {
    fetcher: PriceFetcher,
    calculator: ReturnsCalculator,
    buy_n: usize,
    keep_n: usize,
}

impl Rebalancer {
    pub fn new(fetcher: PriceFetcher) -> Self {
        Self {
            fetcher,
            calculator: ReturnsCalculator::default(),
            buy_n: BUY_RANK,
            keep_n: KEEP_RANK,
        }
    }

    pub fn fetcher(&self) -> &PriceFetcher {
        &self.fetcher
    }

    pub async fn run(&self, request: &RebalanceRequest) -> Result<RebalanceReport, RebalanceError> {
        if request.universe.is_empty() {
            return Err(RebalanceError::EmptyUniverse);
        }

        let run_id = Uuid::new_v4();
        let window = HistoryWindow::for_strategy(request.strategy, request.as_of);
        info!(
            %run_id,
            strategy = %request.strategy,
            as_of = %request.as_of,
            universe = request.universe.len(),
            holdings = request.current.len(),
            "rebalance started"
        );

        match self.fetcher.cache().purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired cache entries"),
            Err(error) => warn!(%error, "cache sweep failed"),
        }

        let histories = self.fetch_all(&request.universe, window).await?;

        let mut records = Vec::with_capacity(histories.len());
        let mut skipped = Vec::new();
        for (symbol, outcome) in histories {
            match outcome.and_then(|series| self.record_for(&symbol, &series, request)) {
                Ok(record) => records.push(record),
                Err(skip) => skipped.push(skip),
            }
        }

        for skip in &skipped {
            match skip.reason {
                SkipReason::RateLimited | SkipReason::Transient => {
                    warn!(
                        symbol = %skip.symbol,
                        reason = %skip.reason,
                        detail = %skip.detail,
                        "symbol skipped"
                    );
                }
                _ => {
                    info!(
                        symbol = %skip.symbol,
                        reason = %skip.reason,
                        detail = %skip.detail,
                        "symbol skipped"
                    );
                }
            }
        }

        if records.is_empty() {
            return Err(RebalanceError::NoUsableReturns {
                skipped: skipped.len(),
            });
        }

        let ranked = rank(records);
        let selection = Selection::from_ranked(&ranked, self.buy_n, self.keep_n);
        let decision = decide_for(&request.current, &selection);
        let target = request.current.rebalanced(&decision);

        let cache = self.fetcher.cache().stats().await.unwrap_or_else(|error| {
            warn!(%error, "cache stats unavailable");
            CacheStats::default()
        });

        info!(
            %run_id,
            ranked = ranked.len(),
            skipped = skipped.len(),
            buy = decision.buy.len(),
            sell = decision.sell.len(),
            hold = decision.hold.len(),
            degraded = selection.degraded,
            "rebalance decided"
        );

        Ok(RebalanceReport {
            run_id,
            strategy: request.strategy,
            as_of: request.as_of,
            window,
            universe_size: request.universe.len(),
            ranked,
            selection,
            decision,
            skipped,
            cache,
            target,
        })
    }

    /// Fetches every instrument with at most `max_concurrency` tasks alive.
    /// Results are keyed by symbol so downstream order is deterministic.
    async fn fetch_all(
        &self,
        universe: &[Instrument],
        window: HistoryWindow,
    ) -> Result<BTreeMap<Symbol, Result<PriceSeries, SkippedSymbol>>, RebalanceError> {
        let limit = self.fetcher.policy().max_concurrency.max(1);
        let mut pending = universe.iter().cloned();
        let mut tasks = JoinSet::new();
        let mut results = BTreeMap::new();

        loop {
            while tasks.len() < limit {
                let Some(instrument) = pending.next() else {
                    break;
                };
                let fetcher = self.fetcher.clone();
                tasks.spawn(async move {
                    let request = HistoryRequest::new(instrument, window);
                    let outcome = fetcher.fetch(&request).await;
                    (request.instrument.symbol, outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (symbol, outcome) =
                joined.map_err(|error| RebalanceError::Worker(error.to_string()))?;

            let outcome = match outcome {
                Ok(series) => Ok(series),
                Err(error) => match SkipReason::from_fetch(error.kind()) {
                    Some(reason) => Err(SkippedSymbol {
                        symbol: symbol.clone(),
                        reason,
                        detail: error.to_string(),
                    }),
                    None => {
                        tasks.abort_all();
                        warn!(%symbol, %error, "fatal fetch error; aborting run");
                        return Err(RebalanceError::Fatal { symbol, source: error });
                    }
                },
            };
            results.insert(symbol, outcome);
        }

        Ok(results)
    }

    fn record_for(
        &self,
        symbol: &Symbol,
        series: &PriceSeries,
        request: &RebalanceRequest,
    ) -> Result<ReturnRecord, SkippedSymbol> {
        let skip = |detail: String| SkippedSymbol {
            symbol: symbol.clone(),
            reason: SkipReason::InsufficientHistory,
            detail,
        };

        let pct = self
            .calculator
            .compute(series, request.strategy.lookback(), request.as_of)
            .map_err(|error| skip(error.to_string()))?;
        ReturnRecord::new(symbol.clone(), pct, request.as_of).map_err(|error| skip(error.to_string()))
    }
}
