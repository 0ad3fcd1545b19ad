//! Monthly replay of a strategy over a paper account.
//!
//! Each scheduled date runs the regular [`Rebalancer`] against the positions
//! held at that point, then trades the decision at that day's closing prices:
//! sells go to cash first, and every buy gets an equal slice of the cash
//! (`cash / top20`). Values are recorded after trading.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use time::{Date, Month};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::fetch::PriceFetcher;
use crate::rebalance::{RebalanceError, RebalanceRequest, Rebalancer};
use crate::source::{FetchError, HistoryRequest};
use crate::{HistoryWindow, Holding, Instrument, Portfolio, PriceSeries, Strategy, Symbol};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 1_000_000.0;
pub const DEFAULT_BACKTEST_MONTHS: u32 = 12;

const MONTHS_PER_YEAR: f64 = 12.0;
const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub strategy: Strategy,
    pub end: Date,
    pub months: u32,
    pub universe: Vec<Instrument>,
}

/// Account state after trading on one scheduled date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestPoint {
    pub date: Date,
    pub value: f64,
    pub cash: f64,
    pub holdings: usize,
    pub buys: BTreeSet<Symbol>,
    pub sells: BTreeSet<Symbol>,
    /// False when no symbol could be ranked and positions were carried over.
    pub rebalanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Population standard deviation of monthly returns, annualized.
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub rebalances: usize,
}

impl BacktestSummary {
    pub fn from_points(initial_capital: f64, points: &[BacktestPoint]) -> Self {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Self {
                initial_capital,
                final_value: initial_capital,
                total_return: 0.0,
                annualized_return: 0.0,
                volatility: 0.0,
                sharpe: 0.0,
                max_drawdown: 0.0,
                rebalances: 0,
            };
        };

        let final_value = last.value;
        let growth = final_value / initial_capital;
        let years = (last.date - first.date).whole_days() as f64 / DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && growth > 0.0 {
            growth.powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let values: Vec<f64> = points.iter().map(|point| point.value).collect();
        let monthly: Vec<f64> = values
            .windows(2)
            .filter(|pair| pair[0] > 0.0)
            .map(|pair| pair[1] / pair[0] - 1.0)
            .collect();
        let volatility = population_std(&monthly) * MONTHS_PER_YEAR.sqrt();
        let sharpe = if volatility > 0.0 {
            annualized_return / volatility
        } else {
            0.0
        };

        Self {
            initial_capital,
            final_value,
            total_return: growth - 1.0,
            annualized_return,
            volatility,
            sharpe,
            max_drawdown: max_drawdown(&values),
            rebalances: points.iter().filter(|point| point.rebalanced).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub start: Date,
    pub end: Date,
    pub points: Vec<BacktestPoint>,
    pub summary: BacktestSummary,
    pub cache: CacheStats,
}

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("initial capital must be positive, got {0}")]
    InvalidCapital(f64),
    #[error("cannot schedule {months} months back from {end}")]
    Schedule { end: Date, months: u32 },
    #[error(transparent)]
    Rebalance(#[from] RebalanceError),
    #[error("pricing {symbol} on {date} failed: {source}")]
    Pricing {
        symbol: Symbol,
        date: Date,
        #[source]
        source: FetchError,
    },
    #[error("pricing worker failed: {0}")]
    Worker(String),
}

/// Rebalance dates from `months` months before `end` up to `end`, one per
/// month. Days past the end of a shorter month clamp to its last day.
pub fn monthly_schedule(end: Date, months: u32) -> Result<Vec<Date>, BacktestError> {
    (0..=months)
        .rev()
        .map(|back| months_before(end, back).ok_or(BacktestError::Schedule { end, months }))
        .collect()
}

fn months_before(date: Date, months: u32) -> Option<Date> {
    let index = date.year() * 12 + i32::from(u8::from(date.month())) - 1
        - i32::try_from(months).ok()?;
    let year = index.div_euclid(12);
    let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
    let last_day = (28..=31)
        .rev()
        .find(|day| Date::from_calendar_date(year, month, *day).is_ok())?;
    Date::from_calendar_date(year, month, date.day().min(last_day)).ok()
}

#[derive(Debug, Clone, Copy)]
struct Position {
    units: f64,
    last_price: f64,
}

/// Paper account: cash plus fractional positions marked at the last seen close.
#[derive(Debug, Clone)]
struct Book {
    cash: f64,
    positions: BTreeMap<Symbol, Position>,
}

impl Book {
    fn new(cash: f64) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
        }
    }

    fn portfolio(&self) -> Portfolio {
        self.positions
            .keys()
            .cloned()
            .map(Holding::paper)
            .collect()
    }

    fn mark(&mut self, prices: &BTreeMap<Symbol, f64>) {
        for (symbol, position) in &mut self.positions {
            if let Some(price) = prices.get(symbol) {
                position.last_price = *price;
            }
        }
    }

    fn sell(&mut self, symbol: &Symbol) -> bool {
        match self.positions.remove(symbol) {
            Some(position) => {
                self.cash += position.units * position.last_price;
                true
            }
            None => false,
        }
    }

    fn buy(&mut self, symbol: Symbol, amount: f64, price: f64) -> bool {
        let amount = amount.min(self.cash);
        if amount <= 0.0 || price <= 0.0 {
            return false;
        }
        self.cash -= amount;
        let position = self.positions.entry(symbol).or_insert(Position {
            units: 0.0,
            last_price: price,
        });
        position.units += amount / price;
        position.last_price = price;
        true
    }

    fn value(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|position| position.units * position.last_price)
                .sum::<f64>()
    }
}

pub struct Backtester {
    rebalancer: Rebalancer,
    initial_capital: f64,
}

impl Backtester {
    pub fn new(fetcher: PriceFetcher) -> Self {
        Self {
            rebalancer: Rebalancer::new(fetcher),
            initial_capital: DEFAULT_INITIAL_CAPITAL,
        }
    }

    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    pub async fn run(&self, request: &BacktestRequest) -> Result<BacktestReport, BacktestError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(BacktestError::InvalidCapital(self.initial_capital));
        }

        let run_id = Uuid::new_v4();
        let schedule = monthly_schedule(request.end, request.months)?;
        let instruments: BTreeMap<Symbol, Instrument> = request
            .universe
            .iter()
            .map(|instrument| (instrument.symbol.clone(), instrument.clone()))
            .collect();
        info!(
            %run_id,
            strategy = %request.strategy,
            start = %schedule[0],
            end = %request.end,
            universe = request.universe.len(),
            capital = self.initial_capital,
            "backtest started"
        );

        let mut book = Book::new(self.initial_capital);
        let mut points = Vec::with_capacity(schedule.len());

        for &date in &schedule {
            let rebalance = RebalanceRequest {
                strategy: request.strategy,
                as_of: date,
                universe: request.universe.clone(),
                current: book.portfolio(),
            };

            let report = match self.rebalancer.run(&rebalance).await {
                Ok(report) => Some(report),
                Err(RebalanceError::NoUsableReturns { skipped }) => {
                    warn!(%date, skipped, "no usable returns; carrying positions over");
                    None
                }
                Err(error) => return Err(error.into()),
            };

            let mut wanted: BTreeSet<Symbol> = book.positions.keys().cloned().collect();
            if let Some(report) = &report {
                wanted.extend(report.decision.buy.iter().cloned());
            }
            let prices = self.price_all(&instruments, &wanted, date).await?;
            book.mark(&prices);

            let (mut buys, mut sells) = (BTreeSet::new(), BTreeSet::new());
            if let Some(report) = &report {
                for symbol in &report.decision.sell {
                    if book.sell(symbol) {
                        sells.insert(symbol.clone());
                    }
                }

                let slot = book.cash / report.selection.top20.len().max(1) as f64;
                for symbol in &report.decision.buy {
                    match prices.get(symbol) {
                        Some(price) if book.buy(symbol.clone(), slot, *price) => {
                            buys.insert(symbol.clone());
                        }
                        Some(_) => warn!(%symbol, %date, "no cash left; buy skipped"),
                        None => warn!(%symbol, %date, "no price on rebalance date; buy skipped"),
                    }
                }
            }

            let point = BacktestPoint {
                date,
                value: book.value(),
                cash: book.cash,
                holdings: book.positions.len(),
                buys,
                sells,
                rebalanced: report.is_some(),
            };
            info!(
                %date,
                value = point.value,
                holdings = point.holdings,
                buys = point.buys.len(),
                sells = point.sells.len(),
                "backtest month closed"
            );
            points.push(point);
        }

        let summary = BacktestSummary::from_points(self.initial_capital, &points);
        let cache = self
            .rebalancer
            .fetcher()
            .cache()
            .stats()
            .await
            .unwrap_or_else(|error| {
                warn!(%error, "cache stats unavailable");
                CacheStats::default()
            });

        info!(
            %run_id,
            final_value = summary.final_value,
            total_return = summary.total_return,
            sharpe = summary.sharpe,
            "backtest finished"
        );

        Ok(BacktestReport {
            run_id,
            strategy: request.strategy,
            start: schedule[0],
            end: request.end,
            points,
            summary,
            cache,
        })
    }

    /// Latest close on or before `date` for each wanted symbol. Symbols that
    /// cannot be priced are left out; the book keeps their previous mark.
    async fn price_all(
        &self,
        instruments: &BTreeMap<Symbol, Instrument>,
        wanted: &BTreeSet<Symbol>,
        date: Date,
    ) -> Result<BTreeMap<Symbol, f64>, BacktestError> {
        let fetcher = self.rebalancer.fetcher();
        let limit = fetcher.policy().max_concurrency.max(1);
        let window = HistoryWindow::pricing(date);
        let mut pending = wanted.iter().filter_map(|symbol| instruments.get(symbol)).cloned();
        let mut tasks = JoinSet::new();
        let mut prices = BTreeMap::new();

        loop {
            while tasks.len() < limit {
                let Some(instrument) = pending.next() else {
                    break;
                };
                let fetcher = fetcher.clone();
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
                joined.map_err(|error| BacktestError::Worker(error.to_string()))?;

            match outcome {
                Ok(series) => match close_on_or_before(&series, date) {
                    Some(price) => {
                        prices.insert(symbol, price);
                    }
                    None => warn!(%symbol, %date, "no close on or before date"),
                },
                Err(error) if error.is_fatal() => {
                    tasks.abort_all();
                    return Err(BacktestError::Pricing {
                        symbol,
                        date,
                        source: error,
                    });
                }
                Err(error) => warn!(%symbol, %date, %error, "price unavailable; using last mark"),
            }
        }

        Ok(prices)
    }
}

fn close_on_or_before(series: &PriceSeries, date: Date) -> Option<f64> {
    series
        .points()
        .iter()
        .rev()
        .find(|point| point.date <= date)
        .map(|point| point.close)
        .filter(|close| close.is_finite() && *close > 0.0)
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}
