use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{DataError, Symbol, ValidationError};

/// OHLCV candle as delivered by the price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

/// Settlement price observed on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: Date,
    pub close: f64,
}

/// Close prices for one instrument, strictly increasing by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from points in any order.
    ///
    /// Points are sorted by date; duplicates, empty input and non-positive
    /// prices are rejected.
    pub fn new(mut points: Vec<PricePoint>) -> Result<Self, DataError> {
        if points.is_empty() {
            return Err(DataError::EmptySeries);
        }

        for point in &points {
            if !point.close.is_finite() || point.close <= 0.0 {
                return Err(DataError::NonPositivePrice {
                    date: point.date,
                    price: point.close,
                });
            }
        }

        points.sort_by_key(|point| point.date);
        if let Some(pair) = points.windows(2).find(|pair| pair[0].date == pair[1].date) {
            return Err(DataError::DuplicateDate { date: pair[0].date });
        }

        Ok(Self { points })
    }

    pub fn from_candles(candles: &[Candle]) -> Result<Self, DataError> {
        Self::new(
            candles
                .iter()
                .map(|candle| PricePoint {
                    date: candle.date,
                    close: candle.close,
                })
                .collect(),
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = DataError;

    fn try_from(value: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(value: PriceSeries) -> Self {
        value.points
    }
}

/// Trailing return for one symbol in one rebalance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub symbol: Symbol,
    pub return_pct: f64,
    pub as_of: Date,
}

impl ReturnRecord {
    pub fn new(symbol: Symbol, return_pct: f64, as_of: Date) -> Result<Self, ValidationError> {
        if !return_pct.is_finite() {
            return Err(ValidationError::NonFiniteReturn {
                symbol: symbol.to_string(),
            });
        }

        Ok(Self {
            symbol,
            return_pct,
            as_of,
        })
    }
}

/// Paper position; units stay at zero until live trading exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub units: u64,
}

impl Holding {
    pub fn paper(symbol: Symbol) -> Self {
        Self { symbol, units: 0 }
    }
}

/// Holdings keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    holdings: BTreeMap<Symbol, Holding>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a holding; returns the previous one for the same symbol.
    pub fn insert(&mut self, holding: Holding) -> Option<Holding> {
        self.holdings.insert(holding.symbol.clone(), holding)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.holdings.contains_key(symbol)
    }

    pub fn symbols(&self) -> std::collections::BTreeSet<Symbol> {
        self.holdings.keys().cloned().collect()
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

impl FromIterator<Holding> for Portfolio {
    fn from_iter<T: IntoIterator<Item = Holding>>(iter: T) -> Self {
        let mut portfolio = Self::new();
        for holding in iter {
            portfolio.insert(holding);
        }
        portfolio
    }
}
