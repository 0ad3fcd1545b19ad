//! # Domain Models
//!
//! Canonical domain types for the momentum rebalancer.
//!
//! All models enforce their invariants at construction time, so downstream
//! stages (returns, ranking, decisions) never see malformed data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated exchange ticker |
//! | [`InstrumentKey`] | Opaque key used to query the price source |
//! | [`Instrument`] | Universe member: symbol plus instrument key |
//! | [`Candle`] | OHLCV candle from the price source |
//! | [`PriceSeries`] | Date-ordered close prices, non-empty |
//! | [`ReturnRecord`] | Trailing return for one symbol |
//! | [`Holding`] / [`Portfolio`] | Paper holdings keyed by symbol |
//! | [`Strategy`] | 6-month or 12-month lookback |
//! | [`HistoryWindow`] | Date range shared by one rebalance run |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod period;
mod symbol;
mod timestamp;

pub use models::{Candle, Holding, PricePoint, PriceSeries, Portfolio, ReturnRecord};
pub use period::{Granularity, HistoryWindow, Strategy};
pub use symbol::{Instrument, InstrumentKey, Symbol};
pub use timestamp::{format_date, parse_date, UtcDateTime};
