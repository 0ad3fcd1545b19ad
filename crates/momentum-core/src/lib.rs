//! # Momentum Core
//!
//! Price cache, fetch layer, ranking and rebalance decisions for a monthly
//! momentum portfolio over the NSE 200.
//!
//! ## Overview
//!
//! Each rebalance ranks the universe by trailing return and moves a paper
//! portfolio towards the leaders:
//!
//! - **buy** the top 20 not already held
//! - **sell** holdings that fell out of the top 40
//! - **hold** everything else still inside the top 40
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Upstox historical-candle adapter |
//! | [`backtest`] | Monthly replay over a paper account |
//! | [`cache`] | Age-bounded price-history cache (disk or memory) |
//! | [`decision`] | Buy/sell/hold set arithmetic |
//! | [`domain`] | Symbols, price series, holdings, strategies |
//! | [`error`] | Core error types |
//! | [`fetch`] | Cache-first fetching with bounded retries |
//! | [`http_client`] | HTTP client abstraction |
//! | [`policy`] | Concurrency, quota and retry defaults |
//! | [`portfolio`] | CSV portfolio store |
//! | [`ranking`] | Deterministic momentum ranking |
//! | [`rebalance`] | End-to-end rebalance pipeline |
//! | [`retry`] | Exponential backoff with jitter |
//! | [`returns`] | Trailing-return calculator |
//! | [`source`] | Price source trait and fetch errors |
//! | [`throttle`] | Shared admission control |
//! | [`universe`] | Index constituent loader |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / User     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Rebalancer     │────▶│ Universe /       │
//! │                 │     │ Portfolio Store  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ PriceFetcher    │────▶│ CacheStore       │
//! │ (retry/backoff) │     └──────────────────┘
//! └────────┬────────┘
//!          │  Throttle
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ PriceSource     │────▶│ HTTP Client      │
//! │ (Upstox)        │     │ (reqwest)        │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Fetch failures carry a [`FetchErrorKind`] that drives what happens next:
//!
//! ```rust
//! use momentum_core::{FetchError, FetchErrorKind};
//!
//! fn handle_error(error: FetchError) {
//!     match error.kind() {
//!         FetchErrorKind::RateLimited | FetchErrorKind::Transient => {
//!             // Retried by the fetcher; skipped once retries run out
//!         }
//!         FetchErrorKind::Fatal => {
//!             // Aborts the whole run
//!         }
//!         FetchErrorKind::NotFound | FetchErrorKind::InvalidData => {
//!             // Symbol is skipped
//!         }
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - The API token is supplied by the caller and redacted from `Debug` output
//! - Requests go over HTTPS by default (`DEFAULT_BASE_URL`)

pub mod adapters;
pub mod backtest;
pub mod cache;
pub mod decision;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod policy;
pub mod portfolio;
pub mod ranking;
pub mod rebalance;
pub mod retry;
pub mod returns;
pub mod source;
pub mod throttle;
pub mod universe;

// Adapter implementations
pub use adapters::UpstoxSource;

// Backtesting
pub use backtest::{
    monthly_schedule, BacktestError, BacktestPoint, BacktestReport, BacktestRequest,
    BacktestSummary, Backtester, DEFAULT_BACKTEST_MONTHS, DEFAULT_INITIAL_CAPITAL,
};

// Caching
pub use cache::{CacheError, CacheKey, CacheMode, CacheStats, CacheStore, Clock, ManualClock, SystemClock};

// Decisions
pub use decision::{decide, decide_for, Decision};

// Domain models
pub use domain::{
    format_date, parse_date, Candle, Granularity, HistoryWindow, Holding, Instrument,
    InstrumentKey, PricePoint, PriceSeries, Portfolio, ReturnRecord, Strategy, Symbol,
    UtcDateTime,
};

// Error types
pub use error::{DataError, ValidationError};

// Fetching
pub use fetch::PriceFetcher;

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    TransportFailure,
};

// Policies and retry
pub use policy::{FetchPolicy, DEFAULT_CACHE_TTL};
pub use retry::{Backoff, RetryConfig};

// Portfolio and universe
pub use portfolio::{CsvPortfolioStore, PortfolioError, PortfolioStore};
pub use universe::{load_universe, parse_universe, UniverseError};

// Ranking and returns
pub use ranking::{rank, rank_returns, top_n, RankedList, Selection, BUY_RANK, KEEP_RANK};
pub use returns::{compute_return, ReturnsCalculator};

// Pipeline
pub use rebalance::{
    RebalanceError, RebalanceReport, RebalanceRequest, Rebalancer, SkipReason, SkippedSymbol,
};

// Price sources
pub use source::{FetchError, FetchErrorKind, HistoryRequest, PriceSource};

// Throttling
pub use throttle::Throttle;
