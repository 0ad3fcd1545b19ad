//! Shared test doubles for the behaviour suites.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use momentum_core::{
    FetchError, FetchPolicy, Granularity, HistoryRequest, HistoryWindow, HttpClient, HttpError,
    HttpRequest, HttpResponse, Instrument, PricePoint, PriceSeries, PriceSource, RetryConfig,
};
use time::Date;

/// What the scripted source answers for one attempt.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A two-point series over the request window with this trailing return.
    Return(f64),
    Fail(FetchError),
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Reply>,
    then: Option<Reply>,
}

/// Price source answering from per-symbol scripts and counting calls.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt for `symbol` gets `reply`.
    pub fn always(self, symbol: &str, reply: Reply) -> Self {
        self.sequence(symbol, Vec::new(), reply)
    }

    /// Attempts for `symbol` get `replies` in order, then `then` forever.
    pub fn sequence(self, symbol: &str, replies: Vec<Reply>, then: Reply) -> Self {
        self.scripts
            .lock()
            .expect("script lock should not be poisoned")
            .insert(
                symbol.to_owned(),
                Script {
                    queue: replies.into(),
                    then: Some(then),
                },
            );
        self
    }

    pub fn calls(&self, symbol: &str) -> u32 {
        self.calls
            .lock()
            .expect("call lock should not be poisoned")
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .expect("call lock should not be poisoned")
            .values()
            .sum()
    }

    fn next_reply(&self, symbol: &str) -> Reply {
        *self
            .calls
            .lock()
            .expect("call lock should not be poisoned")
            .entry(symbol.to_owned())
            .or_insert(0) += 1;

        let mut scripts = self.scripts.lock().expect("script lock should not be poisoned");
        match scripts.get_mut(symbol) {
            Some(script) => script
                .queue
                .pop_front()
                .or_else(|| script.then.clone())
                .unwrap_or_else(|| Reply::Fail(FetchError::not_found("script exhausted"))),
            None => Reply::Fail(FetchError::not_found(format!("no script for {symbol}"))),
        }
    }
}

impl PriceSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn history<'a>(
        &'a self,
        request: &'a HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, FetchError>> + Send + 'a>> {
        let reply = self.next_reply(request.instrument.symbol.as_str());
        let window = request.window;
        Box::pin(async move {
            match reply {
                Reply::Return(pct) => Ok(series_with_return(window, pct)),
                Reply::Fail(error) => Err(error),
            }
        })
    }
}

/// Close of 100 at the window start and `100 + pct` at its end.
pub fn series_with_return(window: HistoryWindow, pct: f64) -> PriceSeries {
    PriceSeries::new(vec![
        PricePoint {
            date: window.start_date,
            close: 100.0,
        },
        PricePoint {
            date: window.end_date,
            close: 100.0 + pct,
        },
    ])
    .expect("valid scripted series")
}

pub fn instrument(symbol: &str) -> Instrument {
    Instrument::parse(symbol, &format!("NSE_EQ|{symbol}")).expect("valid instrument")
}

/// Monthly growth rate of one symbol before and after a pivot date.
#[derive(Debug, Clone, Copy)]
pub struct Trend {
    pub before: f64,
    pub after: f64,
}

impl Trend {
    pub const fn steady(rate: f64) -> Self {
        Self {
            before: rate,
            after: rate,
        }
    }
}

/// Price source whose closes follow per-symbol trends around `pivot`, so
/// every date in a replay sees a consistent price history.
#[derive(Debug)]
pub struct TrendSource {
    pivot: Date,
    trends: HashMap<String, Trend>,
    unranked_on: Vec<Date>,
    fatal: Option<String>,
}

impl TrendSource {
    pub fn new(pivot: Date) -> Self {
        Self {
            pivot,
            trends: HashMap::new(),
            unranked_on: Vec::new(),
            fatal: None,
        }
    }

    pub fn with(mut self, symbol: &str, trend: Trend) -> Self {
        self.trends.insert(symbol.to_owned(), trend);
        self
    }

    /// Ranking windows ending on `date` find no candles.
    pub fn unranked_on(mut self, date: Date) -> Self {
        self.unranked_on.push(date);
        self
    }

    /// Every request for `symbol` is rejected as unauthorized.
    pub fn fatal_for(mut self, symbol: &str) -> Self {
        self.fatal = Some(symbol.to_owned());
        self
    }

    /// Close of `symbol` on `date`; 100 at the pivot.
    pub fn price(&self, symbol: &str, date: Date) -> f64 {
        let trend = self.trends.get(symbol).copied().unwrap_or(Trend::steady(0.0));
        let months = (date - self.pivot).whole_days() as f64 / 30.4375;
        let rate = if months <= 0.0 { trend.before } else { trend.after };
        100.0 * (1.0 + rate).powf(months)
    }
}

impl PriceSource for TrendSource {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn history<'a>(
        &'a self,
        request: &'a HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, FetchError>> + Send + 'a>> {
        let symbol = request.instrument.symbol.as_str();
        let window = request.window;
        let outcome = if self.fatal.as_deref() == Some(symbol) {
            Err(FetchError::fatal("upstox returned status 401").with_status(401))
        } else if window.granularity == Granularity::Month
            && self.unranked_on.contains(&window.end_date)
        {
            Err(FetchError::not_found("no candles"))
        } else {
            PriceSeries::new(vec![
                PricePoint {
                    date: window.start_date,
                    close: self.price(symbol, window.start_date),
                },
                PricePoint {
                    date: window.end_date,
                    close: self.price(symbol, window.end_date),
                },
            ])
            .map_err(|error| FetchError::invalid_data(&error))
        };
        Box::pin(async move { outcome })
    }
}

/// Upstox defaults with millisecond backoff so retry tests stay fast.
pub fn fast_policy() -> FetchPolicy {
    FetchPolicy::upstox_default().with_retry(RetryConfig::exponential(
        Duration::from_millis(1),
        Duration::from_millis(8),
        3,
    ))
}

/// HTTP client replaying queued responses, then repeating the last one.
#[derive(Debug)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    last: Mutex<Option<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("request lock should not be poisoned")
            .len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests
            .lock()
            .expect("request lock should not be poisoned")
            .push(request);

        let mut last = self.last.lock().expect("last lock should not be poisoned");
        let response = match self
            .responses
            .lock()
            .expect("response lock should not be poisoned")
            .pop_front()
        {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "script exhausted"))),
        };
        Box::pin(async move { response })
    }
}

pub const CANDLES_BODY: &str = r#"{
    "status": "success",
    "data": {
        "candles": [
            ["2025-07-01T00:00:00+05:30", 118.0, 121.0, 117.0, 120.0, 1000, 0],
            ["2024-12-31T00:00:00+05:30", 99.0, 101.0, 98.0, 100.0, 1000, 0]
        ]
    }
}"#;
