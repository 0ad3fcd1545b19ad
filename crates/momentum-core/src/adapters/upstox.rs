use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::source::{FetchError, HistoryRequest, PriceSource};
use crate::{format_date, Candle, DataError, PriceSeries};

pub const DEFAULT_BASE_URL: &str = "https://api-v2.upstox.com";
const API_VERSION: &str = "2.0";

/// Upstox historical-candle adapter. Makes exactly one HTTP call per
/// [`PriceSource::history`] invocation and classifies the outcome.
#[derive(Clone)]
pub struct UpstoxSource {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
}

impl UpstoxSource {
    pub fn new(http_client: Arc<dyn HttpClient>, api_token: impl Into<String>) -> Self {
        let token = api_token.into().trim().to_owned();
        let auth = if token.is_empty() {
            HttpAuth::None
        } else {
            HttpAuth::BearerToken(token)
        };

        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            auth,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{base}/historical-candle/{instrument_key}/{interval}/{to}/{from}`
    pub fn endpoint(&self, request: &HistoryRequest) -> String {
        format!(
            "{}/historical-candle/{}/{}/{}/{}",
            self.base_url,
            urlencoding::encode(request.instrument.instrument_key.as_str()),
            request.window.granularity.as_str(),
            format_date(request.window.end_date),
            format_date(request.window.start_date),
        )
    }

    async fn fetch_history(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError> {
        if self.auth.is_none() {
            return Err(FetchError::fatal("upstox api token is not configured"));
        }

        let http_request = HttpRequest::get(self.endpoint(request))
            .with_header("Api-Version", API_VERSION)
            .with_header("Accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout(self.timeout);

        let response = self
            .http_client
            .execute(http_request)
            .await
            .map_err(|error| transport_error(&error))?;

        debug!(
            symbol = %request.instrument.symbol,
            status = response.status,
            "upstox responded"
        );

        if !response.is_success() {
            return Err(classify_status(&response));
        }

        let candles = parse_candles(&response.body).map_err(|e| FetchError::invalid_data(&e))?;
        if candles.is_empty() {
            return Err(FetchError::not_found(format!(
                "upstox has no candles for {request}"
            )));
        }

        PriceSeries::from_candles(&candles).map_err(|e| FetchError::invalid_data(&e))
    }
}

impl PriceSource for UpstoxSource {
    fn name(&self) -> &'static str {
        "upstox"
    }

    fn history<'a>(
        &'a self,
        request: &'a HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_history(request))
    }
}

fn transport_error(error: &HttpError) -> FetchError {
    FetchError::transient(format!(
        "upstox transport error ({}): {}",
        error.failure().as_str(),
        error.message()
    ))
}

/// Maps a non-2xx response to a fetch error kind.
pub fn classify_status(response: &HttpResponse) -> FetchError {
    let status = response.status;
    let message = format!("upstox returned status {status}");

    let error = match status {
        429 => FetchError::rate_limited(message),
        408 | 500..=599 => FetchError::transient(message),
        404 => FetchError::not_found(message),
        400..=499 => FetchError::fatal(message),
        _ => FetchError::transient(message),
    };
    error.with_status(status)
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    status: String,
    #[serde(default)]
    data: Option<CandleData>,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    #[serde(default)]
    candles: Vec<Vec<Value>>,
}

/// Decodes `{"status":"success","data":{"candles":[[ts,o,h,l,c,v,oi],...]}}`.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>, DataError> {
    let response: CandleResponse = serde_json::from_str(body)
        .map_err(|e| DataError::MalformedResponse(format!("undecodable body: {e}")))?;

    if response.status != "success" {
        return Err(DataError::MalformedResponse(format!(
            "status is '{}'",
            response.status
        )));
    }

    let data = response
        .data
        .ok_or_else(|| DataError::MalformedResponse(String::from("missing data object")))?;

    data.candles
        .iter()
        .enumerate()
        .map(|(index, row)| parse_candle(index, row))
        .collect()
}

fn parse_candle(index: usize, row: &[Value]) -> Result<Candle, DataError> {
    let malformed = |reason: &str| DataError::MalformedCandle {
        index,
        reason: reason.to_owned(),
    };

    if row.len() < 5 {
        return Err(malformed("expected at least 5 fields"));
    }

    let timestamp = row[0]
        .as_str()
        .ok_or_else(|| malformed("timestamp is not a string"))?;
    // Exchange-local timestamps; the calendar date is what matters.
    let date = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| malformed("timestamp is not RFC3339"))?
        .date();

    let price = |position: usize, name: &str| {
        row[position]
            .as_f64()
            .ok_or_else(|| malformed(&format!("{name} is not a number")))
    };

    let volume = row
        .get(5)
        .and_then(|value| value.as_u64().or_else(|| value.as_f64().map(|v| v as u64)));

    Ok(Candle {
        date,
        open: price(1, "open")?,
        high: price(2, "high")?,
        low: price(3, "low")?,
        close: price(4, "close")?,
        volume,
    })
}
