use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::{DataError, HistoryWindow, Instrument};

/// Price-history request for one instrument over one run's window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRequest {
    pub instrument: Instrument,
    pub window: HistoryWindow,
}

impl HistoryRequest {
    pub fn new(instrument: Instrument, window: HistoryWindow) -> Self {
        Self { instrument, window }
    }

    /// Parameters that identify the response. The symbol is not part of it;
    /// the price source only knows instrument keys.
    pub fn descriptor(&self) -> HistoryDescriptor<'_> {
        HistoryDescriptor {
            instrument_key: self.instrument.instrument_key.as_str(),
            granularity: self.window.granularity.as_str(),
            start_date: self.window.start_date,
            end_date: self.window.end_date,
        }
    }
}

impl Display for HistoryRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}..{}",
            self.instrument.symbol,
            self.window.granularity.as_str(),
            self.window.start_date,
            self.window.end_date
        )
    }
}

/// Canonical request parameters hashed into cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryDescriptor<'a> {
    pub instrument_key: &'a str,
    pub granularity: &'a str,
    pub start_date: time::Date,
    pub end_date: time::Date,
}

/// Classification of a failed price fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The source asked us to slow down.
    RateLimited,
    /// Timeouts, connection failures and 5xx responses.
    Transient,
    /// Bad or missing credentials and rejected requests; retrying cannot help.
    Fatal,
    /// The source has no history for this instrument or range.
    NotFound,
    /// The response arrived but could not be turned into a price series.
    InvalidData,
}

impl FetchErrorKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::NotFound => "not_found",
            Self::InvalidData => "invalid_data",
        }
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fetch error; the kind drives retry and skip decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    status: Option<u16>,
    attempts: u32,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            attempts: 1,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Fatal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn invalid_data(error: &DataError) -> Self {
        Self::new(FetchErrorKind::InvalidData, error.to_string())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// External attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Fatal)
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)?;
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

/// One external attempt at loading a price history. Retries, caching and
/// throttling live in [`crate::PriceFetcher`], not in implementations.
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn history<'a>(
        &'a self,
        request: &'a HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<crate::PriceSeries, FetchError>> + Send + 'a>>;
}
