use thiserror::Error;
use time::Date;

/// Validation and contract errors exposed by `momentum-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or digit: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("instrument key cannot be empty")]
    EmptyInstrumentKey,
    #[error("instrument key must not contain whitespace: '{value}'")]
    InstrumentKeyWhitespace { value: String },

    #[error("invalid strategy '{value}', expected one of 6m, 12m")]
    InvalidStrategy { value: String },

    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("return for '{symbol}' must be finite")]
    NonFiniteReturn { symbol: String },
}

/// Problems with the shape or span of a price history.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("price history is empty")]
    EmptySeries,
    #[error("price history has more than one point dated {date}")]
    DuplicateDate { date: Date },
    #[error("price on {date} must be finite and positive, got {price}")]
    NonPositivePrice { date: Date, price: f64 },
    #[error("candle {index} is malformed: {reason}")]
    MalformedCandle { index: usize, reason: String },
    #[error("malformed price response: {0}")]
    MalformedResponse(String),
    #[error("insufficient history: {reason}")]
    InsufficientHistory { reason: String },
}

impl DataError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientHistory {
            reason: reason.into(),
        }
    }
}
