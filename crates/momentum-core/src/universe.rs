//! Universe loader for the index constituent list.
//!
//! Reads the NSE constituent export (`Company Name, Industry, Symbol, Series,
//! ISIN Code, instrument_key`); only `Symbol` and `instrument_key` are used.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{Instrument, Symbol, ValidationError};

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("failed to read universe file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid universe entry on line {line}: {source}")]
    InvalidEntry {
        line: u64,
        #[source]
        source: ValidationError,
    },
    #[error("symbol '{symbol}' is listed more than once in the universe")]
    DuplicateSymbol { symbol: Symbol },
}

#[derive(Debug, Deserialize)]
struct UniverseRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(default)]
    instrument_key: String,
}

pub fn load_universe(path: impl AsRef<Path>) -> Result<Vec<Instrument>, UniverseError> {
    let path = path.as_ref();
    let reader = csv::Reader::from_path(path).map_err(|source| UniverseError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let instruments = read_instruments(reader, path)?;
    debug!(path = %path.display(), instruments = instruments.len(), "universe loaded");
    Ok(instruments)
}

/// Parse a universe from any CSV source; `origin` is only used in errors.
pub fn parse_universe<R: Read>(input: R, origin: &Path) -> Result<Vec<Instrument>, UniverseError> {
    read_instruments(csv::Reader::from_reader(input), origin)
}

fn read_instruments<R: Read>(
    mut reader: csv::Reader<R>,
    origin: &Path,
) -> Result<Vec<Instrument>, UniverseError> {
    let mut seen = BTreeSet::new();
    let mut instruments = Vec::new();

    for (index, row) in reader.deserialize::<UniverseRow>().enumerate() {
        let row = row.map_err(|source| UniverseError::Csv {
            path: origin.to_path_buf(),
            source,
        })?;
        if row.symbol.trim().is_empty() {
            continue;
        }

        let line = index as u64 + 2;
        let instrument = Instrument::parse(&row.symbol, &row.instrument_key)
            .map_err(|source| UniverseError::InvalidEntry { line, source })?;

        if !seen.insert(instrument.symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol {
                symbol: instrument.symbol,
            });
        }
        instruments.push(instrument);
    }

    Ok(instruments)
}
