//! Paper portfolio persistence.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{Holding, Portfolio, Symbol, ValidationError};

const SYMBOL_HEADER: &str = "Symbol";
const UNITS_HEADER: &str = "Units";

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed portfolio file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid symbol on line {line} of {path}: {source}")]
    InvalidSymbol {
        path: PathBuf,
        line: u64,
        #[source]
        source: ValidationError,
    },
    #[error("symbol '{symbol}' appears more than once in {path}")]
    DuplicateSymbol { path: PathBuf, symbol: Symbol },
}

/// Load/save contract for the current holdings.
pub trait PortfolioStore: Send + Sync {
    fn load(&self) -> Result<Portfolio, PortfolioError>;

    fn save(&self, portfolio: &Portfolio) -> Result<(), PortfolioError>;
}

/// Holdings kept as a `Symbol,Units` CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPortfolioStore {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PortfolioRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Units", default, deserialize_with = "csv::invalid_option")]
    units: Option<u64>,
}

impl CsvPortfolioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn csv_error(&self, source: csv::Error) -> PortfolioError {
        PortfolioError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn write_to(&self, target: &Path, portfolio: &Portfolio) -> Result<(), PortfolioError> {
        let mut writer = csv::Writer::from_path(target).map_err(|e| self.csv_error(e))?;
        writer
            .write_record([SYMBOL_HEADER, UNITS_HEADER])
            .map_err(|e| self.csv_error(e))?;
        for holding in portfolio.holdings() {
            let units = holding.units.to_string();
            writer
                .write_record([holding.symbol.as_str(), units.as_str()])
                .map_err(|e| self.csv_error(e))?;
        }
        writer.flush().map_err(|source| PortfolioError::Io {
            path: target.to_path_buf(),
            source,
        })
    }
}

impl PortfolioStore for CsvPortfolioStore {
    /// A missing file is an empty portfolio.
    fn load(&self) -> Result<Portfolio, PortfolioError> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(error) => {
                if let csv::ErrorKind::Io(io_error) = error.kind() {
                    if io_error.kind() == io::ErrorKind::NotFound {
                        info!(path = %self.path.display(), "portfolio file not found; starting empty");
                        return Ok(Portfolio::new());
                    }
                }
                return Err(self.csv_error(error));
            }
        };

        let mut portfolio = Portfolio::new();
        for (index, row) in reader.deserialize::<PortfolioRow>().enumerate() {
            let row = row.map_err(|e| self.csv_error(e))?;
            if row.symbol.trim().is_empty() {
                continue;
            }

            let line = index as u64 + 2;
            let symbol = Symbol::parse(&row.symbol).map_err(|source| {
                PortfolioError::InvalidSymbol {
                    path: self.path.clone(),
                    line,
                    source,
                }
            })?;

            let holding = Holding {
                symbol: symbol.clone(),
                units: row.units.unwrap_or(0),
            };
            if portfolio.insert(holding).is_some() {
                return Err(PortfolioError::DuplicateSymbol {
                    path: self.path.clone(),
                    symbol,
                });
            }
        }

        debug!(path = %self.path.display(), holdings = portfolio.len(), "portfolio loaded");
        Ok(portfolio)
    }

    /// Writes a sibling temp file and renames it over the target.
    fn save(&self, portfolio: &Portfolio) -> Result<(), PortfolioError> {
        let io_error = |path: &Path, source| PortfolioError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("portfolio.csv"));
        let temp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(error) = self.write_to(&temp, portfolio) {
            let _ = std::fs::remove_file(&temp);
            return Err(error);
        }
        if let Err(error) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(io_error(&self.path, error));
        }

        info!(path = %self.path.display(), holdings = portfolio.len(), "portfolio saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, units: u64) -> Holding {
        Holding {
            symbol: Symbol::parse(symbol).expect("valid symbol"),
            units,
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CsvPortfolioStore::new(dir.path().join("portfolio.csv"));

        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn save_then_load_preserves_holdings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CsvPortfolioStore::new(dir.path().join("portfolio6.csv"));
        let portfolio: Portfolio = vec![holding("TCS", 0), holding("M&M", 3)].into_iter().collect();

        store.save(&portfolio).expect("save");

        assert_eq!(store.load().expect("load"), portfolio);
        let written = std::fs::read_to_string(store.path()).expect("read");
        assert!(written.starts_with("Symbol,Units\n"));
        assert!(written.contains("M&M,3"));
    }

    #[test]
    fn empty_portfolio_still_writes_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CsvPortfolioStore::new(dir.path().join("portfolio.csv"));

        store.save(&Portfolio::new()).expect("save");

        assert_eq!(
            std::fs::read_to_string(store.path()).expect("read"),
            "Symbol,Units\n"
        );
        let leftovers = std::fs::read_dir(dir.path()).expect("dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_units_default_to_zero_and_duplicates_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("portfolio.csv");

        std::fs::write(&path, "Symbol,Units\ninfy,\n").expect("write");
        let loaded = CsvPortfolioStore::new(&path).load().expect("load");
        assert_eq!(loaded.get(&Symbol::parse("INFY").expect("valid")).map(|h| h.units), Some(0));

        std::fs::write(&path, "Symbol,Units\nINFY,0\nINFY,0\n").expect("write");
        let err = CsvPortfolioStore::new(&path).load().expect_err("must fail");
        assert!(matches!(err, PortfolioError::DuplicateSymbol { .. }));
    }
}
