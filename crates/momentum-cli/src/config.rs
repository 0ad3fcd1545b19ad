//! Environment configuration.
//!
//! `.env` is loaded first (if present), then process variables are read.
//! Command-line flags override anything resolved here.

use std::path::PathBuf;
use std::time::Duration;

use momentum_core::adapters::upstox::DEFAULT_BASE_URL;
use momentum_core::DEFAULT_CACHE_TTL;
use thiserror::Error;

pub const API_TOKEN_VAR: &str = "UPSTOX_API_TOKEN";
pub const BASE_URL_VAR: &str = "UPSTOX_BASE_URL";
pub const CACHE_DIR_VAR: &str = "MOMENTUM_CACHE_DIR";
pub const CACHE_TTL_VAR: &str = "MOMENTUM_CACHE_TTL_SECS";
pub const UNIVERSE_FILE_VAR: &str = "MOMENTUM_UNIVERSE_FILE";

const DEFAULT_CACHE_DIR: &str = ".cache";
const DEFAULT_UNIVERSE_FILE: &str = "ind_nifty200list.csv";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("UPSTOX_API_TOKEN is not set; export it or add it to .env")]
    MissingToken,
    #[error("{name} {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    api_token: Option<String>,
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub universe_file: PathBuf,
}

// Keep the token out of `{:?}`.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("cache_dir", &self.cache_dir)
            .field("cache_ttl", &self.cache_ttl)
            .field("universe_file", &self.universe_file)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(error) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {error}");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let cache_ttl = match get(CACHE_TTL_VAR) {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                    name: CACHE_TTL_VAR,
                    reason: format!("must be a whole number of seconds, got '{raw}'"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: CACHE_TTL_VAR,
                        reason: String::from("must be greater than zero"),
                    });
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_CACHE_TTL,
        };

        let base_url = get(BASE_URL_VAR).unwrap_or_else(|| String::from(DEFAULT_BASE_URL));
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: BASE_URL_VAR,
                reason: format!("must be an http(s) URL, got '{base_url}'"),
            });
        }

        Ok(Self {
            api_token: get(API_TOKEN_VAR),
            base_url,
            cache_dir: get(CACHE_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            cache_ttl,
            universe_file: get(UNIVERSE_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIVERSE_FILE)),
        })
    }

    /// The API token; only `rebalance` needs one.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.api_token.as_deref().ok_or(ConfigError::MissingToken)
    }
}
