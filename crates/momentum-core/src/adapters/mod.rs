//! Price source adapters.

pub mod upstox;

pub use upstox::UpstoxSource;
