//! DEX Price Feed Library
//!
//! Aggregates decentralized-exchange trades of a ledger into volume-weighted
//! prices for oracle price feed contracts.

pub mod config;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod store;
pub mod types;

pub use error::{OracleError, Result};
pub use oracle::PriceOracle;
pub use store::{FixtureStore, LedgerStore};
