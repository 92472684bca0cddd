//! Affiliate fee listener library.
//!
//! Scans swap protocol events on EVM chains and THORChain swap actions from
//! Midgard, keeps the ones that paid the configured affiliate, and appends
//! them to a CSV file or a `SQLite` database.

pub mod chains;
pub mod config;
pub mod csv_store;
pub mod cursor;
pub mod enrich;
pub mod fetcher;
pub mod http;
pub mod midgard;
pub mod pricing;
pub mod source;
pub mod sqlite_store;
pub mod store;
