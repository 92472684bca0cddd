//! Record persistence.
//!
//! Both backends are append-only for fee records and keep one block tracker
//! entry per `(chain, source)` for crude resumption. Nothing else is ever
//! updated or deleted.

use std::path::{Path, PathBuf};

use affiliate_fees::FeeRecord;
use anyhow::Result;

use crate::csv_store::CsvStore;
use crate::sqlite_store::SqliteStore;

/// Sink for fee records plus its block tracker.
pub trait FeeStore: Send + std::fmt::Debug {
    /// Persist `records`, returning how many new rows were written.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file or database write fails.
    fn append(&mut self, records: &[FeeRecord]) -> Result<usize>;

    /// Last block scanned for `chain`/`source`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker cannot be read.
    fn last_block(&self, chain: &str, source: &str) -> Result<Option<u64>>;

    /// Record `block` as the last block scanned for `chain`/`source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker cannot be written.
    fn set_last_block(&mut self, chain: &str, source: &str, block: u64) -> Result<()>;
}

/// Output backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreFormat {
    /// Append to a CSV file with a JSON cursor alongside.
    Csv,
    /// `INSERT OR IGNORE` into a `SQLite` database.
    Sqlite,
}

impl StoreFormat {
    /// Guess the format from a file extension (`.db`, `.sqlite`, `.sqlite3`
    /// mean `SQLite`; anything else is CSV).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext)
                if ["db", "sqlite", "sqlite3"]
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext)) =>
            {
                Self::Sqlite
            }
            _ => Self::Csv,
        }
    }

    /// Default output path inside `data_dir`.
    #[must_use]
    pub fn default_path(self, data_dir: &Path) -> PathBuf {
        match self {
            Self::Csv => data_dir.join("affiliate_fees.csv"),
            Self::Sqlite => data_dir.join("affiliate_fees.db"),
        }
    }
}

/// Open the store at `path` using `format`.
///
/// # Errors
///
/// Returns an error if the file or database cannot be opened or initialized.
pub fn open(format: StoreFormat, path: &Path) -> Result<Box<dyn FeeStore>> {
    Ok(match format {
        StoreFormat::Csv => Box::new(CsvStore::open(path)?),
        StoreFormat::Sqlite => Box::new(SqliteStore::open(path)?),
    })
}
