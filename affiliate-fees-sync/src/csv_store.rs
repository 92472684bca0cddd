//! CSV output: one appended row per [`FeeRecord`].

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use affiliate_fees::FeeRecord;
use anyhow::{Context, Result};

use crate::cursor::Cursors;
use crate::store::FeeStore;

/// Appends records to a CSV file and tracks progress in a sibling
/// `<stem>.cursor.json`.
///
/// The header row is written only when the file is new or empty. Rows are
/// never deduplicated.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    cursor_path: PathBuf,
    cursors: Cursors,
}

impl CsvStore {
    /// Prepare `path` for appending and load its cursor file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// cursor file cannot be read.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let cursor_path = path.with_extension("cursor.json");
        let cursors = Cursors::load(&cursor_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            cursor_path,
            cursors,
        })
    }

    /// The CSV file being appended to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeeStore for CsvStore {
    fn append(&mut self, records: &[FeeRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let needs_header = std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for record in records {
            writer
                .serialize(record)
                .with_context(|| format!("writing {}", self.path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(records.len())
    }

    fn last_block(&self, chain: &str, source: &str) -> Result<Option<u64>> {
        Ok(self.cursors.get(chain, source).map(|c| c.last_block))
    }

    fn set_last_block(&mut self, chain: &str, source: &str, block: u64) -> Result<()> {
        self.cursors.set(chain, source, block);
        self.cursors.save(&self.cursor_path)
    }
}
