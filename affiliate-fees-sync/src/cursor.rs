//! JSON block tracker used alongside CSV output.
//!
//! A single `<stem>.cursor.json` next to the CSV file records, per
//! `chain/source` pair, the last block scanned so that subsequent runs only
//! fetch the delta.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Scan progress for a single chain and source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The last block (or THORChain height) that has been scanned.
    pub last_block: u64,
    /// Unix timestamp (seconds) of the update.
    pub synced_at: i64,
}

impl Cursor {
    /// Create a new cursor at the given block with the current timestamp.
    #[must_use]
    pub fn now(last_block: u64) -> Self {
        Self {
            last_block,
            synced_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// All cursors of one output file, keyed by `chain/source`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursors(BTreeMap<String, Cursor>);

impl Cursors {
    /// Read cursors from `path`.
    ///
    /// Returns an empty set if the file does not exist (first run) or
    /// contains invalid JSON (logs a warning and triggers a fresh scan).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read (I/O error).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&data) {
            Ok(cursors) => Ok(cursors),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupted cursor, starting fresh");
                Ok(Self::default())
            }
        }
    }

    /// Persist cursors to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

        Ok(())
    }

    /// Last scanned block for `chain/source`.
    #[must_use]
    pub fn get(&self, chain: &str, source: &str) -> Option<Cursor> {
        self.0.get(&key(chain, source)).copied()
    }

    /// Record `block` as the last scanned block for `chain/source`.
    pub fn set(&mut self, chain: &str, source: &str, block: u64) {
        self.0.insert(key(chain, source), Cursor::now(block));
    }
}

fn key(chain: &str, source: &str) -> String {
    format!("{chain}/{source}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fees.cursor.json");

        let mut cursors = Cursors::default();
        cursors.set("arbitrum", "cowswap", 250_000_000);
        cursors.set("thorchain", "thorchain", 19_000_000);
        cursors.save(&path).expect("save");

        let loaded = Cursors::load(&path).expect("load");
        assert_eq!(
            loaded.get("arbitrum", "cowswap").map(|c| c.last_block),
            Some(250_000_000),
            "arbitrum cursor"
        );
        assert_eq!(
            loaded.get("thorchain", "thorchain").map(|c| c.last_block),
            Some(19_000_000),
            "thorchain cursor"
        );
        assert!(loaded.get("base", "cowswap").is_none(), "untracked pair");
        assert!(!path.with_extension("json.tmp").exists(), "temp file renamed away");
    }

    #[test]
    fn corrupted_file_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fees.cursor.json");
        std::fs::write(&path, "{not json").expect("write");
        let loaded = Cursors::load(&path).expect("corruption is not an I/O error");
        assert!(loaded.get("ethereum", "0x").is_none(), "empty after corruption");
    }

    #[test]
    fn set_overwrites() {
        let mut cursors = Cursors::default();
        cursors.set("base", "relay", 10);
        cursors.set("base", "relay", 20);
        assert_eq!(cursors.get("base", "relay").map(|c| c.last_block), Some(20), "latest wins");
    }
}
