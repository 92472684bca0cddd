//! `SQLite` output: `affiliate_fees` rows plus the `block_tracker` table.

use std::path::Path;

use affiliate_fees::FeeRecord;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::FeeStore;

/// Writes records with `INSERT OR IGNORE`, so a `(tx_hash, chain)` pair
/// that is already present is silently skipped.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory database, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("../sql/schema.sql"))
            .context("applying schema")?;
        Ok(Self { conn })
    }

    /// Number of rows in `affiliate_fees`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM affiliate_fees", [], |r| r.get(0))?;
        Ok(u64::try_from(n)?)
    }

    /// All stored records ordered by chain, block and log index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds a negative number.
    pub fn records(&self) -> Result<Vec<FeeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT chain, protocol, tx_hash, block_number, log_index, timestamp, sender,
                    input_token, input_amount, output_token, output_amount,
                    affiliate_address, fee_token, fee_token_symbol, fee_amount, fee_amount_usd
             FROM affiliate_fees
             ORDER BY chain, block_number, log_index",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                FeeRecord {
                    chain: r.get(0)?,
                    protocol: r.get(1)?,
                    tx_hash: r.get(2)?,
                    sender: r.get(6)?,
                    input_token: r.get(7)?,
                    input_amount: r.get(8)?,
                    output_token: r.get(9)?,
                    output_amount: r.get(10)?,
                    affiliate_address: r.get(11)?,
                    fee_token: r.get(12)?,
                    fee_token_symbol: r.get(13)?,
                    fee_amount: r.get(14)?,
                    fee_amount_usd: r.get(15)?,
                    ..FeeRecord::default()
                },
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, Option<i64>>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut record, block, log_index, timestamp) = row?;
            record.block_number = u64::try_from(block)?;
            record.log_index = u64::try_from(log_index)?;
            record.timestamp = timestamp.map(u64::try_from).transpose()?;
            out.push(record);
        }
        Ok(out)
    }
}

impl FeeStore for SqliteStore {
    fn append(&mut self, records: &[FeeRecord]) -> Result<usize> {
        let created_at = chrono::Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO affiliate_fees
                 (chain, protocol, tx_hash, block_number, log_index, timestamp, sender,
                  input_token, input_amount, output_token, output_amount,
                  affiliate_address, fee_token, fee_token_symbol, fee_amount, fee_amount_usd,
                  created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for r in records {
                let timestamp = r.timestamp.map(i64::try_from).transpose()?;
                inserted += stmt.execute(params![
                    r.chain,
                    r.protocol,
                    r.tx_hash,
                    i64::try_from(r.block_number).context("block number overflows i64")?,
                    i64::try_from(r.log_index).context("log index overflows i64")?,
                    timestamp,
                    r.sender,
                    r.input_token,
                    r.input_amount,
                    r.output_token,
                    r.output_amount,
                    r.affiliate_address,
                    r.fee_token,
                    r.fee_token_symbol,
                    r.fee_amount,
                    r.fee_amount_usd,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn last_block(&self, chain: &str, source: &str) -> Result<Option<u64>> {
        let block: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_block FROM block_tracker WHERE chain = ?1 AND source = ?2",
                params![chain, source],
                |r| r.get(0),
            )
            .optional()?;
        Ok(block.map(u64::try_from).transpose()?)
    }

    fn set_last_block(&mut self, chain: &str, source: &str, block: u64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO block_tracker (chain, source, last_block, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                chain,
                source,
                i64::try_from(block).context("block number overflows i64")?,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chain: &str, tx: &str) -> FeeRecord {
        FeeRecord {
            chain: chain.into(),
            protocol: "portals".into(),
            tx_hash: tx.into(),
            block_number: 19_500_000,
            log_index: 3,
            timestamp: Some(1_710_000_000),
            affiliate_address: "0x90a48d5cf7343b08da12e067680b4c6dbfe551be".into(),
            fee_token: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
            fee_token_symbol: "USDC".into(),
            fee_amount: "2500000".into(),
            fee_amount_usd: Some(2.5),
            ..FeeRecord::default()
        }
    }

    #[test]
    fn duplicate_tx_and_chain_is_ignored() {
        let mut store = SqliteStore::open_in_memory().expect("db");
        let batch = [record("ethereum", "0xabc"), record("ethereum", "0xdef")];

        assert_eq!(store.append(&batch).expect("first run"), 2, "both inserted");
        assert_eq!(store.append(&batch).expect("second run"), 0, "nothing new");
        assert_eq!(store.count().expect("count"), 2, "row count unchanged");
    }

    #[test]
    fn same_tx_on_another_chain_is_kept() {
        let mut store = SqliteStore::open_in_memory().expect("db");
        store.append(&[record("ethereum", "0xabc")]).expect("eth");
        store.append(&[record("base", "0xabc")]).expect("base");
        assert_eq!(store.count().expect("count"), 2, "key includes chain");
    }

    #[test]
    fn records_read_back() {
        let mut store = SqliteStore::open_in_memory().expect("db");
        let written = record("ethereum", "0xabc");
        store.append(std::slice::from_ref(&written)).expect("insert");
        assert_eq!(store.records().expect("select"), [written], "round trip");
    }

    #[test]
    fn tracker_upserts() {
        let mut store = SqliteStore::open_in_memory().expect("db");
        assert_eq!(store.last_block("base", "cowswap").expect("read"), None, "empty");
        store.set_last_block("base", "cowswap", 100).expect("insert");
        store.set_last_block("base", "cowswap", 200).expect("replace");
        assert_eq!(store.last_block("base", "cowswap").expect("read"), Some(200), "replaced");
    }

    #[test]
    fn reopening_file_keeps_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fees.db");
        SqliteStore::open(&path)
            .expect("open")
            .append(&[record("ethereum", "0xabc")])
            .expect("insert");
        let store = SqliteStore::open(&path).expect("reopen");
        assert_eq!(store.count().expect("count"), 1, "persisted");
    }
}
