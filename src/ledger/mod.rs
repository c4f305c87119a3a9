//! Durable per-item progress ledger backed by SQLite
//!
//! One row per HS code with an overall status and an independent status
//! per trade mode. Every mutation is a single-row, single-statement update;
//! the batch runner guarantees one writer per row.

mod entry;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::scrape_task::TradeMode;
use crate::work_source::HsCode;

pub use entry::{FailureScope, ItemStatus, LedgerEntry, LedgerStats};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS hs_codes (
    code TEXT PRIMARY KEY,
    overall_status TEXT NOT NULL DEFAULT 'pending',
    export_status TEXT NOT NULL DEFAULT 'pending',
    import_status TEXT NOT NULL DEFAULT 'pending',
    export_scraped_at TEXT,
    import_scraped_at TEXT,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_hs_codes_overall ON hs_codes(overall_status);
CREATE INDEX IF NOT EXISTS idx_hs_codes_export ON hs_codes(export_status);
CREATE INDEX IF NOT EXISTS idx_hs_codes_import ON hs_codes(import_status);
"#;

const ENTRY_COLUMNS: &str = "code, overall_status, export_status, import_status, \
     export_scraped_at, import_scraped_at, error_count, last_error";

/// Progress ledger handle; cheap to clone
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    pool: SqlitePool,
}

impl ProgressLedger {
    /// Open an existing ledger or create a new one at `path`
    pub async fn open(path: &Path) -> HarvestResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        info!("Progress ledger opened: {}", path.display());
        Ok(ledger)
    }

    /// Private in-memory ledger
    ///
    /// Limited to one connection that is never recycled, since every
    /// SQLite connection to `:memory:` sees its own database.
    pub async fn open_in_memory() -> HarvestResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> HarvestResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert codes as pending; existing rows are left untouched
    ///
    /// Returns how many rows were new.
    pub async fn bulk_insert(&self, codes: &[HsCode]) -> HarvestResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for code in codes {
            inserted += sqlx::query("INSERT OR IGNORE INTO hs_codes (code) VALUES (?)")
                .bind(code.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        info!(
            "Inserted {inserted} new HS codes into ledger ({} already present)",
            codes.len() as u64 - inserted
        );
        Ok(inserted)
    }

    /// Items whose overall status is pending, in insertion order
    pub async fn get_pending(&self) -> HarvestResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM hs_codes WHERE overall_status = 'pending' ORDER BY rowid"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Codes whose status for `mode` is pending
    pub async fn get_pending_for_mode(&self, mode: TradeMode) -> HarvestResult<Vec<String>> {
        let sql = format!(
            "SELECT code FROM hs_codes WHERE {} = 'pending' ORDER BY rowid",
            mode.status_column()
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Record a successful fetch for one mode
    ///
    /// The overall status is promoted to completed in the same statement
    /// when the other mode is already completed.
    pub async fn mark_mode_completed(
        &self,
        code: &str,
        mode: TradeMode,
        scraped_at: DateTime<FixedOffset>,
    ) -> HarvestResult<()> {
        let other = match mode {
            TradeMode::Export => TradeMode::Import,
            TradeMode::Import => TradeMode::Export,
        };
        let sql = format!(
            "UPDATE hs_codes SET {status} = 'completed', {at} = ?, \
             overall_status = CASE WHEN {other} = 'completed' THEN 'completed' ELSE overall_status END \
             WHERE code = ?",
            status = mode.status_column(),
            at = mode.scraped_at_column(),
            other = other.status_column(),
        );
        sqlx::query(&sql)
            .bind(scraped_at.to_rfc3339())
            .bind(code)
            .execute(&self.pool)
            .await?;
        debug!("Ledger: {code} [{mode}] completed");
        Ok(())
    }

    /// Record a terminal failure against one mode or the whole item
    ///
    /// Increments `error_count` by one either way.
    pub async fn mark_failed(&self, code: &str, error: &str, scope: FailureScope) -> HarvestResult<()> {
        let column = match scope {
            FailureScope::Mode(mode) => mode.status_column(),
            FailureScope::Overall => "overall_status",
        };
        let sql = format!(
            "UPDATE hs_codes SET {column} = 'failed', error_count = error_count + 1, last_error = ? \
             WHERE code = ?"
        );
        sqlx::query(&sql)
            .bind(error)
            .bind(code)
            .execute(&self.pool)
            .await?;
        debug!("Ledger: {code} failed ({scope:?}): {error}");
        Ok(())
    }

    /// Mark the item and both modes completed
    pub async fn mark_completed(&self, code: &str, at: DateTime<FixedOffset>) -> HarvestResult<()> {
        let stamp = at.to_rfc3339();
        sqlx::query(
            "UPDATE hs_codes SET overall_status = 'completed', \
             export_status = 'completed', import_status = 'completed', \
             export_scraped_at = COALESCE(export_scraped_at, ?), \
             import_scraped_at = COALESCE(import_scraped_at, ?) \
             WHERE code = ?",
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(code)
        .execute(&self.pool)
        .await?;
        debug!("Ledger: {code} completed");
        Ok(())
    }

    pub async fn get_entry(&self, code: &str) -> HarvestResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM hs_codes WHERE code = ?");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    pub async fn get_all_codes(&self) -> HarvestResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT code FROM hs_codes ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Move failed statuses back to pending
    ///
    /// `error_count` and `last_error` are kept. Returns the number of rows
    /// touched.
    pub async fn requeue_failed(&self) -> HarvestResult<u64> {
        let affected = sqlx::query(
            "UPDATE hs_codes SET \
             overall_status = CASE WHEN overall_status = 'failed' THEN 'pending' ELSE overall_status END, \
             export_status = CASE WHEN export_status = 'failed' THEN 'pending' ELSE export_status END, \
             import_status = CASE WHEN import_status = 'failed' THEN 'pending' ELSE import_status END \
             WHERE overall_status = 'failed' OR export_status = 'failed' OR import_status = 'failed'",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();
        info!("Requeued {affected} failed HS codes");
        Ok(affected)
    }

    pub async fn stats(&self) -> HarvestResult<LedgerStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN overall_status = 'completed' THEN 1 ELSE 0 END), 0) AS completed, \
             COALESCE(SUM(CASE WHEN overall_status = 'pending' THEN 1 ELSE 0 END), 0) AS pending, \
             COALESCE(SUM(CASE WHEN overall_status = 'failed' THEN 1 ELSE 0 END), 0) AS failed, \
             COALESCE(SUM(CASE WHEN export_status = 'completed' THEN 1 ELSE 0 END), 0) AS export_completed, \
             COALESCE(SUM(CASE WHEN export_status = 'failed' THEN 1 ELSE 0 END), 0) AS export_failed, \
             COALESCE(SUM(CASE WHEN import_status = 'completed' THEN 1 ELSE 0 END), 0) AS import_completed, \
             COALESCE(SUM(CASE WHEN import_status = 'failed' THEN 1 ELSE 0 END), 0) AS import_failed \
             FROM hs_codes",
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get("completed")?;
        let completion_percent = if total > 0 {
            ((completed as f64 / total as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(LedgerStats {
            total,
            completed,
            pending: row.try_get("pending")?,
            failed: row.try_get("failed")?,
            export_completed: row.try_get("export_completed")?,
            export_failed: row.try_get("export_failed")?,
            import_completed: row.try_get("import_completed")?,
            import_failed: row.try_get("import_failed")?,
            completion_percent,
        })
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_err(msg: String) -> HarvestError {
    HarvestError::Ledger(sqlx::Error::Decode(msg.into()))
}

fn parse_status(row: &SqliteRow, column: &str) -> HarvestResult<ItemStatus> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(decode_err)
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> HarvestResult<Option<DateTime<FixedOffset>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map_err(|e| decode_err(format!("bad timestamp in {column}: {e}")))
    })
    .transpose()
}

fn entry_from_row(row: &SqliteRow) -> HarvestResult<LedgerEntry> {
    Ok(LedgerEntry {
        code: row.try_get("code")?,
        overall_status: parse_status(row, "overall_status")?,
        export_status: parse_status(row, "export_status")?,
        import_status: parse_status(row, "import_status")?,
        export_scraped_at: parse_timestamp(row, "export_scraped_at")?,
        import_scraped_at: parse_timestamp(row, "import_scraped_at")?,
        error_count: row.try_get("error_count")?,
        last_error: row.try_get("last_error")?,
    })
}
