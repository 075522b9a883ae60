use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::model::release::{Direction, RealizationStatus, RealizedRelease, ReleaseEvent};

/// SQLite ledger of every release the executor acted on.
pub struct ReleaseLedger {
    conn: Connection,
    path: PathBuf,
}

impl ReleaseLedger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(AppError::from)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(AppError::from)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                price REAL NOT NULL,
                direction TEXT NOT NULL,
                amount REAL NOT NULL,
                trade_count INTEGER NOT NULL,
                quantity REAL NOT NULL,
                fee REAL NOT NULL,
                net REAL NOT NULL,
                capital REAL NOT NULL,
                status TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_releases_symbol ON releases(symbol, timestamp_ms);
            "#,
        )
        .map_err(AppError::from)
        .with_context(|| format!("failed to initialise ledger {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, release: &RealizedRelease) -> Result<()> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let ev = &release.event;
        self.conn.execute(
            r#"
            INSERT INTO releases (
                symbol, timestamp_ms, price, direction, amount, trade_count,
                quantity, fee, net, capital, status, recorded_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                ev.symbol,
                ev.timestamp_ms as i64,
                ev.price,
                ev.direction.as_str(),
                ev.amount,
                ev.trade_count as i64,
                release.quantity,
                release.fee,
                release.net,
                release.capital,
                release.status.as_str(),
                now_ms,
            ],
        )
        .map_err(AppError::from)?;
        Ok(())
    }

    fn query(&self, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<RealizedRelease>> {
        let sql = format!(
            "SELECT symbol, timestamp_ms, price, direction, amount, trade_count, \
                    quantity, fee, net, capital, status \
             FROM releases {} ORDER BY id ASC",
            filter
        );
        let mut stmt = self.conn.prepare(&sql).map_err(AppError::from)?;
        let rows = stmt
            .query_map(params, row_to_release)
            .map_err(AppError::from)?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::from)?)
    }

    pub fn load(&self, symbol: &str) -> Result<Vec<RealizedRelease>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.query("WHERE symbol = ?1", &[&symbol])
    }

    pub fn load_all(&self) -> Result<Vec<RealizedRelease>> {
        self.query("", &[])
    }

    /// Releases recorded at or after `since_ms` (wall clock of the write).
    pub fn load_since(&self, since_ms: i64) -> Result<Vec<RealizedRelease>> {
        self.query("WHERE recorded_at_ms >= ?1", &[&since_ms])
    }
}

fn row_to_release(row: &rusqlite::Row<'_>) -> rusqlite::Result<RealizedRelease> {
    let direction: String = row.get(3)?;
    let status: String = row.get(10)?;
    Ok(RealizedRelease {
        event: ReleaseEvent {
            symbol: row.get(0)?,
            timestamp_ms: row.get::<_, i64>(1)?.max(0) as u64,
            price: row.get(2)?,
            direction: if direction == "DOWN" {
                Direction::Down
            } else {
                Direction::Up
            },
            amount: row.get(4)?,
            trade_count: row.get::<_, i64>(5)?.max(0) as u64,
        },
        quantity: row.get(6)?,
        fee: row.get(7)?,
        net: row.get(8)?,
        capital: row.get(9)?,
        status: RealizationStatus::from_str_lossy(&status),
    })
}

pub const CSV_HEADER: [&str; 11] = [
    "symbol",
    "timestamp_ms",
    "price",
    "direction",
    "amount",
    "trade_count",
    "quantity",
    "fee",
    "net",
    "capital",
    "status",
];

pub fn releases_to_csv(records: &[RealizedRelease]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER).map_err(AppError::from)?;
    for r in records {
        wtr.write_record([
            r.event.symbol.clone(),
            r.event.timestamp_ms.to_string(),
            format!("{:.8}", r.event.price),
            r.event.direction.as_str().to_string(),
            format!("{:.8}", r.event.amount),
            r.event.trade_count.to_string(),
            format!("{:.8}", r.quantity),
            format!("{:.8}", r.fee),
            format!("{:.8}", r.net),
            format!("{:.8}", r.capital),
            r.status.as_str().to_string(),
        ])
        .map_err(AppError::from)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `releases_<unix_ts>.csv` under `dir`. Nothing is written when there
/// are no records.
pub fn export_csv(records: &[RealizedRelease], dir: &Path) -> Result<Option<PathBuf>> {
    if records.is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(dir)
        .map_err(AppError::from)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("releases_{}.csv", chrono::Utc::now().timestamp()));
    let body = releases_to_csv(records)?;
    std::fs::write(&path, body)
        .map_err(AppError::from)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(Some(path))
}
