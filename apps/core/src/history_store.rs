use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{fold_for_prefix, normalize_term, SearchRecord};

const SCHEMA_VERSION: i32 = 2;

const CREATE_SEARCHES: &str = "
CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY,
    search_term TEXT NOT NULL UNIQUE,
    date_searched INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS searches_date_idx ON searches (date_searched DESC);
";

// Version 1 tables allowed duplicate terms and stored dates as REAL.
const MIGRATE_FROM_V1: &str = "
ALTER TABLE searches RENAME TO searches_legacy;
CREATE TABLE searches (
    id INTEGER PRIMARY KEY,
    search_term TEXT NOT NULL UNIQUE,
    date_searched INTEGER NOT NULL
);
INSERT OR IGNORE INTO searches (search_term, date_searched)
    SELECT trim(search_term), CAST(MAX(date_searched) AS INTEGER)
    FROM searches_legacy
    WHERE search_term IS NOT NULL AND trim(search_term) <> ''
    GROUP BY trim(search_term)
    ORDER BY MAX(date_searched);
DROP TABLE searches_legacy;
CREATE INDEX IF NOT EXISTS searches_date_idx ON searches (date_searched DESC);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl Display for StoreLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, ":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("history storage unavailable at {location}: {reason}")]
    StorageUnavailable { location: String, reason: String },
    #[error("history store is closed")]
    StoreClosed,
    #[error("search term must not be empty")]
    EmptyTerm,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("history worker failed: {0}")]
    Worker(String),
}

/// SQLite-backed search history. One connection behind a mutex, so every
/// operation (reads included) is serialized.
#[derive(Default)]
pub struct HistoryStore {
    conn: Mutex<Option<Connection>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(location: &StoreLocation) -> Result<Self, StoreError> {
        let store = Self::new();
        store.init(location)?;
        Ok(store)
    }

    /// Opens or creates the store. A second call while open is a no-op.
    pub fn init(&self, location: &StoreLocation) -> Result<(), StoreError> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Ok(());
        }

        let unavailable = |reason: String| StoreError::StorageUnavailable {
            location: location.to_string(),
            reason,
        };

        let mut conn = match location {
            StoreLocation::Memory => Connection::open_in_memory(),
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
                }
                Connection::open(path)
            }
        }
        .map_err(|e| unavailable(e.to_string()))?;

        ensure_schema(&mut conn).map_err(|e| unavailable(e.to_string()))?;
        tracing::debug!("history store opened at {location}");
        *guard = Some(conn);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn close(&self) {
        if self.lock().take().is_some() {
            tracing::debug!("history store closed");
        }
    }

    /// Inserts one record. Returns `false` when the term was already stored;
    /// the existing row keeps its timestamp.
    pub fn insert(&self, record: &SearchRecord) -> Result<bool, StoreError> {
        let term = normalize_term(&record.term).ok_or(StoreError::EmptyTerm)?;
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let changed = insert_row(conn, &term, record.timestamp)?;
        Ok(changed)
    }

    /// Inserts every record in one transaction. Ignored duplicates do not
    /// abort the batch; any error rolls all of it back.
    pub fn insert_batch(&self, records: &[SearchRecord]) -> Result<usize, StoreError> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::StoreClosed)?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for record in records {
            let term = normalize_term(&record.term).ok_or(StoreError::EmptyTerm)?;
            if insert_row(&tx, &term, record.timestamp)? {
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn query_recent(&self, limit: usize) -> Result<Vec<SearchRecord>, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let mut stmt = conn.prepare(
            "SELECT search_term, date_searched FROM searches
             ORDER BY date_searched DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![sql_limit(limit)], |row| {
            Ok(SearchRecord {
                term: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Case-insensitive prefix match, newest first. Folding uses Unicode
    /// lowercase, so the match runs over the recency-ordered cursor rather
    /// than SQLite's ASCII-only `LIKE`.
    pub fn query_prefix(&self, term: &str, limit: usize) -> Result<Vec<SearchRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefix = fold_for_prefix(term);
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let mut stmt = conn.prepare(
            "SELECT search_term, date_searched FROM searches
             ORDER BY date_searched DESC, id DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let stored: String = row.get(0)?;
            if !stored.to_lowercase().starts_with(&prefix) {
                continue;
            }
            records.push(SearchRecord {
                term: stored,
                timestamp: row.get(1)?,
            });
            if records.len() == limit {
                break;
            }
        }
        Ok(records)
    }

    pub fn contains(&self, term: &str) -> Result<bool, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let found = conn
            .query_row(
                "SELECT 1 FROM searches WHERE search_term = ?1",
                params![term.trim()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM searches", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Drops everything but the newest `max_entries` records.
    pub fn prune(&self, max_entries: usize) -> Result<usize, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let removed = conn.execute(
            "DELETE FROM searches WHERE id NOT IN (
                SELECT id FROM searches ORDER BY date_searched DESC, id DESC LIMIT ?1
             )",
            params![sql_limit(max_entries)],
        )?;
        Ok(removed)
    }

    /// Removes every record. The store stays open; calling `init` again
    /// afterwards is a no-op.
    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::StoreClosed)?;
        let removed = conn.execute("DELETE FROM searches", [])?;
        tracing::info!("history cleared, removed={removed}");
        Ok(removed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // Statements are atomic and batches are transactional, so a poisoned
        // lock still guards consistent data.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// SQLite limits are signed; anything past `i64::MAX` means no limit.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn insert_row(conn: &Connection, term: &str, timestamp: i64) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO searches (search_term, date_searched) VALUES (?1, ?2)",
        params![term, timestamp],
    )?;
    Ok(changed > 0)
}

fn ensure_schema(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let has_table = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'searches'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    let tx = conn.transaction()?;
    if has_table && version < SCHEMA_VERSION {
        tracing::info!("migrating search history schema from version {version}");
        tx.execute_batch(MIGRATE_FROM_V1)?;
    } else {
        tx.execute_batch(CREATE_SEARCHES)?;
    }
    if version < SCHEMA_VERSION {
        tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    }
    tx.commit()
}
