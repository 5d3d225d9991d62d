//! Play statistics database using SQLite

use crate::LibraryError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Aggregated play statistics of one launch file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayStats {
    pub play_count: u32,
    /// Seconds
    pub play_time: u64,
    pub last_played: Option<DateTime<Utc>>,
}

/// Play statistics database manager
pub struct PlaytimeDb {
    conn: Connection,
}

impl PlaytimeDb {
    /// Open or create a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an existing database without write access
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LibraryError::PathNotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS paths (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS plays (
                id INTEGER PRIMARY KEY,
                path_id INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                FOREIGN KEY (path_id) REFERENCES paths(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_plays_path ON plays(path_id);
        "#,
        )?;

        Ok(())
    }

    /// Record a finished play session
    pub fn record_play(
        &mut self,
        path: &Path,
        start: DateTime<Utc>,
        duration_secs: i64,
    ) -> Result<(), LibraryError> {
        let path = path.to_string_lossy();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO paths (path) VALUES (?1)",
            params![path],
        )?;
        let path_id: i64 = tx.query_row(
            "SELECT id FROM paths WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO plays (path_id, start_time, duration) VALUES (?1, ?2, ?3)",
            params![path_id, start.timestamp(), duration_secs],
        )?;

        tx.commit()?;
        tracing::debug!("Recorded {}s of play for {}", duration_secs, path);
        Ok(())
    }

    /// Statistics of every recorded path
    pub fn load_all(&self) -> Result<HashMap<PathBuf, PlayStats>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT paths.path,
                      COUNT(plays.id),
                      SUM(MAX(plays.duration, 0)),
                      MAX(plays.start_time + plays.duration)
               FROM plays
               JOIN paths ON paths.id = plays.path_id
               GROUP BY plays.path_id"#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let path: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let total: Option<i64> = row.get(2)?;
                let last: Option<i64> = row.get(3)?;
                Ok((path, count, total, last))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let stats = rows
            .into_iter()
            .map(|(path, count, total, last)| {
                let stats = PlayStats {
                    play_count: u32::try_from(count).unwrap_or(u32::MAX),
                    play_time: total.and_then(|t| u64::try_from(t).ok()).unwrap_or(0),
                    last_played: last.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                };
                (PathBuf::from(path), stats)
            })
            .collect();

        Ok(stats)
    }

    /// Statistics of the given paths; paths never played are left out
    pub fn load_stats<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a Path>,
    ) -> Result<HashMap<PathBuf, PlayStats>, LibraryError> {
        let mut all = self.load_all()?;
        let stats = paths
            .into_iter()
            .filter_map(|path| all.remove_entry(path))
            .collect();
        Ok(stats)
    }

    /// Number of recorded sessions of one path
    pub fn play_count(&self, path: &Path) -> Result<u32, LibraryError> {
        let count: Option<i64> = self
            .conn
            .query_row(
                r#"SELECT COUNT(plays.id) FROM plays
                   JOIN paths ON paths.id = plays.path_id
                   WHERE paths.path = ?1"#,
                params![path.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(count.and_then(|c| u32::try_from(c).ok()).unwrap_or(0))
    }
}
