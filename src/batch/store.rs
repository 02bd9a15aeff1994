//! Member and image persistence
//!
//! This module provides:
//! 1. The `MemberStore` contract the orchestrator depends on
//! 2. A SQLite implementation tracking members and downloaded images

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::batch::models::WorkItem;

/// Error types for the member store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt member row: {0}")]
    CorruptRow(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations used by list processing
pub trait MemberStore: Send + Sync {
    /// Every known member
    fn select_all_members(&self) -> StoreResult<Vec<WorkItem>>;

    /// Members not downloaded within the last `days` days
    fn select_members_by_last_download_date(&self, days: u32) -> StoreResult<Vec<WorkItem>>;

    /// Stamp a member as processed now
    fn update_last_download_date(&self, member_id: &str) -> StoreResult<()>;

    /// Upsert members, returning how many were processed
    fn import_list(&self, items: &[WorkItem]) -> StoreResult<usize>;

    /// Whether an image was downloaded before
    fn select_image_by_image_id(&self, image_id: &str) -> StoreResult<bool>;

    /// Remember an image as downloaded
    fn record_image(&self, image_id: &str, member_id: Option<&str>) -> StoreResult<()>;
}

/// SQLite-backed member store
pub struct SqliteStore {
    db_connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open(db_path)?;
        Self::with_connection(connection)
    }

    #[cfg(test)]
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> StoreResult<Self> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS members (
                member_id TEXT PRIMARY KEY,
                root_directory TEXT,
                last_download_date TEXT
            );
            CREATE TABLE IF NOT EXISTS images (
                image_id TEXT PRIMARY KEY,
                member_id TEXT,
                downloaded_at TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            db_connection: Mutex::new(connection),
        })
    }

    fn query_members(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<WorkItem>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            let member_id: String = row.get(0)?;
            let root_directory: Option<String> = row.get(1)?;
            Ok((member_id, root_directory))
        })?;

        let mut members = Vec::new();
        for row in rows {
            let (member_id, root_directory) = row?;
            let item = WorkItem::new(member_id.clone(), root_directory.map(PathBuf::from))
                .ok_or(StoreError::CorruptRow(member_id))?;
            members.push(item);
        }

        Ok(members)
    }
}

impl MemberStore for SqliteStore {
    fn select_all_members(&self) -> StoreResult<Vec<WorkItem>> {
        let conn = self.db_connection.lock();
        Self::query_members(
            &conn,
            "SELECT member_id, root_directory FROM members ORDER BY rowid",
            &[],
        )
    }

    fn select_members_by_last_download_date(&self, days: u32) -> StoreResult<Vec<WorkItem>> {
        let cutoff = TimeDelta::try_days(i64::from(days)).and_then(|window| Utc::now().checked_sub_signed(window));
        let conn = self.db_connection.lock();
        match cutoff {
            Some(cutoff) => Self::query_members(
                &conn,
                "SELECT member_id, root_directory FROM members
                 WHERE last_download_date IS NULL OR last_download_date < ?1
                 ORDER BY rowid",
                &[&cutoff.to_rfc3339()],
            ),
            // window reaches past the earliest representable date, only never-downloaded members are stale
            None => {
                debug!("Window of {} days predates every timestamp", days);
                Self::query_members(
                    &conn,
                    "SELECT member_id, root_directory FROM members
                     WHERE last_download_date IS NULL
                     ORDER BY rowid",
                    &[],
                )
            }
        }
    }

    fn update_last_download_date(&self, member_id: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db_connection.lock();
        conn.execute(
            "INSERT INTO members (member_id, root_directory, last_download_date) VALUES (?1, NULL, ?2)
             ON CONFLICT(member_id) DO UPDATE SET last_download_date = excluded.last_download_date",
            params![member_id, now],
        )?;
        debug!("Updated last download date for member {}", member_id);

        Ok(())
    }

    fn import_list(&self, items: &[WorkItem]) -> StoreResult<usize> {
        let mut conn = self.db_connection.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO members (member_id, root_directory) VALUES (?1, ?2)
                 ON CONFLICT(member_id) DO UPDATE SET root_directory = excluded.root_directory",
            )?;
            for item in items {
                let root = item.root_directory().map(|dir| dir.to_string_lossy().into_owned());
                stmt.execute(params![item.member_id(), root])?;
            }
        }
        tx.commit()?;
        info!("Imported {} members", items.len());

        Ok(items.len())
    }

    fn select_image_by_image_id(&self, image_id: &str) -> StoreResult<bool> {
        let conn = self.db_connection.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM images WHERE image_id = ?1 LIMIT 1",
                params![image_id],
                |_| Ok(()),
            )
            .optional()?;

        Ok(found.is_some())
    }

    fn record_image(&self, image_id: &str, member_id: Option<&str>) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db_connection.lock();
        conn.execute(
            "INSERT OR REPLACE INTO images (image_id, member_id, downloaded_at) VALUES (?1, ?2, ?3)",
            params![image_id, member_id, now],
        )?;

        Ok(())
    }
}
