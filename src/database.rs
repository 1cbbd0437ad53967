//! SQLite-backed index of users and photos.
//!
//! `rusqlite` is synchronous, so every call runs on the blocking pool while
//! holding the single connection's lock.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT,
    email    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS photo (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES user(id),
    date    TEXT NOT NULL,
    time    TEXT NOT NULL,
    path    TEXT NOT NULL UNIQUE,
    name    TEXT NOT NULL,
    ext     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_photo_owner_taken ON photo(user_id, date, time);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Database lock poisoned")]
    Poisoned,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || Connection::open(path)).await??;
        let db = Self::from_connection(conn);
        db.initialize().await?;
        info!("Database ready");
        Ok(db)
    }

    /// In-memory database, used by tests and throwaway tooling.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self::from_connection(Connection::open_in_memory()?);
        db.initialize().await?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        self.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    /// Runs `f` against the connection on the blocking pool.
    pub(crate) async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }

    pub async fn add_user(&self, username: &str, email: &str) -> Result<i64, StoreError> {
        let username = username.to_string();
        let email = email.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO user (username, email) VALUES (?1, ?2)",
                params![username, email],
            )?;
            debug!("Inserted user {}", username);
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let username = username.to_string();
        self.call(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email FROM user WHERE username = ?1 LIMIT 1",
                    [username],
                    |row| {
                        Ok(UserRecord {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT id, username, email FROM user ORDER BY username")?;
            let users = stmt
                .query_map([], |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }

    pub async fn count_photos_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
        self.call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM photo WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Returns true when a row was removed.
    pub async fn remove_user(&self, username: &str) -> Result<bool, StoreError> {
        let username = username.to_string();
        self.call(move |conn| {
            let removed = conn.execute("DELETE FROM user WHERE username = ?1", [username])?;
            Ok(removed > 0)
        })
        .await
    }
}
