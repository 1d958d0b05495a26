//! Shared SQLite connection

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::schema::{self, AppKind};

/// SQLite store shared by every tool server of a process (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("conn", &"<rusqlite::Connection>")
            .field("path", &self.path)
            .finish()
    }
}

impl Store {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        info!("Opened bizdesk database at {:?}", path);

        Self::prepare(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, used by tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::prepare(conn, None)
    }

    fn prepare(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("Failed to configure SQLite connection")?;
        conn.execute_batch(schema::COMMON_SCHEMA)
            .context("Failed to create common tables")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run blocking database work on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            f(&conn)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Create the app's tables and insert seed data on first use.
    ///
    /// Returns `true` when seed rows were inserted, `false` when the app
    /// already had data.
    pub async fn initialize(&self, app: AppKind) -> Result<bool> {
        self.call(move |conn| {
            conn.execute_batch(app.schema())
                .with_context(|| format!("Failed to create {} schema", app))?;
            let seeded = app.seed(conn)?;
            if seeded {
                info!("Seeded {} data", app);
            } else {
                debug!("{} data already present, skipping seed", app);
            }
            Ok(seeded)
        })
        .await
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("Database mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_runs_on_connection() -> Result<()> {
        let store = Store::open_in_memory()?;
        let n: i64 = store
            .call(|conn| Ok(conn.query_row("SELECT 40 + 2", [], |r| r.get(0))?))
            .await?;
        assert_eq!(n, 42);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_file_and_initialize_twice() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("bizdesk.db");
        let store = Store::open(&path)?;
        assert_eq!(store.path(), Some(path.as_path()));

        assert!(store.initialize(AppKind::Fusion).await?);
        assert!(!store.initialize(AppKind::Fusion).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_error_propagates() -> Result<()> {
        let store = Store::open_in_memory()?;
        let result: Result<i64> = store
            .call(|conn| Ok(conn.query_row("SELECT * FROM missing_table", [], |r| r.get(0))?))
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
