//! Single-threaded SQLite executor.
//!
//! `tokio-rusqlite` owns the connection on its own thread; `AsyncDatabase`
//! ships closures to it and awaits the answer. Closures run one at a time,
//! so each `call` sees the effects of every call that completed before it.

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 5000;
    PRAGMA foreign_keys = ON;
";

fn executor_error(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("executor closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Handle to the executor thread. Clones share the same connection.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    location: String,
}

impl AsyncDatabase {
    /// Open (creating if needed) the database file and bring its schema up to date.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let location = path.display().to_string();
        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Self::prepare(conn, location).await
    }

    /// A private in-memory database, gone once the last clone is dropped.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Self::prepare(conn, ":memory:".to_string()).await
    }

    async fn prepare(conn: Connection, location: String) -> DatabaseResult<Self> {
        let db = Self { conn, location };

        let version = db
            .call(|conn| {
                conn.execute_batch(PRAGMAS)?;
                migrations::run_migrations(conn)?;
                migrations::schema_version(conn)
            })
            .await?;

        info!(location = %db.location, schema_version = version, "Database ready");
        Ok(db)
    }

    /// Run `f` on the executor thread.
    ///
    /// Keep closures to SQL and row mapping; anything slow here stalls every
    /// other caller.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)))
            .await
            .map_err(executor_error)?
    }

    /// File path, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Round-trip a trivial query through the executor.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await?;
        debug!(location = %self.location, "Database health check passed");
        Ok(())
    }

    /// Stop the executor after queued calls finish.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn.close().await.map_err(executor_error)?;
        info!(location = %self.location, "Database closed");
        Ok(())
    }
}
