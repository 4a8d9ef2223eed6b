//! Schema migrations.
//!
//! Each entry in `MIGRATIONS` is applied once, in order, inside its own
//! transaction, and recorded in the `migrations` table.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::Connection;
use tracing::{debug, info};

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    // Counters live apart from the messages so a sequence is never reused,
    // even after a recipient's outbox has been drained empty.
    Migration {
        version: 1,
        name: "outbox",
        sql: "
            CREATE TABLE outbox_sequences (
                recipient TEXT PRIMARY KEY,
                last_sequence INTEGER NOT NULL
            );

            CREATE TABLE outbox_messages (
                recipient TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                origin TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (recipient, sequence)
            ) WITHOUT ROWID;
        ",
    },
    Migration {
        version: 2,
        name: "outbox_created_at_index",
        sql: "CREATE INDEX idx_outbox_messages_created_at ON outbox_messages(created_at);",
    },
];

/// Schema version after every migration has run.
pub const CURRENT_VERSION: i32 = 2;

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> DatabaseResult<i32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?)
}

/// Bring the schema up to `CURRENT_VERSION`.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    let from = schema_version(conn)?;
    if from > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{} is newer than this build (v{})",
            from, CURRENT_VERSION
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        apply(conn, migration)?;
    }

    if from < CURRENT_VERSION {
        info!(from, to = CURRENT_VERSION, "Schema migrated");
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> DatabaseResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).map_err(|e| {
        DatabaseError::Migration(format!("v{} {}: {}", migration.version, migration.name, e))
    })?;
    tx.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.name],
    )?;
    tx.commit()?;

    debug!(version = migration.version, name = migration.name, "Migration applied");
    Ok(())
}
