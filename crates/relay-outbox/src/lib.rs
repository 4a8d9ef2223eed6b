//! Durable outbox of messages waiting for an offline robot.
//!
//! This crate provides:
//! - `OutboxStore`: the storage seam (append, paged fetch, remove, depth)
//! - `SqliteOutbox`: the default store, on the relay's SQLite database
//! - `RedisOutbox`: per-recipient sorted sets in Redis
//! - `OutboxDrain`: a lazy, restartable cursor over one recipient's backlog

mod drain;
mod error;
mod redis_store;
mod sqlite;
mod store;

pub use drain::{OutboxDrain, DRAIN_PAGE_SIZE};
pub use error::{OutboxError, OutboxResult};
pub use redis_store::RedisOutbox;
pub use sqlite::SqliteOutbox;
pub use store::OutboxStore;
