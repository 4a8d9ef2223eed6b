//! SQLite storage behind the relay's durable outbox.
//!
//! [`AsyncDatabase`] owns one connection on a dedicated thread and runs
//! closures against it in submission order. Opening a database applies the
//! pragmas and any pending [migrations](run_migrations) before it is handed
//! out. The outbox SQL lives in [`queries`].
//!
//! ```ignore
//! let db = AsyncDatabase::open(&paths.database_file()).await?;
//! let rows = db
//!     .call(move |conn| queries::fetch_pending(conn, &recipient, None, 50))
//!     .await?;
//! ```
//!
//! Closures passed to `call` should only touch SQL; encode and decode
//! payloads before and after.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, schema_version, CURRENT_VERSION};
pub use models::{NewOutboxMessage, OutboxMessage};
