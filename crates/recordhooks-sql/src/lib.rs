//! SQL-backed record store for recordhooks.
//!
//! `SqlStore` implements `RecordStore` on top of any driver implementing
//! [`SqlExecutor`]. Group counts, order shifts and row writes are rendered as
//! parameterized statements for the connection's [`Dialect`]:
//!
//! ```text
//! SELECT COUNT(*) AS "count" FROM "items" WHERE "list_id" = $1
//! UPDATE "items" SET "order" = "order" + $1 WHERE "list_id" = $2 AND "order" >= $3
//! ```
//!
//! Everything a behavior does between `begin` and `commit` runs inside one
//! database transaction, so the database's isolation level decides how
//! concurrent saves into the same group interact. Use
//! `IsolationLevel::Serializable` (Postgres/MySQL) to have the loser fail
//! with a retryable conflict; SQLite serializes writers with
//! `BEGIN IMMEDIATE`.

pub mod dialect;
pub mod executor;
pub mod render;
pub mod store;

pub use dialect::Dialect;
pub use executor::SqlExecutor;
pub use store::{SqlStore, SqlTransaction};
