//! The driver seam.

use std::future::Future;

use asupersync::{Cx, Outcome};
use recordhooks_core::{Error, Row, Value};

use crate::dialect::Dialect;

/// A single database connection able to run parameterized SQL.
///
/// Drivers implement this once; `SqlStore` turns it into a `RecordStore`.
/// Failures should be reported as `Error::Storage`, with
/// `StorageErrorKind::Constraint` for constraint violations and
/// `Error::Conflict` for serialization failures the caller may retry.
pub trait SqlExecutor: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a statement and return the number of rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run an INSERT and return the generated key, if the database reported
    /// one (`RETURNING` value or last insert id).
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;
}
