//! The record-store seam.
//!
//! Behaviors never talk to a database directly. They receive a
//! [`StoreTransaction`] from the lifecycle and issue the handful of scoped
//! operations they need: counting a group, shifting order values, updating
//! one row. Everything is async and cancel-aware through `Cx`, and every
//! result is an `Outcome` so cancellation and panics propagate untouched.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::filter::Filter;
use crate::row::Row;
use crate::value::Value;

/// Transaction isolation level requested from a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling.
    pub const fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Operations available inside one all-or-nothing transaction.
///
/// Nothing done through a transaction is visible to other transactions
/// until `commit` succeeds. Dropping a transaction without calling `commit`
/// discards its work.
pub trait StoreTransaction: Send + Sync {
    /// Number of rows in `table` matching `filter`.
    fn count(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Rows in `table` matching `filter`.
    fn find(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Insert one row. Returns the generated key when the store assigned one.
    fn insert(
        &self,
        cx: &Cx,
        table: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;

    /// Set several columns on every matching row. Returns rows affected.
    fn update(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Set one column to `value` on every matching row.
    fn update_all(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        column: &str,
        value: Value,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let values = [(column.to_string(), value)];
        async move { self.update(cx, table, filter, &values).await }
    }

    /// Add `delta` to an integer column on every matching row.
    fn update_all_counters(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        column: &str,
        delta: i64,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Delete every matching row. Returns rows affected.
    fn delete_all(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Make every change visible atomically.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Discard every change.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}

/// A store that can open transactions and answer autocommit reads.
pub trait RecordStore: Send + Sync {
    type Tx: StoreTransaction + 'static;

    /// Open a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx, Error>> + Send;

    /// Autocommit count.
    fn count(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Autocommit read.
    fn find(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;
}
