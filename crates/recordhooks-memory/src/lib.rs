//! In-memory transactional record store.
//!
//! `MemoryStore` implements the `RecordStore` seam without a database. It is
//! the store the behavior test-suites run against, and it is small enough to
//! embed in applications that want ordered lists without SQL.
//!
//! # Transactions
//!
//! - `begin` snapshots every table; the transaction works on its private
//!   copy, so nothing is visible to others before commit.
//! - `commit` validates that no table the transaction read or wrote was
//!   committed by someone else since the snapshot (first committer wins) and
//!   otherwise fails with `Error::Conflict`.
//! - `rollback`, or dropping the transaction, discards the copy.
//!
//! # Fault injection
//!
//! `fail_write_after(n)` lets `n` further writes succeed and fails the next
//! one with a `StorageErrorKind::Injected` error. Tests use it to prove a
//! multi-statement sequence is all-or-nothing.

mod table;
mod transaction;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};
use recordhooks_core::{Error, Filter, RecordStore, Row, StorageErrorKind, Value, storage_error};
use serde::Serialize;

use crate::table::Table;
pub use crate::transaction::MemoryTransaction;

/// Counters describing what a store has done, for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub transactions_begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
    /// Successful write statements (insert/update/counter/delete).
    pub writes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) tables: BTreeMap<String, Table>,
    /// Bumped on every commit that writes the table.
    pub(crate) versions: BTreeMap<String, u64>,
    pub(crate) stats: StoreStats,
    /// Writes still allowed before the injected failure fires.
    pub(crate) fail_after: Option<u64>,
}

impl State {
    /// Account for one write attempt, failing it if a fault is armed.
    pub(crate) fn check_write(&mut self, table: &str) -> Result<(), Error> {
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                tracing::debug!(table = table, "Injected write failure fired");
                Err(storage_error(
                    StorageErrorKind::Injected,
                    format!("injected failure writing table '{table}'"),
                ))
            }
            Some(n) => {
                self.fail_after = Some(n - 1);
                self.stats.writes += 1;
                Ok(())
            }
            None => {
                self.stats.writes += 1;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<State>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-memory, transactional `RecordStore`.
///
/// Cloning is cheap and clones share the same data, like connections to the
/// same database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store. Tables are created on first insert with an
    /// auto-increment `id` column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a table with an explicit auto-increment column.
    /// `None` disables key generation for the table.
    pub fn create_table(&self, name: &str, auto_increment: Option<&str>) {
        let mut state = self.shared.lock();
        state
            .tables
            .insert(name.to_string(), Table::new(auto_increment.map(str::to_string)));
        *state.versions.entry(name.to_string()).or_default() += 1;
    }

    /// Insert committed rows directly, bypassing transactions and faults.
    pub fn seed<I>(&self, table: &str, rows: I) -> Result<Vec<Option<i64>>, Error>
    where
        I: IntoIterator<Item = Vec<(String, Value)>>,
    {
        let mut state = self.shared.lock();
        let target = state
            .tables
            .entry(table.to_string())
            .or_insert_with(default_table);
        let ids = rows
            .into_iter()
            .map(|values| target.insert(table, &values))
            .collect::<Result<Vec<_>, _>>()?;
        *state.versions.entry(table.to_string()).or_default() += 1;
        Ok(ids)
    }

    /// Committed rows of `table` matching `filter`, in insertion order.
    pub fn rows(&self, table: &str, filter: &Filter) -> Vec<Row> {
        self.shared
            .lock()
            .tables
            .get(table)
            .map(|t| t.find(filter))
            .unwrap_or_default()
    }

    /// Arm an injected failure: `n` more writes succeed, the next one fails.
    pub fn fail_write_after(&self, n: u64) {
        self.shared.lock().fail_after = Some(n);
    }

    /// Disarm any pending injected failure.
    pub fn clear_faults(&self) {
        self.shared.lock().fail_after = None;
    }

    pub fn stats(&self) -> StoreStats {
        self.shared.lock().stats
    }
}

pub(crate) fn default_table() -> Table {
    Table::new(Some("id".to_string()))
}

impl RecordStore for MemoryStore {
    type Tx = MemoryTransaction;

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx, Error>> + Send {
        let shared = Arc::clone(&self.shared);
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            Outcome::Ok(MemoryTransaction::begin(shared))
        }
    }

    fn count(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            let state = self.shared.lock();
            Outcome::Ok(state.tables.get(table).map_or(0, |t| t.count(filter)))
        }
    }

    fn find(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            Outcome::Ok(self.rows(table, filter))
        }
    }
}
