//! Snapshot transactions over a `MemoryStore`.
//!
//! A transaction copies a table the first time it reads or writes it and
//! remembers the committed version it copied. Tables it never touches are
//! never copied.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};
use recordhooks_core::{Error, Filter, Row, StoreTransaction, Value};

use crate::table::Table;
use crate::{Shared, default_table};

#[derive(Debug, Default)]
struct Working {
    /// Private copies; `None` for tables that did not exist when first seen.
    tables: BTreeMap<String, Option<Table>>,
    /// Committed version of each table at the time it was copied.
    base_versions: BTreeMap<String, u64>,
    written: BTreeSet<String>,
}

impl Working {
    fn load(&mut self, shared: &Shared, name: &str) -> &mut Option<Table> {
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = shared.lock();
                let version = state.versions.get(name).copied().unwrap_or(0);
                self.base_versions.insert(name.to_string(), version);
                entry.insert(state.tables.get(name).cloned())
            }
        }
    }
}

/// A transaction on a [`MemoryStore`](crate::MemoryStore).
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    working: Mutex<Working>,
    finished: bool,
}

impl MemoryTransaction {
    pub(crate) fn begin(shared: Arc<Shared>) -> Self {
        shared.lock().stats.transactions_begun += 1;
        Self {
            shared,
            working: Mutex::new(Working::default()),
            finished: false,
        }
    }

    fn working(&self) -> MutexGuard<'_, Working> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, table: &str, f: impl FnOnce(Option<&Table>) -> T) -> T {
        let mut working = self.working();
        f(working.load(&self.shared, table).as_ref())
    }

    fn write<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> Result<T, Error>,
    ) -> Outcome<T, Error> {
        if let Err(e) = self.shared.lock().check_write(table) {
            return Outcome::Err(e);
        }
        let mut working = self.working();
        let target = working
            .load(&self.shared, table)
            .get_or_insert_with(default_table);
        match f(target) {
            Ok(v) => {
                working.written.insert(table.to_string());
                Outcome::Ok(v)
            }
            Err(e) => Outcome::Err(e),
        }
    }

    fn finish_rollback(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.lock().stats.rollbacks += 1;
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Memory transaction dropped without commit; discarding");
            self.finish_rollback();
        }
    }
}

impl StoreTransaction for MemoryTransaction {
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
            Outcome::Ok(self.read(table, |t| t.map_or(0, |t| t.count(filter))))
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
            Outcome::Ok(self.read(table, |t| t.map(|t| t.find(filter)).unwrap_or_default()))
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        table: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.write(table, |t| t.insert(table, values))
        }
    }

    fn update(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.write(table, |t| Ok(t.update(filter, values)))
        }
    }

    fn update_all_counters(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        column: &str,
        delta: i64,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.write(table, |t| t.add_to_column(table, filter, column, delta))
        }
    }

    fn delete_all(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.write(table, |t| Ok(t.delete(filter)))
        }
    }

    fn commit(mut self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                self.finish_rollback();
                return Outcome::Cancelled(reason);
            }

            let working = std::mem::take(&mut *self.working());
            let mut state = self.shared.lock();

            if !working.written.is_empty() {
                let stale = working.base_versions.iter().find_map(|(table, seen)| {
                    let now = state.versions.get(table).copied().unwrap_or(0);
                    (*seen != now).then_some(table)
                });
                if let Some(table) = stale {
                    state.stats.conflicts += 1;
                    state.stats.rollbacks += 1;
                    drop(state);
                    self.finished = true;
                    tracing::debug!(table = %table, "Commit rejected: table changed since snapshot");
                    return Outcome::Err(Error::Conflict(format!(
                        "table '{table}' was modified by a concurrent transaction"
                    )));
                }
            }

            let mut tables = working.tables;
            for name in &working.written {
                if let Some(Some(table)) = tables.remove(name) {
                    state.tables.insert(name.clone(), table);
                }
                *state.versions.entry(name.clone()).or_default() += 1;
            }
            state.stats.commits += 1;
            drop(state);
            self.finished = true;
            Outcome::Ok(())
        }
    }

    fn rollback(mut self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            self.finish_rollback();
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            Outcome::Ok(())
        }
    }
}
