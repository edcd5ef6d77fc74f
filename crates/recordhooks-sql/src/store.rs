//! `RecordStore` over a SQL connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use asupersync::{Cx, Outcome};
use recordhooks_core::{
    Error, Filter, IsolationLevel, RecordStore, Row, StorageErrorKind, StoreTransaction, Value,
    storage_error, try_outcome,
};

use crate::executor::SqlExecutor;
use crate::render;

struct Shared<C> {
    executor: C,
    in_transaction: AtomicBool,
    /// A transaction was abandoned; roll it back before the next BEGIN.
    pending_rollback: AtomicBool,
}

/// A record store running every operation as SQL on one connection.
///
/// A connection carries one transaction at a time: `begin` fails with
/// `Error::Transaction` while another transaction from the same store is
/// open. Use one store per pooled connection for parallel work.
pub struct SqlStore<C> {
    shared: Arc<Shared<C>>,
    isolation: Option<IsolationLevel>,
    generated_key: Option<String>,
}

impl<C> Clone for SqlStore<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            isolation: self.isolation,
            generated_key: self.generated_key.clone(),
        }
    }
}

impl<C> std::fmt::Debug for SqlStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore")
            .field("isolation", &self.isolation)
            .field("generated_key", &self.generated_key)
            .field(
                "in_transaction",
                &self.shared.in_transaction.load(Ordering::Acquire),
            )
            .finish_non_exhaustive()
    }
}

impl<C: SqlExecutor> SqlStore<C> {
    /// Wrap a connection. Inserts report the `id` column as generated key.
    pub fn new(executor: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                in_transaction: AtomicBool::new(false),
                pending_rollback: AtomicBool::new(false),
            }),
            isolation: None,
            generated_key: Some("id".to_string()),
        }
    }

    /// Isolation level requested for every transaction.
    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Column reported back from inserts; `None` for tables without a
    /// generated key.
    pub fn with_generated_key(mut self, column: Option<&str>) -> Self {
        self.generated_key = column.map(str::to_string);
        self
    }

    pub fn executor(&self) -> &C {
        &self.shared.executor
    }
}

/// An open SQL transaction. Dropping it without `commit` or `rollback`
/// schedules a `ROLLBACK` before the connection's next `BEGIN`.
pub struct SqlTransaction<C> {
    shared: Arc<Shared<C>>,
    generated_key: Option<String>,
    finished: bool,
}

impl<C> std::fmt::Debug for SqlTransaction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTransaction")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<C> SqlTransaction<C> {
    fn finish(&mut self, clean: bool) {
        self.finished = true;
        if !clean {
            self.shared.pending_rollback.store(true, Ordering::Release);
        }
        self.shared.in_transaction.store(false, Ordering::Release);
    }
}

impl<C> Drop for SqlTransaction<C> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "SqlTransaction dropped without commit/rollback; rolling back before next BEGIN"
            );
            self.finish(false);
        }
    }
}

impl<C: SqlExecutor> SqlTransaction<C> {
    async fn end(mut self, cx: &Cx, statement: &'static str) -> Outcome<(), Error> {
        let result = self.shared.executor.execute(cx, statement, &[]).await;
        self.finish(matches!(result, Outcome::Ok(_)));
        result.map(|_| ())
    }
}

impl<C: SqlExecutor> StoreTransaction for SqlTransaction<C> {
    fn count(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let rendered = render::count(self.shared.executor.dialect(), table, filter);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            let rows = try_outcome!(self.shared.executor.query(cx, &sql, &params).await);
            read_count(&rows)
        }
    }

    fn find(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rendered = render::select(self.shared.executor.dialect(), table, filter);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            self.shared.executor.query(cx, &sql, &params).await
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        table: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        let rendered = render::insert(
            self.shared.executor.dialect(),
            table,
            values,
            self.generated_key.as_deref(),
        );
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            let id = try_outcome!(self.shared.executor.insert(cx, &sql, &params).await);
            Outcome::Ok(id.filter(|_| self.generated_key.is_some()))
        }
    }

    fn update(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let rendered = render::update(self.shared.executor.dialect(), table, filter, values);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            if sql.is_empty() {
                return Outcome::Ok(0);
            }
            self.shared.executor.execute(cx, &sql, &params).await
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
        let rendered = render::update_counters(
            self.shared.executor.dialect(),
            table,
            filter,
            column,
            delta,
        );
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            self.shared.executor.execute(cx, &sql, &params).await
        }
    }

    fn delete_all(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let rendered = render::delete(self.shared.executor.dialect(), table, filter);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            self.shared.executor.execute(cx, &sql, &params).await
        }
    }

    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.end(cx, "COMMIT")
    }

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.end(cx, "ROLLBACK")
    }
}

fn read_count(rows: &[Row]) -> Outcome<u64, Error> {
    let count = rows
        .first()
        .and_then(|row| {
            row.get("count")
                .or_else(|| row.pairs().first().map(|(_, v)| v))
        })
        .and_then(Value::as_i64);
    match count {
        Some(n) => Outcome::Ok(n.max(0) as u64),
        None => Outcome::Err(storage_error(
            StorageErrorKind::Other,
            "COUNT query returned no integer value",
        )),
    }
}

impl<C: SqlExecutor> RecordStore for SqlStore<C> {
    type Tx = SqlTransaction<C>;

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx, Error>> + Send {
        let shared = Arc::clone(&self.shared);
        let statements = shared.executor.dialect().begin_statements(self.isolation);
        let generated_key = self.generated_key.clone();
        async move {
            if shared.in_transaction.swap(true, Ordering::AcqRel) {
                return Outcome::Err(Error::Transaction(
                    "a transaction is already open on this connection".to_string(),
                ));
            }
            let mut tx = SqlTransaction {
                shared,
                generated_key,
                finished: false,
            };

            if tx.shared.pending_rollback.swap(false, Ordering::AcqRel) {
                tracing::debug!("Rolling back abandoned transaction");
                let result = tx.shared.executor.execute(cx, "ROLLBACK", &[]).await;
                if !matches!(result, Outcome::Ok(_)) {
                    tx.finish(false);
                }
                try_outcome!(result);
            }
            for sql in &statements {
                let result = tx.shared.executor.execute(cx, sql, &[]).await;
                if !matches!(result, Outcome::Ok(_)) {
                    // BEGIN never took effect; nothing to roll back.
                    tx.finish(true);
                }
                try_outcome!(result);
            }
            Outcome::Ok(tx)
        }
    }

    fn count(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let rendered = render::count(self.shared.executor.dialect(), table, filter);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            let rows = try_outcome!(self.shared.executor.query(cx, &sql, &params).await);
            read_count(&rows)
        }
    }

    fn find(
        &self,
        cx: &Cx,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rendered = render::select(self.shared.executor.dialect(), table, filter);
        async move {
            let (sql, params) = match rendered {
                Ok(stmt) => stmt,
                Err(e) => return Outcome::Err(e),
            };
            self.shared.executor.query(cx, &sql, &params).await
        }
    }
}
