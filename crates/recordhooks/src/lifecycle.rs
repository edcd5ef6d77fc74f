//! The save/delete pipeline that drives behaviors.
//!
//! ```text
//! save:   prepare_save* ─▶ BEGIN ─▶ before_insert|before_update* ─▶ write row
//!                          ─▶ after_save* ─▶ COMMIT ─▶ after_commit*
//! delete:                  BEGIN ─▶ read row ─▶ delete row ─▶ after_delete* ─▶ COMMIT
//! ```
//!
//! Every hook that touches storage runs on the same transaction as the row
//! write, so a failure anywhere leaves storage exactly as it was.

use asupersync::{Cx, Outcome};
use recordhooks_core::{
    Behavior, Error, ModelEvent, Record, RecordStore, SaveKind, StorageErrorKind,
    StoreTransaction, Value, storage_error,
};
use serde::{Deserialize, Serialize};

/// Pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleConfig {
    /// How many times a save or delete that lost a commit race is replayed.
    pub conflict_retries: u32,
    /// Attribute store failures are reported on when no behavior names one.
    pub fallback_error_attribute: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            fallback_error_attribute: "base".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn fallback_error_attribute(mut self, name: impl Into<String>) -> Self {
        self.fallback_error_attribute = name.into();
        self
    }
}

/// How one save attempt ended, short of a store error.
enum Attempt {
    Saved(ModelEvent),
    Vetoed(&'static str),
}

/// Runs registered behaviors around record writes on a store.
pub struct Lifecycle<S: RecordStore> {
    store: S,
    behaviors: Vec<Box<dyn Behavior<S::Tx>>>,
    config: LifecycleConfig,
}

impl<S: RecordStore + std::fmt::Debug> std::fmt::Debug for Lifecycle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("store", &self.store)
            .field("behaviors", &self.behavior_names())
            .field("config", &self.config)
            .finish()
    }
}

impl<S: RecordStore> Lifecycle<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            behaviors: Vec::new(),
            config: LifecycleConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a behavior. Hooks run in registration order.
    pub fn with_behavior<B>(mut self, behavior: B) -> Self
    where
        B: Behavior<S::Tx> + 'static,
    {
        self.add_behavior(behavior);
        self
    }

    pub fn add_behavior<B>(&mut self, behavior: B)
    where
        B: Behavior<S::Tx> + 'static,
    {
        tracing::debug!(behavior = behavior.name(), "Registered behavior");
        self.behaviors.push(Box::new(behavior));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    /// Insert or update `record`.
    ///
    /// Returns `Ok(true)` when the record was written, `Ok(false)` when a
    /// behavior vetoed the save or the store failed. In both `false` cases
    /// nothing was written and the record's attributes are back to what
    /// they were before the call; store failures are attached to
    /// `record.errors()`.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(table = %record.table_name(), new = record.is_new_record())
    )]
    pub async fn save<R: Record>(&self, cx: &Cx, record: &mut R) -> Outcome<bool, Error> {
        let kind = if record.is_new_record() {
            SaveKind::Insert
        } else {
            SaveKind::Update
        };
        record.errors_mut().clear();

        let mut event = ModelEvent::new(kind);
        for behavior in &self.behaviors {
            behavior.prepare_save(&*record, &mut event);
            if !event.is_valid() {
                tracing::info!(behavior = behavior.name(), "Save rejected before storage");
                return Outcome::Ok(false);
            }
        }

        let snapshot = record.attributes();
        let mut retries = 0;
        loop {
            let mut culprit = None;
            let outcome = self.attempt_save(cx, &mut *record, kind, &mut culprit).await;
            match outcome {
                Outcome::Ok(Attempt::Saved(event)) => {
                    record.mark_persisted();
                    for behavior in &self.behaviors {
                        behavior.after_commit(&mut *record, &event);
                    }
                    tracing::debug!(retries = retries, "Record saved");
                    return Outcome::Ok(true);
                }
                Outcome::Ok(Attempt::Vetoed(name)) => {
                    record.restore(snapshot);
                    tracing::info!(behavior = name, "Save vetoed inside transaction");
                    return Outcome::Ok(false);
                }
                Outcome::Err(e) if e.is_retryable() && retries < self.config.conflict_retries => {
                    retries += 1;
                    record.restore(snapshot.clone());
                    tracing::debug!(attempt = retries, error = %e, "Retrying save after conflict");
                }
                Outcome::Err(e) => {
                    record.restore(snapshot);
                    let attribute = self.error_attribute(culprit);
                    tracing::warn!(attribute = %attribute, error = %e, "Save failed; rolled back");
                    record.add_error(&attribute, &e.to_string());
                    return Outcome::Ok(false);
                }
                Outcome::Cancelled(r) => {
                    record.restore(snapshot);
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    record.restore(snapshot);
                    return Outcome::Panicked(p);
                }
            }
        }
    }

    /// One transaction: hooks, row write, hooks, commit. Rolls back on any exit
    /// other than a successful commit. `culprit` is set to the index of the
    /// behavior whose hook failed, if one did.
    async fn attempt_save(
        &self,
        cx: &Cx,
        record: &mut dyn Record,
        kind: SaveKind,
        culprit: &mut Option<usize>,
    ) -> Outcome<Attempt, Error> {
        let tx = match self.store.begin(cx).await {
            Outcome::Ok(tx) => tx,
            other => return other.map(|_| Attempt::Vetoed("")),
        };

        let mut event = ModelEvent::new(kind);
        for (idx, behavior) in self.behaviors.iter().enumerate() {
            let hook = match kind {
                SaveKind::Insert => behavior.before_insert(cx, &tx, record, &mut event).await,
                SaveKind::Update => behavior.before_update(cx, &tx, record, &mut event).await,
            };
            if !matches!(hook, Outcome::Ok(())) {
                *culprit = Some(idx);
                abort(cx, tx).await;
                return hook.map(|()| Attempt::Vetoed(""));
            }
            if !event.is_valid() {
                abort(cx, tx).await;
                return Outcome::Ok(Attempt::Vetoed(behavior.name()));
            }
        }

        let written = match kind {
            SaveKind::Insert => insert_row(cx, &tx, record).await,
            SaveKind::Update => update_row(cx, &tx, &*record).await,
        };
        if !matches!(written, Outcome::Ok(())) {
            abort(cx, tx).await;
            return written.map(|()| Attempt::Vetoed(""));
        }

        for (idx, behavior) in self.behaviors.iter().enumerate() {
            let hook = behavior.after_save(cx, &tx, &*record, &mut event).await;
            if !matches!(hook, Outcome::Ok(())) {
                *culprit = Some(idx);
                abort(cx, tx).await;
                return hook.map(|()| Attempt::Vetoed(""));
            }
        }

        tx.commit(cx).await.map(|()| Attempt::Saved(event))
    }

    /// Delete `record` and run every `after_delete` hook, atomically.
    ///
    /// Returns `Ok(false)` for records that were never saved or whose row is
    /// already gone. Store and hook failures roll the deletion back and are
    /// returned as `Outcome::Err`.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %record.table_name()))]
    pub async fn delete<R: Record>(&self, cx: &Cx, record: &R) -> Outcome<bool, Error> {
        if record.is_new_record() {
            tracing::debug!("Delete of unsaved record ignored");
            return Outcome::Ok(false);
        }

        let mut retries = 0;
        loop {
            match self.attempt_delete(cx, record).await {
                Outcome::Err(e) if e.is_retryable() && retries < self.config.conflict_retries => {
                    retries += 1;
                    tracing::debug!(attempt = retries, error = %e, "Retrying delete after conflict");
                }
                Outcome::Err(e) => {
                    tracing::warn!(error = %e, "Delete failed; rolled back");
                    return Outcome::Err(e);
                }
                other => return other,
            }
        }
    }

    async fn attempt_delete(&self, cx: &Cx, record: &dyn Record) -> Outcome<bool, Error> {
        let tx = match self.store.begin(cx).await {
            Outcome::Ok(tx) => tx,
            other => return other.map(|_| false),
        };

        let filter = record.primary_key_filter();
        let stored = match tx.find(cx, record.table_name(), &filter).await {
            Outcome::Ok(rows) => rows.into_iter().next(),
            other => {
                abort(cx, tx).await;
                return other.map(|_| false);
            }
        };
        let Some(stored) = stored else {
            abort(cx, tx).await;
            tracing::debug!("Row already gone; nothing deleted");
            return Outcome::Ok(false);
        };

        let deleted = match tx.delete_all(cx, record.table_name(), &filter).await {
            Outcome::Ok(n) => n,
            other => {
                abort(cx, tx).await;
                return other.map(|_| false);
            }
        };
        if deleted == 0 {
            abort(cx, tx).await;
            tracing::debug!("Row already gone; nothing deleted");
            return Outcome::Ok(false);
        }

        for behavior in &self.behaviors {
            let hook = behavior.after_delete(cx, &tx, record, &stored).await;
            if !matches!(hook, Outcome::Ok(())) {
                tracing::debug!(behavior = behavior.name(), "after_delete failed");
                abort(cx, tx).await;
                return hook.map(|()| false);
            }
        }

        tx.commit(cx).await.map(|()| true)
    }

    fn error_attribute(&self, culprit: Option<usize>) -> String {
        culprit
            .and_then(|idx| self.behaviors.get(idx))
            .and_then(|b| b.error_attribute())
            .or_else(|| self.behaviors.iter().find_map(|b| b.error_attribute()))
            .unwrap_or(self.config.fallback_error_attribute.as_str())
            .to_string()
    }
}

async fn abort<T: StoreTransaction>(cx: &Cx, tx: T) {
    if let Outcome::Err(e) = tx.rollback(cx).await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

async fn insert_row<T: StoreTransaction>(
    cx: &Cx,
    tx: &T,
    record: &mut dyn Record,
) -> Outcome<(), Error> {
    let id = match tx.insert(cx, record.table_name(), &record.attributes()).await {
        Outcome::Ok(id) => id,
        other => return other.map(|_| ()),
    };
    let Some(id) = id else {
        return Outcome::Ok(());
    };
    // Only single-column keys can be generated.
    let key = match record.primary_key_columns() {
        [key] => key.clone(),
        _ => return Outcome::Ok(()),
    };
    if record.get(&key).is_none_or(|v| v.is_null()) {
        record.set(&key, Value::BigInt(id));
    }
    Outcome::Ok(())
}

async fn update_row<T: StoreTransaction>(
    cx: &Cx,
    tx: &T,
    record: &dyn Record,
) -> Outcome<(), Error> {
    let dirty = record.dirty_attributes();
    if dirty.is_empty() {
        return Outcome::Ok(());
    }
    let filter = record.primary_key_filter();
    match tx.update(cx, record.table_name(), &filter, &dirty).await {
        Outcome::Ok(0) => Outcome::Err(storage_error(
            StorageErrorKind::NotFound,
            format!("row of '{}' no longer exists", record.table_name()),
        )),
        other => other.map(|_| ()),
    }
}
