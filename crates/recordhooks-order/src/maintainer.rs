//! Dense, per-group order maintenance.
//!
//! Within a group (rows sharing the configured reference values) the order
//! column always holds exactly `1..=N`. Every save and delete that goes
//! through the maintainer shifts the rest of the group so this stays true:
//!
//! - **insert**: open a slot at the target position (default: the end);
//! - **move**: extract the row past the end, close the gap it left, open a
//!   slot at the new position;
//! - **group change**: close the gap in the old group, open a slot in the
//!   new one;
//! - **delete**: close the gap.
//!
//! All shifts run on the transaction the lifecycle hands in, together with
//! the write of the record itself, so they commit or roll back as one.

use async_trait::async_trait;
use asupersync::{Cx, Outcome};
use recordhooks_core::{
    Behavior, Error, Filter, ModelEvent, Record, Result, Row, StorageErrorKind, StoreTransaction,
    Value, storage_error, try_outcome,
};

use crate::config::OrderConfig;

/// Keeps an order column contiguous within each group.
#[derive(Debug, Clone)]
pub struct OrderMaintainer {
    config: OrderConfig,
}

impl OrderMaintainer {
    /// Create a maintainer, validating the configuration.
    pub fn new(config: OrderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    fn order_attribute(&self) -> &str {
        &self.config.order_attribute
    }

    /// The record's order value, if it is a positive integer.
    pub fn order_value(&self, record: &dyn Record) -> Option<i64> {
        record
            .get(self.order_attribute())
            .and_then(|v| v.as_positive())
    }

    /// Order value of a stored row, if it is a positive integer.
    pub fn stored_order(&self, row: &Row) -> Option<i64> {
        row.get(self.order_attribute())
            .and_then(Value::as_positive)
    }

    /// Current reference values, as a filter selecting the record's group.
    pub fn group_filter(&self, record: &dyn Record) -> Filter {
        self.config
            .reference_attributes
            .iter()
            .fold(Filter::new(), |filter, attr| {
                filter.eq(attr.clone(), record.get(attr).unwrap_or(Value::Null))
            })
    }

    /// The group a stored row belongs to.
    pub fn stored_group_filter(&self, row: &Row) -> Filter {
        self.config
            .reference_attributes
            .iter()
            .fold(Filter::new(), |filter, attr| {
                filter.eq(attr.clone(), row.get(attr).cloned().unwrap_or(Value::Null))
            })
    }

    /// Whether the record's reference values differ from its stored row.
    pub fn group_changed(&self, record: &dyn Record, stored: &Row) -> bool {
        self.config.reference_attributes.iter().any(|attr| {
            let old = stored.get(attr).cloned().unwrap_or(Value::Null);
            let new = record.get(attr).unwrap_or(Value::Null);
            !old.matches(&new)
        })
    }

    /// Copy order and reference values the record has not changed since it
    /// was loaded from the stored row, so an untouched handle keeps the
    /// position the row holds now.
    pub fn adopt_stored_position(&self, record: &mut dyn Record, stored: &Row) {
        let dirty = record.dirty_attributes();
        let positional = std::iter::once(self.order_attribute())
            .chain(self.config.reference_attributes.iter().map(String::as_str));
        for attr in positional {
            if dirty.iter().any(|(name, _)| name == attr) {
                continue;
            }
            let value = stored.get(attr).cloned().unwrap_or(Value::Null);
            if record.get(attr).as_ref() != Some(&value) {
                record.set(attr, value);
            }
        }
    }

    /// Validation phase: veto saves with no usable order value when
    /// initialization is disabled. Touches no storage.
    pub fn check_initialization(&self, record: &dyn Record, event: &mut ModelEvent) {
        if self.config.prevent_initialization && self.order_value(record).is_none() {
            tracing::debug!(
                table = record.table_name(),
                attribute = self.order_attribute(),
                "Order value missing and initialization disabled; rejecting save"
            );
            event.invalidate();
        }
    }

    /// Number of rows in the record's (current) group.
    pub async fn max_order_in_group<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
    ) -> Outcome<i64, Error> {
        let filter = self.group_filter(record);
        let count = try_outcome!(tx.count(cx, record.table_name(), &filter).await);
        Outcome::Ok(count as i64)
    }

    /// Assign the record's order value and shift the rest of its group(s).
    ///
    /// Runs before the record row is written, on the save transaction.
    pub async fn on_before_save<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        record: &mut dyn Record,
    ) -> Outcome<(), Error> {
        let table = record.table_name().to_string();
        let attr = self.order_attribute().to_string();
        // A record handle may be older than the row; positions come from storage.
        let stored = if record.is_new_record() {
            None
        } else {
            Some(try_outcome!(self.stored_row(cx, tx, &*record).await))
        };
        if let Some(row) = &stored {
            self.adopt_stored_position(record, row);
        }
        let entering = stored
            .as_ref()
            .is_none_or(|row| self.group_changed(&*record, row));

        let count = try_outcome!(self.max_order_in_group(cx, tx, &*record).await);
        // A persisted record that stays put is already counted in its group.
        let last = if entering { count + 1 } else { count.max(1) };

        let requested = self.order_value(&*record);
        let target = requested.map_or(last, |v| v.min(last));
        if requested != Some(target) {
            tracing::debug!(
                table = %table,
                requested = ?requested,
                assigned = target,
                count = count,
                "Order value assigned"
            );
        }
        record.set(&attr, Value::BigInt(target));

        let previous = stored.as_ref().and_then(|row| self.stored_order(row));
        let group = self.group_filter(&*record);

        if entering {
            if let Some(row) = &stored {
                if let Some(old) = previous {
                    let old_group = self.stored_group_filter(row).gt(attr.clone(), old);
                    let shifted = try_outcome!(
                        tx.update_all_counters(cx, &table, &old_group, &attr, -1)
                            .await
                    );
                    tracing::debug!(
                        table = %table,
                        from = old,
                        shifted = shifted,
                        "Closed gap in previous group"
                    );
                }
            }
        } else {
            if previous == Some(target) {
                return Outcome::Ok(());
            }
            if let Some(old) = previous {
                let own_row = record.primary_key_filter();
                try_outcome!(
                    tx.update_all(cx, &table, &own_row, &attr, Value::BigInt(count + 1))
                        .await
                );
                let above_old = group.clone().gt(attr.clone(), old);
                try_outcome!(
                    tx.update_all_counters(cx, &table, &above_old, &attr, -1)
                        .await
                );
            }
        }

        let from_target = group.ge(attr.clone(), target);
        let shifted = try_outcome!(
            tx.update_all_counters(cx, &table, &from_target, &attr, 1)
                .await
        );
        tracing::debug!(
            table = %table,
            previous = ?previous,
            order = target,
            shifted = shifted,
            "Opened slot"
        );

        if let Some(row) = &stored {
            try_outcome!(self.write_position(cx, tx, &*record, row).await);
        }
        Outcome::Ok(())
    }

    /// Read the record's row inside the transaction.
    async fn stored_row<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
    ) -> Outcome<Row, Error> {
        let table = record.table_name();
        let own_row = record.primary_key_filter();
        if own_row.is_empty() {
            return Outcome::Err(Error::Custom(format!(
                "cannot reorder a row of '{table}' without a primary key"
            )));
        }
        let rows = try_outcome!(tx.find(cx, table, &own_row).await);
        match rows.into_iter().next() {
            Some(row) => Outcome::Ok(row),
            None => Outcome::Err(storage_error(
                StorageErrorKind::NotFound,
                format!("row of '{table}' no longer exists"),
            )),
        }
    }

    /// Write the order and reference values that differ from the stored row
    /// but that the row write skips, because they match what the record
    /// last saw.
    async fn write_position<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
        stored: &Row,
    ) -> Outcome<(), Error> {
        let dirty = record.dirty_attributes();
        let values: Vec<(String, Value)> = std::iter::once(self.order_attribute())
            .chain(self.config.reference_attributes.iter().map(String::as_str))
            .filter(|attr| !dirty.iter().any(|(name, _)| name == attr))
            .filter_map(|attr| {
                let current = record.get(attr).unwrap_or(Value::Null);
                (stored.get(attr) != Some(&current)).then(|| (attr.to_string(), current))
            })
            .collect();
        if values.is_empty() {
            return Outcome::Ok(());
        }
        tracing::debug!(
            table = record.table_name(),
            columns = values.len(),
            "Writing position the record already held"
        );
        let filter = record.primary_key_filter();
        try_outcome!(tx.update(cx, record.table_name(), &filter, &values).await);
        Outcome::Ok(())
    }

    /// Close the gap left by a deleted record.
    ///
    /// Runs after the row is deleted, on the delete transaction. `deleted`
    /// is the row as it was stored.
    pub async fn on_after_delete<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
        deleted: &Row,
    ) -> Outcome<(), Error> {
        let attr = self.order_attribute();
        let Some(old) = self.stored_order(deleted) else {
            return Outcome::Ok(());
        };

        let above = self.stored_group_filter(deleted).gt(attr, old);
        let shifted = try_outcome!(
            tx.update_all_counters(cx, record.table_name(), &above, attr, -1)
                .await
        );
        tracing::debug!(
            table = record.table_name(),
            order = old,
            shifted = shifted,
            "Closed gap after delete"
        );
        Outcome::Ok(())
    }
}

#[async_trait]
impl<T: StoreTransaction> Behavior<T> for OrderMaintainer {
    fn name(&self) -> &'static str {
        "order"
    }

    fn error_attribute(&self) -> Option<&str> {
        Some(self.order_attribute())
    }

    fn prepare_save(&self, record: &dyn Record, event: &mut ModelEvent) {
        self.check_initialization(record, event);
    }

    async fn before_insert(
        &self,
        cx: &Cx,
        tx: &T,
        record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        self.on_before_save(cx, tx, record).await
    }

    async fn before_update(
        &self,
        cx: &Cx,
        tx: &T,
        record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        self.on_before_save(cx, tx, record).await
    }

    async fn after_delete(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
        deleted: &Row,
    ) -> Outcome<(), Error> {
        self.on_after_delete(cx, tx, record, deleted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use recordhooks_core::{ActiveRecord, RecordStore, SaveKind};
    use recordhooks_memory::MemoryStore;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn maintainer() -> OrderMaintainer {
        OrderMaintainer::new(OrderConfig::new().reference_attribute("list_id")).unwrap()
    }

    /// Minimal stand-in for the lifecycle: hook, write, commit.
    async fn save(cx: &Cx, store: &MemoryStore, m: &OrderMaintainer, record: &mut ActiveRecord) {
        let tx = unwrap_outcome(store.begin(cx).await);
        unwrap_outcome(m.on_before_save(cx, &tx, record).await);
        if record.is_new_record() {
            let id = unwrap_outcome(tx.insert(cx, "items", &record.attributes()).await);
            if let Some(id) = id {
                record.set("id", Value::BigInt(id));
            }
        } else {
            let filter = record.primary_key_filter();
            unwrap_outcome(
                tx.update(cx, "items", &filter, &record.dirty_attributes())
                    .await,
            );
        }
        unwrap_outcome(tx.commit(cx).await);
        record.mark_persisted();
    }

    /// `name -> order` for one list, sorted by order.
    fn orders(store: &MemoryStore, list: i64) -> Vec<(String, i64)> {
        let mut rows: Vec<(String, i64)> = store
            .rows("items", &Filter::new().eq("list_id", list))
            .into_iter()
            .map(|r| {
                (
                    r.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    r.get("order").and_then(Value::as_i64).unwrap_or_default(),
                )
            })
            .collect();
        rows.sort_by_key(|(_, order)| *order);
        rows
    }

    fn item(list: i64, name: &str) -> ActiveRecord {
        ActiveRecord::new("items", ["id"])
            .with("list_id", list)
            .with("name", name)
    }

    async fn fill(
        cx: &Cx,
        store: &MemoryStore,
        m: &OrderMaintainer,
        list: i64,
        names: &[&str],
    ) -> Vec<ActiveRecord> {
        let mut saved = Vec::new();
        for name in names {
            let mut record = item(list, name);
            save(cx, store, m, &mut record).await;
            saved.push(record);
        }
        saved
    }

    #[test]
    fn test_insert_appends_to_group() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            let saved = fill(&cx, &store, &m, 1, &["a", "b", "c"]).await;

            assert_eq!(saved[2].get_i64("order"), Some(3));
            assert_eq!(
                orders(&store, 1),
                vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
            );
        });
    }

    #[test]
    fn test_insert_at_explicit_position_pushes_others() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            fill(&cx, &store, &m, 1, &["a", "b", "c"]).await;

            let mut first = item(1, "z").with("order", 1_i64);
            save(&cx, &store, &m, &mut first).await;

            assert_eq!(
                orders(&store, 1),
                vec![("z".into(), 1), ("a".into(), 2), ("b".into(), 3), ("c".into(), 4)]
            );
        });
    }

    #[test]
    fn test_insert_past_end_is_clamped() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            fill(&cx, &store, &m, 1, &["a"]).await;

            let mut far = item(1, "b").with("order", 10_i64);
            save(&cx, &store, &m, &mut far).await;

            assert_eq!(far.get_i64("order"), Some(2));
            assert_eq!(orders(&store, 1), vec![("a".into(), 1), ("b".into(), 2)]);
        });
    }

    #[test]
    fn test_move_down_the_list() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            let mut saved = fill(&cx, &store, &m, 1, &["a", "b", "c", "d", "e"]).await;

            let b = &mut saved[1];
            b.set("order", Value::BigInt(4));
            save(&cx, &store, &m, b).await;

            assert_eq!(
                orders(&store, 1),
                vec![
                    ("a".into(), 1),
                    ("c".into(), 2),
                    ("d".into(), 3),
                    ("b".into(), 4),
                    ("e".into(), 5)
                ]
            );
        });
    }

    #[test]
    fn test_unchanged_order_does_not_shift() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            let mut saved = fill(&cx, &store, &m, 1, &["a", "b"]).await;
            let writes_before = store.stats().writes;

            let tx = unwrap_outcome(store.begin(&cx).await);
            saved[0].set("name", Value::from("renamed"));
            unwrap_outcome(m.on_before_save(&cx, &tx, &mut saved[0]).await);
            unwrap_outcome(tx.rollback(&cx).await);

            assert_eq!(store.stats().writes, writes_before);
            assert_eq!(saved[0].get_i64("order"), Some(1));
        });
    }

    #[test]
    fn test_after_delete_closes_gap() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            let saved = fill(&cx, &store, &m, 1, &["a", "b", "c"]).await;

            let tx = unwrap_outcome(store.begin(&cx).await);
            let filter = saved[0].primary_key_filter();
            let deleted = unwrap_outcome(tx.find(&cx, "items", &filter).await).remove(0);
            unwrap_outcome(tx.delete_all(&cx, "items", &filter).await);
            unwrap_outcome(m.on_after_delete(&cx, &tx, &saved[0], &deleted).await);
            unwrap_outcome(tx.commit(&cx).await);

            assert_eq!(orders(&store, 1), vec![("b".into(), 1), ("c".into(), 2)]);
        });
    }

    #[test]
    fn test_move_uses_stored_position() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let m = maintainer();
            let mut saved = fill(&cx, &store, &m, 1, &["a", "b", "c", "d"]).await;

            // Move `d` to the front, leaving the handle for `b` at order 2.
            saved[3].set("order", Value::BigInt(1));
            save(&cx, &store, &m, &mut saved[3]).await;
            assert_eq!(saved[1].get_i64("order"), Some(2));

            saved[1].set("order", Value::BigInt(4));
            save(&cx, &store, &m, &mut saved[1]).await;

            assert_eq!(
                orders(&store, 1),
                vec![("d".into(), 1), ("a".into(), 2), ("c".into(), 3), ("b".into(), 4)]
            );
        });
    }

    #[test]
    fn test_adopt_stored_position() {
        let m = maintainer();
        let loaded = Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("list_id", Value::BigInt(1)),
            ("order", Value::BigInt(3)),
        ]);
        let stored = Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("list_id", Value::BigInt(2)),
            ("order", Value::BigInt(1)),
        ]);

        let mut untouched = ActiveRecord::from_row("items", ["id"], &loaded);
        m.adopt_stored_position(&mut untouched, &stored);
        assert_eq!(untouched.get_i64("order"), Some(1));
        assert_eq!(untouched.get_i64("list_id"), Some(2));

        let mut moved = ActiveRecord::from_row("items", ["id"], &loaded);
        moved.set("order", Value::BigInt(2));
        m.adopt_stored_position(&mut moved, &stored);
        assert_eq!(moved.get_i64("order"), Some(2));
        assert_eq!(moved.get_i64("list_id"), Some(2));
    }

    #[test]
    fn test_check_initialization() {
        let guarded = OrderMaintainer::new(OrderConfig::new().prevent_initialization(true)).unwrap();
        let mut event = ModelEvent::new(SaveKind::Insert);
        guarded.check_initialization(&item(1, "a"), &mut event);
        assert!(!event.is_valid());

        let mut event = ModelEvent::new(SaveKind::Insert);
        guarded.check_initialization(&item(1, "a").with("order", 2_i64), &mut event);
        assert!(event.is_valid());

        let mut event = ModelEvent::new(SaveKind::Insert);
        maintainer().check_initialization(&item(1, "a"), &mut event);
        assert!(event.is_valid());
    }

    #[test]
    fn test_group_changed() {
        let m = maintainer();
        let stored = Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("list_id", Value::BigInt(1)),
            ("order", Value::BigInt(1)),
        ]);

        let mut record = ActiveRecord::from_row("items", ["id"], &stored);
        assert!(!m.group_changed(&record, &stored));

        record.set("list_id", Value::BigInt(2));
        assert!(m.group_changed(&record, &stored));
        assert_eq!(m.stored_order(&stored), Some(1));
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(OrderMaintainer::new(OrderConfig::new().order_attribute("bad-name")).is_err());
    }
}
