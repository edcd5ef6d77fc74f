//! Saving attached records along with their owner.
//!
//! Records attached to an owner under a relation name (see
//! [`ActiveRecord::with_related`](recordhooks_core::ActiveRecord::with_related))
//! are written in the owner's save transaction, after the owner row, with
//! the owner's key stamped into their foreign-key attribute. The attached
//! records themselves are only updated once the transaction commits.

use async_trait::async_trait;
use asupersync::{Cx, Outcome};
use recordhooks_core::{
    ActiveRecord, Behavior, Error, ModelEvent, Record, Result, StorageErrorKind,
    StoreTransaction, Value, config_error, storage_error, try_outcome, validate_identifier,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelatedConfig {
    /// Name the records are attached under.
    pub relation: String,
    /// Attribute on each related record that holds the owner's key.
    pub foreign_key: String,
    /// Attribute on the owner that is copied into `foreign_key`.
    pub owner_key: String,
}

impl Default for RelatedConfig {
    fn default() -> Self {
        Self {
            relation: String::new(),
            foreign_key: String::new(),
            owner_key: "id".to_string(),
        }
    }
}

impl RelatedConfig {
    pub fn new(relation: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            foreign_key: foreign_key.into(),
            ..Self::default()
        }
    }

    pub fn owner_key(mut self, name: impl Into<String>) -> Self {
        self.owner_key = name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.relation.is_empty() {
            return Err(config_error("relation", "must not be empty"));
        }
        validate_identifier("foreign_key", &self.foreign_key)?;
        validate_identifier("owner_key", &self.owner_key)?;
        Ok(())
    }
}

/// Writes the records attached under one relation when their owner saves.
///
/// Hooks of the attached records' own behaviors do not run.
#[derive(Debug, Clone)]
pub struct RelatedBehavior {
    config: RelatedConfig,
}

impl RelatedBehavior {
    pub fn new(config: RelatedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RelatedConfig {
        &self.config
    }

    fn owner_key(&self, owner: &dyn Record) -> Outcome<Value, Error> {
        match owner.get(&self.config.owner_key) {
            Some(key) if !key.is_null() => Outcome::Ok(key),
            _ => Outcome::Err(Error::Custom(format!(
                "cannot save '{}' of '{}' without '{}'",
                self.config.relation,
                owner.table_name(),
                self.config.owner_key
            ))),
        }
    }

    /// Write every attached record. Returns the key generated for each one,
    /// `None` for records that were already persisted.
    pub async fn save_related<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        owner: &dyn Record,
    ) -> Outcome<Vec<Option<i64>>, Error> {
        let Some(children) = owner.related(&self.config.relation) else {
            return Outcome::Ok(Vec::new());
        };
        if children.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let key = try_outcome!(self.owner_key(owner));

        let mut keys = Vec::with_capacity(children.len());
        for child in children {
            let generated = try_outcome!(self.save_child(cx, tx, child, &key).await);
            keys.push(generated);
        }
        tracing::debug!(
            relation = %self.config.relation,
            count = keys.len(),
            "Saved related records"
        );
        Outcome::Ok(keys)
    }

    async fn save_child<T: StoreTransaction>(
        &self,
        cx: &Cx,
        tx: &T,
        child: &ActiveRecord,
        key: &Value,
    ) -> Outcome<Option<i64>, Error> {
        let fk = self.config.foreign_key.as_str();
        if child.is_new_record() {
            let mut values: Vec<(String, Value)> = child
                .attributes()
                .into_iter()
                .filter(|(name, _)| name != fk)
                .collect();
            values.push((fk.to_string(), key.clone()));
            return tx.insert(cx, child.table_name(), &values).await;
        }

        let mut values: Vec<(String, Value)> = child
            .dirty_attributes()
            .into_iter()
            .filter(|(name, _)| name != fk)
            .collect();
        if child.old_value(fk).as_ref() != Some(key) {
            values.push((fk.to_string(), key.clone()));
        }
        if values.is_empty() {
            return Outcome::Ok(None);
        }
        let filter = child.primary_key_filter();
        match try_outcome!(tx.update(cx, child.table_name(), &filter, &values).await) {
            0 => Outcome::Err(storage_error(
                StorageErrorKind::NotFound,
                format!("row of '{}' no longer exists", child.table_name()),
            )),
            _ => Outcome::Ok(None),
        }
    }

    /// Bring the attached records in line with what was committed.
    pub fn mark_saved(&self, owner: &mut dyn Record, keys: &[Option<i64>]) {
        let Some(key) = owner.get(&self.config.owner_key) else {
            return;
        };
        let Some(children) = owner.related_mut(&self.config.relation) else {
            return;
        };
        for (child, generated) in children.iter_mut().zip(keys) {
            child.set(&self.config.foreign_key, key.clone());
            if let (Some(id), [column]) = (generated, child.primary_key_columns()) {
                let column = column.clone();
                if child.get(&column).is_none_or(|v| v.is_null()) {
                    child.set(&column, Value::BigInt(*id));
                }
            }
            child.mark_persisted();
        }
    }
}

#[async_trait]
impl<T: StoreTransaction> Behavior<T> for RelatedBehavior {
    fn name(&self) -> &'static str {
        "related"
    }

    async fn after_save(
        &self,
        cx: &Cx,
        tx: &T,
        record: &dyn Record,
        event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        let keys = try_outcome!(self.save_related(cx, tx, record).await);
        event.set_related_keys(self.config.relation.clone(), keys);
        Outcome::Ok(())
    }

    fn after_commit(&self, record: &mut dyn Record, event: &ModelEvent) {
        let keys = event.related_keys(&self.config.relation);
        if !keys.is_empty() {
            self.mark_saved(record, keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use recordhooks_core::{Filter, RecordStore, Row};
    use recordhooks_memory::MemoryStore;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn behavior() -> RelatedBehavior {
        RelatedBehavior::new(RelatedConfig::new("items", "list_id")).unwrap()
    }

    fn list(id: i64, items: &[&str]) -> ActiveRecord {
        let row = Row::from_pairs([("id", Value::BigInt(id))]);
        ActiveRecord::from_row("lists", ["id"], &row).with_related(
            "items",
            items
                .iter()
                .map(|name| ActiveRecord::new("items", ["id"]).with("name", *name)),
        )
    }

    #[test]
    fn test_new_children_get_owner_key() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let store = MemoryStore::new();
            let related = behavior();
            let mut owner = list(9, &["a", "b"]);

            let tx = unwrap_outcome(store.begin(&cx).await);
            let keys = unwrap_outcome(related.save_related(&cx, &tx, &owner).await);
            unwrap_outcome(tx.commit(&cx).await);
            assert_eq!(keys, vec![Some(1), Some(2)]);

            let rows = store.rows("items", &Filter::new().eq("list_id", 9_i64));
            assert_eq!(rows.len(), 2);

            related.mark_saved(&mut owner, &keys);
            let children = owner.related("items").unwrap();
            assert_eq!(children[1].get_i64("id"), Some(2));
            assert_eq!(children[1].get_i64("list_id"), Some(9));
            assert!(!children[1].is_new_record());
            assert!(children[1].dirty_attributes().is_empty());
        });
    }

    #[test]
    fn test_persisted_child_writes_only_changes() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let store = MemoryStore::new();
            let related = behavior();
            let mut owner = list(9, &["a"]);
            let tx = unwrap_outcome(store.begin(&cx).await);
            let keys = unwrap_outcome(related.save_related(&cx, &tx, &owner).await);
            unwrap_outcome(tx.commit(&cx).await);
            related.mark_saved(&mut owner, &keys);

            let writes = store.stats().writes;
            let tx = unwrap_outcome(store.begin(&cx).await);
            let keys = unwrap_outcome(related.save_related(&cx, &tx, &owner).await);
            assert_eq!(keys, vec![None]);
            unwrap_outcome(tx.commit(&cx).await);
            assert_eq!(store.stats().writes, writes);

            owner.related_mut("items").unwrap()[0].set("name", Value::from("renamed"));
            let tx = unwrap_outcome(store.begin(&cx).await);
            unwrap_outcome(related.save_related(&cx, &tx, &owner).await);
            unwrap_outcome(tx.commit(&cx).await);

            let rows = store.rows("items", &Filter::new().eq("list_id", 9_i64));
            assert_eq!(rows[0].get("name"), Some(&Value::from("renamed")));
        });
    }

    #[test]
    fn test_owner_without_key_is_an_error() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let store = MemoryStore::new();
            let owner = ActiveRecord::new("lists", ["id"])
                .with_related("items", [ActiveRecord::new("items", ["id"])]);

            let tx = unwrap_outcome(store.begin(&cx).await);
            match behavior().save_related(&cx, &tx, &owner).await {
                Outcome::Err(e) => assert!(e.to_string().contains("without 'id'")),
                _ => panic!("expected an error"),
            }
        });
    }

    #[test]
    fn test_config() {
        let config: RelatedConfig =
            serde_json::from_str(r#"{ "relation": "items", "foreign_key": "list_id" }"#).unwrap();
        assert_eq!(config.owner_key, "id");
        assert!(RelatedBehavior::new(config).is_ok());

        assert!(RelatedConfig::default().validate().is_err());
        assert!(
            RelatedConfig::new("items", "list id")
                .validate()
                .is_err()
        );
    }
}
