//! A dynamic record for tables whose shape is only known at runtime.
//!
//! `ActiveRecord` keeps current values and the last persisted snapshot side
//! by side, which is what lifecycle behaviors need: "what is the order
//! now" versus "what was it in storage".

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::record::{Record, RecordErrors};
use crate::row::Row;
use crate::value::Value;

/// A record backed by attribute maps.
///
/// # Example
///
/// ```
/// use recordhooks_core::{ActiveRecord, Record, Value};
///
/// let mut item = ActiveRecord::new("items", ["id"]);
/// item.set("list_id", Value::BigInt(1));
/// assert!(item.is_new_record());
/// assert_eq!(item.get("list_id"), Some(Value::BigInt(1)));
/// ```
#[derive(Debug, Clone)]
pub struct ActiveRecord {
    table_name: String,
    primary_key: Vec<String>,
    values: BTreeMap<String, Value>,
    /// `None` until persisted.
    persisted: Option<BTreeMap<String, Value>>,
    errors: RecordErrors,
    related: BTreeMap<String, Vec<ActiveRecord>>,
}

impl ActiveRecord {
    /// Create a new, unsaved record.
    pub fn new<I, S>(table_name: impl Into<String>, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            values: BTreeMap::new(),
            persisted: None,
            errors: RecordErrors::new(),
            related: BTreeMap::new(),
        }
    }

    /// Attach records under `relation`; they are saved with this one by a
    /// related-records behavior.
    pub fn with_related(
        mut self,
        relation: impl Into<String>,
        records: impl IntoIterator<Item = ActiveRecord>,
    ) -> Self {
        self.related
            .entry(relation.into())
            .or_default()
            .extend(records);
        self
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    /// Hydrate a persisted record from a store row.
    pub fn from_row<I, S>(table_name: impl Into<String>, primary_key: I, row: &Row) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeMap<String, Value> = row
            .pairs()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            persisted: Some(values.clone()),
            values,
            errors: RecordErrors::new(),
            related: BTreeMap::new(),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.values.remove(attribute)
    }

    /// Whether an attribute has been set (even to `Null`).
    pub fn has(&self, attribute: &str) -> bool {
        self.values.contains_key(attribute)
    }

    /// Current value as an integer, for convenience in tests and callers.
    pub fn get_i64(&self, attribute: &str) -> Option<i64> {
        self.values.get(attribute).and_then(Value::as_i64)
    }

    /// Dump the current attributes as a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let map: JsonMap<String, JsonValue> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect();
        JsonValue::Object(map)
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::BigInt(i) | Value::Timestamp(i) => JsonValue::from(*i),
        Value::Double(d) => JsonValue::from(*d),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => JsonValue::from(b.clone()),
        Value::Uuid(_) => JsonValue::String(value.to_string()),
    }
}

impl Record for ActiveRecord {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        self.values.get(attribute).cloned()
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.values.insert(attribute.to_string(), value);
    }

    fn old_value(&self, attribute: &str) -> Option<Value> {
        self.persisted
            .as_ref()
            .and_then(|snapshot| snapshot.get(attribute).cloned())
    }

    fn is_new_record(&self) -> bool {
        self.persisted.is_none()
    }

    fn attributes(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn dirty_attributes(&self) -> Vec<(String, Value)> {
        match &self.persisted {
            None => self.attributes(),
            Some(snapshot) => self
                .values
                .iter()
                .filter(|(k, v)| snapshot.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn restore(&mut self, attributes: Vec<(String, Value)>) {
        self.values = attributes.into_iter().collect();
    }

    fn mark_persisted(&mut self) {
        self.persisted = Some(self.values.clone());
    }

    fn errors(&self) -> &RecordErrors {
        &self.errors
    }

    fn errors_mut(&mut self) -> &mut RecordErrors {
        &mut self.errors
    }

    fn related(&self, relation: &str) -> Option<&[ActiveRecord]> {
        self.related.get(relation).map(Vec::as_slice)
    }

    fn related_mut(&mut self, relation: &str) -> Option<&mut Vec<ActiveRecord>> {
        self.related.get_mut(relation)
    }
}
