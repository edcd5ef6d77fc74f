//! The capability interface behaviors use to read and write a record.
//!
//! Behaviors never reflect over a concrete type. They are configured with
//! attribute names once and then go through `Record` for every access.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::active::ActiveRecord;
use crate::filter::Filter;
use crate::value::Value;

/// Validation-style errors attached to a record, keyed by attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordErrors {
    by_attribute: BTreeMap<String, Vec<String>>,
}

impl RecordErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a message to `attribute`.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.by_attribute
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Messages for one attribute.
    pub fn get(&self, attribute: &str) -> &[String] {
        self.by_attribute.get(attribute).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_attribute.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_attribute.clear();
    }

    /// Every message, prefixed with its attribute.
    pub fn full_messages(&self) -> Vec<String> {
        self.by_attribute
            .iter()
            .flat_map(|(attr, msgs)| msgs.iter().map(move |m| format!("{attr}: {m}")))
            .collect()
    }
}

/// A persistable record as seen by behaviors and stores.
pub trait Record: Send + Sync {
    /// Table the record is stored in.
    fn table_name(&self) -> &str;

    /// Primary-key column names, in key order.
    fn primary_key_columns(&self) -> &[String];

    /// Current value of an attribute, `None` if it was never set.
    fn get(&self, attribute: &str) -> Option<Value>;

    /// Set an attribute.
    fn set(&mut self, attribute: &str, value: Value);

    /// Value of an attribute as last loaded from or written to storage.
    ///
    /// Always `None` for records that were never persisted.
    fn old_value(&self, attribute: &str) -> Option<Value>;

    /// True until the record has been inserted (or loaded).
    fn is_new_record(&self) -> bool;

    /// Every attribute with its current value.
    fn attributes(&self) -> Vec<(String, Value)>;

    /// Attributes whose current value differs from the persisted one.
    fn dirty_attributes(&self) -> Vec<(String, Value)>;

    /// Replace all current attribute values.
    ///
    /// Used to undo in-memory changes made during a save that was rolled back.
    fn restore(&mut self, attributes: Vec<(String, Value)>);

    /// Record the current values as persisted.
    fn mark_persisted(&mut self);

    fn errors(&self) -> &RecordErrors;

    fn errors_mut(&mut self) -> &mut RecordErrors;

    /// Filter selecting exactly this row, using persisted key values where
    /// available.
    fn primary_key_filter(&self) -> Filter {
        self.primary_key_columns()
            .iter()
            .fold(Filter::new(), |filter, column| {
                let value = self
                    .old_value(column)
                    .or_else(|| self.get(column))
                    .unwrap_or(Value::Null);
                filter.eq(column.clone(), value)
            })
    }

    /// Attach an error message to `attribute`.
    fn add_error(&mut self, attribute: &str, message: &str) {
        self.errors_mut().add(attribute, message);
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Records attached under `relation`, to be saved along with this one.
    fn related(&self, _relation: &str) -> Option<&[ActiveRecord]> {
        None
    }

    fn related_mut(&mut self, _relation: &str) -> Option<&mut Vec<ActiveRecord>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_errors() {
        let mut errors = RecordErrors::new();
        assert!(errors.is_empty());

        errors.add("order", "database is locked");
        errors.add("order", "second");
        errors.add("name", "required");

        assert_eq!(errors.get("order").len(), 2);
        assert!(errors.get("missing").is_empty());
        assert_eq!(
            errors.full_messages(),
            vec![
                "name: required".to_string(),
                "order: database is locked".to_string(),
                "order: second".to_string(),
            ]
        );

        errors.clear();
        assert!(errors.is_empty());
    }
}
