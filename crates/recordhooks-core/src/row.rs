//! Rows returned by store reads.

use crate::value::Value;

/// A row of `(column, value)` pairs in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pairs: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from column/value pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Value of a column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.pairs
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Set a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if let Some(slot) = self.pairs.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.pairs.push((column, value));
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Borrow all pairs.
    pub fn pairs(&self) -> &[(String, Value)] {
        &self.pairs
    }

    /// Consume the row, yielding its pairs.
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_existing_column() {
        let mut row = Row::from_pairs([("id", Value::BigInt(1)), ("order", Value::BigInt(2))]);
        row.set("order", Value::BigInt(5));
        row.set("name", Value::from("a"));

        assert_eq!(row.len(), 3);
        assert_eq!(row.get("order"), Some(&Value::BigInt(5)));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "order", "name"]);
    }
}
