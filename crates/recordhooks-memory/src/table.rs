//! Table storage and the row-level operations shared by committed state and
//! transaction working copies.

use recordhooks_core::{Error, Filter, Row, StorageErrorKind, Value, storage_error};

/// One in-memory table.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) rows: Vec<Row>,
    /// Column filled from `next_id` when an insert leaves it unset.
    pub(crate) auto_increment: Option<String>,
    pub(crate) next_id: i64,
}

impl Table {
    pub(crate) fn new(auto_increment: Option<String>) -> Self {
        Self {
            rows: Vec::new(),
            auto_increment,
            next_id: 1,
        }
    }

    pub(crate) fn count(&self, filter: &Filter) -> u64 {
        self.rows.iter().filter(|r| filter.matches(r)).count() as u64
    }

    pub(crate) fn find(&self, filter: &Filter) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub(crate) fn insert(
        &mut self,
        table: &str,
        values: &[(String, Value)],
    ) -> Result<Option<i64>, Error> {
        let mut row = Row::from_pairs(values.iter().cloned());
        let mut generated = None;

        if let Some(column) = &self.auto_increment {
            let current = row.get(column).cloned().unwrap_or(Value::Null);
            if current.is_null() {
                let id = self.next_id;
                row.set(column.clone(), Value::BigInt(id));
                generated = Some(id);
            } else {
                let Some(explicit) = current.as_i64() else {
                    return Err(storage_error(
                        StorageErrorKind::Constraint,
                        format!("column '{column}' of table '{table}' must be an integer"),
                    ));
                };
                let taken = self
                    .rows
                    .iter()
                    .any(|r| r.get(column).is_some_and(|v| v.matches(&current)));
                if taken {
                    return Err(storage_error(
                        StorageErrorKind::Constraint,
                        format!("duplicate key {column}={explicit} in table '{table}'"),
                    ));
                }
            }
            if let Some(id) = row.get(column).and_then(Value::as_i64) {
                self.next_id = self.next_id.max(id + 1);
            }
        }

        self.rows.push(row);
        Ok(generated)
    }

    pub(crate) fn update(&mut self, filter: &Filter, values: &[(String, Value)]) -> u64 {
        let mut affected = 0;
        for row in self.rows.iter_mut().filter(|r| filter.matches(r)) {
            for (column, value) in values {
                row.set(column.clone(), value.clone());
            }
            affected += 1;
        }
        affected
    }

    /// `column = column + delta`. `NULL` stays `NULL`, as in SQL.
    pub(crate) fn add_to_column(
        &mut self,
        table: &str,
        filter: &Filter,
        column: &str,
        delta: i64,
    ) -> Result<u64, Error> {
        let mut updates = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            if !filter.matches(row) {
                continue;
            }
            let next = match row.get(column) {
                None | Some(Value::Null) => Value::Null,
                Some(v) => match v.as_i64() {
                    Some(current) => Value::BigInt(current + delta),
                    None => {
                        return Err(storage_error(
                            StorageErrorKind::Constraint,
                            format!(
                                "cannot add to non-integer column '{column}' ({}) in table '{table}'",
                                v.type_name()
                            ),
                        ));
                    }
                },
            };
            updates.push((idx, next));
        }

        let affected = updates.len() as u64;
        for (idx, value) in updates {
            self.rows[idx].set(column, value);
        }
        Ok(affected)
    }

    pub(crate) fn delete(&mut self, filter: &Filter) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|r| !filter.matches(r));
        (before - self.rows.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: i64, order: i64) -> Vec<(String, Value)> {
        vec![
            ("list_id".to_string(), Value::BigInt(list)),
            ("order".to_string(), Value::BigInt(order)),
        ]
    }

    #[test]
    fn test_insert_generates_ids() {
        let mut t = Table::new(Some("id".to_string()));
        assert_eq!(t.insert("items", &pairs(1, 1)).unwrap(), Some(1));
        assert_eq!(t.insert("items", &pairs(1, 2)).unwrap(), Some(2));
        assert_eq!(t.rows[1].get("id"), Some(&Value::BigInt(2)));
    }

    #[test]
    fn test_explicit_id_advances_sequence_and_rejects_duplicates() {
        let mut t = Table::new(Some("id".to_string()));
        let mut values = pairs(1, 1);
        values.push(("id".to_string(), Value::BigInt(10)));
        assert_eq!(t.insert("items", &values).unwrap(), None);
        assert_eq!(t.insert("items", &pairs(1, 2)).unwrap(), Some(11));

        let err = t.insert("items", &values).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_counters_leave_null_alone() {
        let mut t = Table::new(None);
        t.insert("items", &pairs(1, 1)).unwrap();
        t.insert("items", &[("order".to_string(), Value::Null)]).unwrap();

        let affected = t.add_to_column("items", &Filter::new(), "order", 5).unwrap();
        assert_eq!(affected, 2);
        assert_eq!(t.rows[0].get("order"), Some(&Value::BigInt(6)));
        assert_eq!(t.rows[1].get("order"), Some(&Value::Null));
    }

    #[test]
    fn test_counters_reject_text_without_partial_update() {
        let mut t = Table::new(None);
        t.insert("items", &pairs(1, 1)).unwrap();
        t.insert("items", &[("order".to_string(), Value::from("x"))]).unwrap();

        assert!(t.add_to_column("items", &Filter::new(), "order", 1).is_err());
        assert_eq!(t.rows[0].get("order"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn test_update_and_delete() {
        let mut t = Table::new(None);
        for order in 1..=3 {
            t.insert("items", &pairs(1, order)).unwrap();
        }
        let filter = Filter::new().ge("order", 2_i64);
        assert_eq!(t.update(&filter, &[("list_id".to_string(), Value::BigInt(2))]), 2);
        assert_eq!(t.count(&Filter::new().eq("list_id", 2_i64)), 2);
        assert_eq!(t.delete(&filter), 2);
        assert_eq!(t.rows.len(), 1);
    }
}
