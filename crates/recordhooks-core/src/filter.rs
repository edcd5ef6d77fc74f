//! Row filters.
//!
//! Behaviors only ever need conjunctions of simple comparisons: "rows in
//! this group", "rows in this group above position N", "this exact row".
//! `Filter` models exactly that and nothing more. Stores either evaluate it
//! directly (`Filter::matches`) or render it to SQL.

use std::cmp::Ordering;

use crate::row::Row;
use crate::value::Value;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// `column <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Condition {
    /// Evaluate against a row. Missing columns read as `Null`.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            CompareOp::Eq => actual.matches(&self.value),
            op => actual
                .compare(&self.value)
                .is_some_and(|ordering| op.accepts(ordering)),
        }
    }
}

/// A conjunction of conditions. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// `column = value` (`IS NULL` when `value` is `Null`).
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, CompareOp::Eq, value)
    }

    /// `column > value`.
    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, CompareOp::Gt, value)
    }

    /// `column >= value`.
    pub fn ge(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, CompareOp::Ge, value)
    }

    /// `column < value`.
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, CompareOp::Lt, value)
    }

    /// `column <= value`.
    pub fn le(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, CompareOp::Le, value)
    }

    /// Append every condition of `other`.
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Borrow the conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True if this filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a row.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}
