//! Lifecycle hooks.
//!
//! A [`Behavior`] is a bundle of hooks attached to a record type. The
//! lifecycle pipeline calls them at fixed points around a store write:
//!
//! 1. `prepare_save` - before any store access; may veto the save.
//! 2. `before_insert` / `before_update` - inside the save transaction,
//!    before the record row itself is written.
//! 3. `after_save` - inside the save transaction, after the record row is
//!    written (generated keys are known).
//! 4. `after_commit` - once the save committed; no store access.
//! 5. `after_delete` - inside the delete transaction, after the row is gone.
//!
//! Every hook has a no-op default so behaviors implement only what they use.

use std::collections::BTreeMap;

use async_trait::async_trait;
use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::record::Record;
use crate::row::Row;
use crate::store::StoreTransaction;

/// Which write a save event precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Insert,
    Update,
}

/// Mutable event passed through the save hooks.
///
/// Any hook may clear `is_valid`; the pipeline then aborts the save without
/// writing anything.
#[derive(Debug)]
pub struct ModelEvent {
    kind: SaveKind,
    is_valid: bool,
    /// Keys generated for related rows, per relation, in attachment order.
    related_keys: BTreeMap<String, Vec<Option<i64>>>,
}

impl ModelEvent {
    pub fn new(kind: SaveKind) -> Self {
        Self {
            kind,
            is_valid: true,
            related_keys: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> SaveKind {
        self.kind
    }

    pub fn is_insert(&self) -> bool {
        self.kind == SaveKind::Insert
    }

    /// Whether the save may proceed.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Veto the save.
    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }

    pub fn set_related_keys(&mut self, relation: impl Into<String>, keys: Vec<Option<i64>>) {
        self.related_keys.insert(relation.into(), keys);
    }

    /// Keys generated while writing `relation`, empty if none were written.
    pub fn related_keys(&self, relation: &str) -> &[Option<i64>] {
        self.related_keys.get(relation).map_or(&[], Vec::as_slice)
    }
}

/// A set of lifecycle hooks, generic over the transaction type it runs in.
#[async_trait]
pub trait Behavior<T: StoreTransaction>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attribute that store failures raised by this behavior are reported on.
    fn error_attribute(&self) -> Option<&str> {
        None
    }

    /// Validation phase. Runs before a transaction is opened.
    fn prepare_save(&self, _record: &dyn Record, _event: &mut ModelEvent) {}

    async fn before_insert(
        &self,
        _cx: &Cx,
        _tx: &T,
        _record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        Outcome::Ok(())
    }

    async fn before_update(
        &self,
        _cx: &Cx,
        _tx: &T,
        _record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        Outcome::Ok(())
    }

    async fn after_save(
        &self,
        _cx: &Cx,
        _tx: &T,
        _record: &dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        Outcome::Ok(())
    }

    /// Runs after the save transaction committed.
    fn after_commit(&self, _record: &mut dyn Record, _event: &ModelEvent) {}

    /// `deleted` is the row as it was stored before the delete.
    async fn after_delete(
        &self,
        _cx: &Cx,
        _tx: &T,
        _record: &dyn Record,
        _deleted: &Row,
    ) -> Outcome<(), Error> {
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_event_veto() {
        let mut event = ModelEvent::new(SaveKind::Insert);
        assert!(event.is_valid());
        assert!(event.is_insert());

        event.invalidate();
        assert!(!event.is_valid());
        assert_eq!(event.kind(), SaveKind::Insert);
    }

    #[test]
    fn test_related_keys() {
        let mut event = ModelEvent::new(SaveKind::Update);
        assert!(event.related_keys("items").is_empty());

        event.set_related_keys("items", vec![Some(4), None]);
        assert_eq!(event.related_keys("items"), &[Some(4), None]);
    }
}
