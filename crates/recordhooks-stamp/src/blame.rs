//! Author stamps (`created_by` / `updated_by`).

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use asupersync::{Cx, Outcome};
use recordhooks_core::{
    Behavior, Error, ModelEvent, Record, Result, StoreTransaction, Value, config_error,
    validate_identifier,
};
use serde::{Deserialize, Serialize};

/// Who is performing the current write.
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// `None` when acting anonymously; nothing is stamped then.
    fn current_identity(&self) -> Option<Value>;
}

/// Identity held in memory and swapped by the application, e.g. per
/// request in a single-user worker.
#[derive(Debug, Default)]
pub struct SharedIdentity {
    current: RwLock<Option<Value>>,
}

impl SharedIdentity {
    pub fn new(identity: Option<Value>) -> Self {
        Self {
            current: RwLock::new(identity),
        }
    }

    pub fn set(&self, identity: impl Into<Value>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.into());
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for SharedIdentity {
    fn current_identity(&self) -> Option<Value> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlameConfig {
    pub created_by_attribute: Option<String>,
    pub updated_by_attribute: Option<String>,
}

impl Default for BlameConfig {
    fn default() -> Self {
        Self {
            created_by_attribute: Some("created_by".to_string()),
            updated_by_attribute: Some("updated_by".to_string()),
        }
    }
}

impl BlameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_by_attribute(mut self, name: Option<&str>) -> Self {
        self.created_by_attribute = name.map(str::to_string);
        self
    }

    pub fn updated_by_attribute(mut self, name: Option<&str>) -> Self {
        self.updated_by_attribute = name.map(str::to_string);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.created_by_attribute {
            validate_identifier("created_by_attribute", name)?;
        }
        if let Some(name) = &self.updated_by_attribute {
            validate_identifier("updated_by_attribute", name)?;
        }
        if self.created_by_attribute.is_some()
            && self.created_by_attribute == self.updated_by_attribute
        {
            return Err(config_error(
                "updated_by_attribute",
                "must differ from created_by_attribute",
            ));
        }
        Ok(())
    }
}

/// Records which identity created and last updated a record.
#[derive(Debug, Clone)]
pub struct BlameBehavior {
    config: BlameConfig,
    identity: Arc<dyn IdentityProvider>,
}

impl BlameBehavior {
    pub fn new(config: BlameConfig, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, identity })
    }

    pub fn stamp_insert(&self, record: &mut dyn Record) {
        let Some(who) = self.identity.current_identity() else {
            tracing::trace!(table = record.table_name(), "No identity; skipping blame stamp");
            return;
        };
        if let Some(attr) = &self.config.created_by_attribute {
            record.set(attr, who.clone());
        }
        if let Some(attr) = &self.config.updated_by_attribute {
            record.set(attr, who);
        }
    }

    pub fn stamp_update(&self, record: &mut dyn Record) {
        let (Some(attr), Some(who)) = (
            &self.config.updated_by_attribute,
            self.identity.current_identity(),
        ) else {
            return;
        };
        record.set(attr, who);
    }
}

#[async_trait]
impl<T: StoreTransaction> Behavior<T> for BlameBehavior {
    fn name(&self) -> &'static str {
        "blame"
    }

    async fn before_insert(
        &self,
        _cx: &Cx,
        _tx: &T,
        record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        self.stamp_insert(record);
        Outcome::Ok(())
    }

    async fn before_update(
        &self,
        _cx: &Cx,
        _tx: &T,
        record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        self.stamp_update(record);
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordhooks_core::ActiveRecord;

    #[test]
    fn test_stamps_current_identity() {
        let identity = Arc::new(SharedIdentity::new(Some(Value::BigInt(42))));
        let behavior = BlameBehavior::new(BlameConfig::default(), identity.clone()).unwrap();
        let mut record = ActiveRecord::new("items", ["id"]);

        behavior.stamp_insert(&mut record);
        assert_eq!(record.get("created_by"), Some(Value::BigInt(42)));
        assert_eq!(record.get("updated_by"), Some(Value::BigInt(42)));

        identity.set(7_i64);
        behavior.stamp_update(&mut record);
        assert_eq!(record.get("created_by"), Some(Value::BigInt(42)));
        assert_eq!(record.get("updated_by"), Some(Value::BigInt(7)));
    }

    #[test]
    fn test_anonymous_writes_are_not_stamped() {
        let identity = Arc::new(SharedIdentity::default());
        let behavior = BlameBehavior::new(BlameConfig::default(), identity.clone()).unwrap();
        let mut record = ActiveRecord::new("items", ["id"]);

        behavior.stamp_insert(&mut record);
        assert!(record.get("created_by").is_none());

        identity.set("alice");
        behavior.stamp_insert(&mut record);
        identity.clear();
        behavior.stamp_update(&mut record);
        assert_eq!(record.get("updated_by"), Some(Value::from("alice")));
    }

    #[test]
    fn test_config() {
        let config: BlameConfig =
            serde_json::from_str(r#"{ "created_by_attribute": null }"#).unwrap();
        assert!(config.created_by_attribute.is_none());
        assert!(config.validate().is_ok());

        let clash = BlameConfig::new()
            .created_by_attribute(Some("author"))
            .updated_by_attribute(Some("author"));
        assert!(clash.validate().is_err());
    }
}
