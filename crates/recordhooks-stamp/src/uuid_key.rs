//! Random UUID assignment on insert.

use async_trait::async_trait;
use asupersync::{Cx, Outcome};
use recordhooks_core::{
    Behavior, Error, ModelEvent, Record, Result, StoreTransaction, Value, validate_identifier,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the generated UUID is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidFormat {
    /// `Value::Uuid` (16 raw bytes).
    #[default]
    Binary,
    /// Lowercase hyphenated text, for columns declared as strings.
    Text,
}

/// Options of a [`UuidBehavior`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UuidConfig {
    pub attribute: String,
    pub format: UuidFormat,
}

impl Default for UuidConfig {
    fn default() -> Self {
        Self {
            attribute: "uuid".to_string(),
            format: UuidFormat::Binary,
        }
    }
}

impl UuidConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = name.into();
        self
    }

    pub fn format(mut self, format: UuidFormat) -> Self {
        self.format = format;
        self
    }
}

/// Fills a UUID attribute with a fresh v4 value when a record is inserted
/// without one.
#[derive(Debug, Clone)]
pub struct UuidBehavior {
    config: UuidConfig,
}

impl UuidBehavior {
    pub fn new(config: UuidConfig) -> Result<Self> {
        validate_identifier("attribute", &config.attribute)?;
        Ok(Self { config })
    }

    /// Assign a UUID unless one is already present. Returns whether a value
    /// was assigned.
    pub fn assign(&self, record: &mut dyn Record) -> bool {
        let attr = self.config.attribute.as_str();
        if record.get(attr).is_some_and(|v| !v.is_null()) {
            return false;
        }
        let id = Uuid::new_v4();
        let value = match self.config.format {
            UuidFormat::Binary => Value::Uuid(id.into_bytes()),
            UuidFormat::Text => Value::Text(id.hyphenated().to_string()),
        };
        record.set(attr, value);
        tracing::trace!(table = record.table_name(), attribute = attr, uuid = %id, "Assigned UUID");
        true
    }
}

#[async_trait]
impl<T: StoreTransaction> Behavior<T> for UuidBehavior {
    fn name(&self) -> &'static str {
        "uuid"
    }

    async fn before_insert(
        &self,
        _cx: &Cx,
        _tx: &T,
        record: &mut dyn Record,
        _event: &mut ModelEvent,
    ) -> Outcome<(), Error> {
        self.assign(record);
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use recordhooks_core::{ActiveRecord, RecordStore, SaveKind};
    use recordhooks_memory::MemoryStore;

    #[test]
    fn test_assigns_binary_uuid() {
        let behavior = UuidBehavior::new(UuidConfig::default()).unwrap();
        let mut record = ActiveRecord::new("items", ["id"]);

        assert!(behavior.assign(&mut record));
        let Some(Value::Uuid(bytes)) = record.get("uuid") else {
            panic!("expected a binary uuid");
        };
        assert_eq!(Uuid::from_bytes(bytes).get_version_num(), 4);
    }

    #[test]
    fn test_text_format_and_custom_attribute() {
        let behavior =
            UuidBehavior::new(UuidConfig::new().attribute("guid").format(UuidFormat::Text)).unwrap();
        let mut record = ActiveRecord::new("items", ["id"]);
        behavior.assign(&mut record);

        let text = record.get("guid").and_then(|v| v.as_str().map(str::to_string));
        let text = text.expect("text uuid");
        assert_eq!(text.len(), 36);
        assert!(Uuid::parse_str(&text).is_ok());
    }

    #[test]
    fn test_keeps_existing_value() {
        let behavior = UuidBehavior::new(UuidConfig::default()).unwrap();
        let mut record = ActiveRecord::new("items", ["id"]).with("uuid", Value::Uuid([7; 16]));

        assert!(!behavior.assign(&mut record));
        assert_eq!(record.get("uuid"), Some(Value::Uuid([7; 16])));

        let mut nulled = ActiveRecord::new("items", ["id"]).with("uuid", Value::Null);
        assert!(behavior.assign(&mut nulled));
    }

    #[test]
    fn test_config_from_json() {
        let config: UuidConfig = serde_json::from_str(r#"{ "format": "text" }"#).unwrap();
        assert_eq!(config.attribute, "uuid");
        assert_eq!(config.format, UuidFormat::Text);
        assert!(UuidBehavior::new(config.attribute("")).is_err());
    }

    #[test]
    fn test_runs_only_before_insert() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let store = MemoryStore::new();
            let tx = match store.begin(&cx).await {
                Outcome::Ok(tx) => tx,
                _ => panic!("begin failed"),
            };
            let behavior = UuidBehavior::new(UuidConfig::default()).unwrap();

            let mut record = ActiveRecord::new("items", ["id"]);
            let mut event = ModelEvent::new(SaveKind::Update);
            let hook = Behavior::before_update(&behavior, &cx, &tx, &mut record, &mut event).await;
            assert!(matches!(hook, Outcome::Ok(())));
            assert!(record.get("uuid").is_none());

            let mut event = ModelEvent::new(SaveKind::Insert);
            let hook = Behavior::before_insert(&behavior, &cx, &tx, &mut record, &mut event).await;
            assert!(matches!(hook, Outcome::Ok(())));
            assert!(record.get("uuid").is_some());
        });
    }
}
