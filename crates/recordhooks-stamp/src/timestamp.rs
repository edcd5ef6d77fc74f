//! Creation and modification timestamps.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use asupersync::{Cx, Outcome};
use chrono::{DateTime, Utc};
use recordhooks_core::{
    Behavior, Error, ModelEvent, Record, Result, StoreTransaction, Value, config_error,
    validate_identifier,
};
use serde::{Deserialize, Serialize};

/// Source of the current time, in microseconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_micros(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        Utc::now().timestamp_micros()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    micros: AtomicI64,
}

impl FixedClock {
    pub fn new(micros: i64) -> Self {
        Self {
            micros: AtomicI64::new(micros),
        }
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::new(instant.timestamp_micros())
    }

    pub fn set(&self, micros: i64) {
        self.micros.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_micros(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}

/// Attribute names a [`TimestampBehavior`] writes. `None` disables a stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampConfig {
    pub created_at_attribute: Option<String>,
    pub updated_at_attribute: Option<String>,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            created_at_attribute: Some("created_at".to_string()),
            updated_at_attribute: Some("updated_at".to_string()),
        }
    }
}

impl TimestampConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_at_attribute(mut self, name: Option<&str>) -> Self {
        self.created_at_attribute = name.map(str::to_string);
        self
    }

    pub fn updated_at_attribute(mut self, name: Option<&str>) -> Self {
        self.updated_at_attribute = name.map(str::to_string);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.created_at_attribute {
            validate_identifier("created_at_attribute", name)?;
        }
        if let Some(name) = &self.updated_at_attribute {
            validate_identifier("updated_at_attribute", name)?;
        }
        if self.created_at_attribute.is_some()
            && self.created_at_attribute == self.updated_at_attribute
        {
            return Err(config_error(
                "updated_at_attribute",
                "must differ from created_at_attribute",
            ));
        }
        Ok(())
    }
}

/// Stamps `created_at` and `updated_at` on insert, and `updated_at` on
/// update. Values are `Value::Timestamp` microseconds.
#[derive(Debug, Clone)]
pub struct TimestampBehavior {
    config: TimestampConfig,
    clock: Arc<dyn Clock>,
}

impl TimestampBehavior {
    pub fn new(config: TimestampConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TimestampConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, clock })
    }

    pub fn config(&self) -> &TimestampConfig {
        &self.config
    }

    pub fn stamp_insert(&self, record: &mut dyn Record) {
        let now = Value::Timestamp(self.clock.now_micros());
        if let Some(attr) = &self.config.created_at_attribute {
            record.set(attr, now.clone());
        }
        if let Some(attr) = &self.config.updated_at_attribute {
            record.set(attr, now);
        }
    }

    pub fn stamp_update(&self, record: &mut dyn Record) {
        if let Some(attr) = &self.config.updated_at_attribute {
            record.set(attr, Value::Timestamp(self.clock.now_micros()));
        }
    }
}

#[async_trait]
impl<T: StoreTransaction> Behavior<T> for TimestampBehavior {
    fn name(&self) -> &'static str {
        "timestamp"
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
