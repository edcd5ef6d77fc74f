//! Record lifecycle behaviors.
//!
//! `recordhooks` attaches reusable behaviors to record types and runs them
//! at fixed points around store writes:
//!
//! - [`OrderMaintainer`] keeps an integer order column equal to `1..=N`
//!   within every group of rows (a list's items, a board's columns), across
//!   inserts, moves, group changes and deletes.
//! - [`UuidBehavior`], [`TimestampBehavior`] and [`BlameBehavior`] stamp
//!   identifiers, times and authors.
//! - [`RelatedBehavior`] saves records attached to an owner (a list's new
//!   items) in the owner's transaction, with the owner's key filled in.
//!
//! The [`Lifecycle`] pipeline runs every hook that touches storage in the
//! same transaction as the record write, on any [`RecordStore`]:
//! [`MemoryStore`] in-process or [`SqlStore`] over a database driver.
//!
//! # Example
//!
//! ```ignore
//! use recordhooks::prelude::*;
//!
//! let lifecycle = Lifecycle::new(MemoryStore::new())
//!     .with_behavior(OrderMaintainer::new(
//!         OrderConfig::new().reference_attribute("list_id"),
//!     )?);
//!
//! let mut item = ActiveRecord::new("items", ["id"]).with("list_id", 1_i64);
//! assert!(lifecycle.save(&cx, &mut item).await?);
//! assert_eq!(item.get_i64("order"), Some(1));
//! ```

pub mod lifecycle;

pub use lifecycle::{Lifecycle, LifecycleConfig};

pub use recordhooks_core::{
    ActiveRecord, Behavior, CompareOp, Condition, ConfigError, Cx, Error, Filter, IsolationLevel,
    ModelEvent, Outcome, Record, RecordErrors, RecordStore, Result, Row, SaveKind, StorageError,
    StorageErrorKind, StoreTransaction, Value, try_outcome,
};
pub use recordhooks_memory::{MemoryStore, MemoryTransaction, StoreStats};
pub use recordhooks_order::{OrderConfig, OrderMaintainer};
pub use recordhooks_sql::{Dialect, SqlExecutor, SqlStore, SqlTransaction};
pub use recordhooks_stamp::{
    BlameBehavior, BlameConfig, Clock, FixedClock, IdentityProvider, RelatedBehavior,
    RelatedConfig, SharedIdentity, SystemClock, TimestampBehavior, TimestampConfig, UuidBehavior,
    UuidConfig, UuidFormat,
};

/// Everything needed to configure behaviors and save records.
pub mod prelude {
    pub use crate::{
        ActiveRecord, BlameBehavior, BlameConfig, Cx, Error, Filter, Lifecycle, LifecycleConfig,
        MemoryStore, OrderConfig, OrderMaintainer, Outcome, Record, RecordStore, RelatedBehavior,
        RelatedConfig, SqlStore, StoreTransaction, TimestampBehavior, TimestampConfig, UuidBehavior,
        UuidConfig, Value,
    };
}
