//! Core types and traits for recordhooks.
//!
//! `recordhooks-core` is the contract layer every other crate builds on:
//!
//! - **Data**: `Value`, `Row` and `Filter` describe what behaviors read and
//!   write and which rows an operation touches.
//! - **Records**: `Record` is the capability interface behaviors use to get
//!   and set attributes by configured name; `ActiveRecord` is a dynamic
//!   implementation.
//! - **Stores**: `RecordStore` and `StoreTransaction` are the persistence
//!   seam. `recordhooks-memory` and `recordhooks-sql` implement them.
//! - **Hooks**: `Behavior` and `ModelEvent` define the lifecycle points the
//!   `recordhooks` pipeline calls.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from
//!   asupersync so every store call is cancel-correct.

pub use asupersync::{Cx, Outcome};

#[macro_use]
mod macros;

pub mod active;
pub mod behavior;
pub mod error;
pub mod filter;
pub mod identifiers;
pub mod record;
pub mod row;
pub mod store;
pub mod value;

pub use active::ActiveRecord;
pub use behavior::{Behavior, ModelEvent, SaveKind};
pub use error::{
    ConfigError, Error, Result, StorageError, StorageErrorKind, config_error, storage_error,
};
pub use filter::{CompareOp, Condition, Filter};
pub use identifiers::{is_valid_identifier, quote_ident, quote_ident_mysql, validate_identifier};
pub use record::{Record, RecordErrors};
pub use row::Row;
pub use store::{IsolationLevel, RecordStore, StoreTransaction};
pub use value::Value;
