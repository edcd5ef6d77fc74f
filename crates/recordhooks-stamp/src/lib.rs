//! Stamping behaviors for recordhooks.
//!
//! - [`UuidBehavior`] fills a UUID attribute on insert.
//! - [`TimestampBehavior`] maintains `created_at` / `updated_at`.
//! - [`BlameBehavior`] maintains `created_by` / `updated_by` from an
//!   [`IdentityProvider`].
//! - [`RelatedBehavior`] writes records attached to an owner in the
//!   owner's save transaction.
//!
//! The stamping behaviors never touch the store; they only set attributes
//! on the record before it is written, so they compose freely with
//! ordering.

pub mod blame;
pub mod related;
pub mod timestamp;
pub mod uuid_key;

pub use blame::{BlameBehavior, BlameConfig, IdentityProvider, SharedIdentity};
pub use related::{RelatedBehavior, RelatedConfig};
pub use timestamp::{Clock, FixedClock, SystemClock, TimestampBehavior, TimestampConfig};
pub use uuid_key::{UuidBehavior, UuidConfig, UuidFormat};
