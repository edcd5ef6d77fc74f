//! Dense per-group ordering for recordhooks.
//!
//! [`OrderMaintainer`] is a lifecycle behavior that keeps an integer order
//! column equal to `1..=N` within every group of rows sharing the configured
//! reference values, across inserts, moves, group changes and deletes.
//!
//! # Example
//!
//! ```ignore
//! use recordhooks_order::{OrderConfig, OrderMaintainer};
//!
//! let ordering = OrderMaintainer::new(
//!     OrderConfig::new()
//!         .order_attribute("position")
//!         .reference_attribute("list_id"),
//! )?;
//! let lifecycle = Lifecycle::new(store).with_behavior(ordering);
//! ```

pub mod config;
pub mod maintainer;

pub use config::OrderConfig;
pub use maintainer::OrderMaintainer;
