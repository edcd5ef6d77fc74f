//! Ordering behavior configuration.

use serde::{Deserialize, Serialize};

use recordhooks_core::{Result, config_error, validate_identifier};

/// Options of an [`OrderMaintainer`](crate::OrderMaintainer).
///
/// Deserializes from the same shape it serializes to, with every field
/// optional:
///
/// ```
/// use recordhooks_order::OrderConfig;
///
/// let config: OrderConfig = serde_json::from_str(
///     r#"{ "order_attribute": "position", "reference_attributes": ["list_id"] }"#,
/// ).unwrap();
/// assert_eq!(config.order_attribute, "position");
/// assert!(!config.prevent_initialization);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderConfig {
    /// Integer column holding the 1-based position.
    pub order_attribute: String,
    /// Columns whose values define a group. Empty means the whole table is
    /// one group.
    pub reference_attributes: Vec<String>,
    /// Reject saves whose order value is missing instead of appending the
    /// record to the end of its group.
    pub prevent_initialization: bool,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            order_attribute: "order".to_string(),
            reference_attributes: Vec::new(),
            prevent_initialization: false,
        }
    }
}

impl OrderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the order column.
    pub fn order_attribute(mut self, name: impl Into<String>) -> Self {
        self.order_attribute = name.into();
        self
    }

    /// Add one grouping column.
    pub fn reference_attribute(mut self, name: impl Into<String>) -> Self {
        self.reference_attributes.push(name.into());
        self
    }

    /// Replace the grouping columns.
    pub fn reference_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn prevent_initialization(mut self, prevent: bool) -> Self {
        self.prevent_initialization = prevent;
        self
    }

    /// Check that every name is a usable column identifier and that the
    /// order column is not also a grouping column.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("order_attribute", &self.order_attribute)?;
        for (idx, name) in self.reference_attributes.iter().enumerate() {
            validate_identifier("reference_attributes", name)?;
            if *name == self.order_attribute {
                return Err(config_error(
                    "reference_attributes",
                    format!("'{name}' is already the order attribute"),
                ));
            }
            if self.reference_attributes[..idx].contains(name) {
                return Err(config_error(
                    "reference_attributes",
                    format!("'{name}' is listed twice"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrderConfig::default();
        assert_eq!(config.order_attribute, "order");
        assert!(config.reference_attributes.is_empty());
        assert!(!config.prevent_initialization);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = OrderConfig::new()
            .order_attribute("position")
            .reference_attribute("board_id")
            .reference_attribute("column_id")
            .prevent_initialization(true);
        assert_eq!(config.reference_attributes, vec!["board_id", "column_id"]);
        assert!(config.prevent_initialization);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(OrderConfig::new().order_attribute("").validate().is_err());
        assert!(
            OrderConfig::new()
                .reference_attribute("list id")
                .validate()
                .is_err()
        );
        assert!(
            OrderConfig::new()
                .reference_attribute("order")
                .validate()
                .is_err()
        );
        assert!(
            OrderConfig::new()
                .reference_attributes(["a", "a"])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<OrderConfig>(r#"{ "sort_attribute": "x" }"#);
        assert!(parsed.is_err());
    }
}
