//! SQL dialect differences the store cares about.

use recordhooks_core::{IsolationLevel, quote_ident, quote_ident_mysql};
use serde::{Deserialize, Serialize};

/// Target database family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => quote_ident_mysql(ident),
            Dialect::Postgres | Dialect::Sqlite => quote_ident(ident),
        }
    }

    /// Statements that open a transaction.
    ///
    /// SQLite has no isolation levels; `BEGIN IMMEDIATE` takes the write
    /// lock up front so concurrent savers serialize instead of failing at
    /// commit.
    pub fn begin_statements(self, isolation: Option<IsolationLevel>) -> Vec<String> {
        match (self, isolation) {
            (Dialect::Postgres, Some(level)) => {
                vec![format!("BEGIN ISOLATION LEVEL {}", level.as_sql())]
            }
            (Dialect::Postgres, None) => vec!["BEGIN".to_string()],
            (Dialect::Sqlite, _) => vec!["BEGIN IMMEDIATE".to_string()],
            (Dialect::Mysql, Some(level)) => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
                "START TRANSACTION".to_string(),
            ],
            (Dialect::Mysql, None) => vec!["START TRANSACTION".to_string()],
        }
    }

    /// Whether inserts report generated keys through `RETURNING`.
    pub const fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
    }

    #[test]
    fn test_quote() {
        assert_eq!(Dialect::Postgres.quote("order"), "\"order\"");
        assert_eq!(Dialect::Mysql.quote("order"), "`order`");
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(
            Dialect::Postgres.begin_statements(Some(IsolationLevel::Serializable)),
            vec!["BEGIN ISOLATION LEVEL SERIALIZABLE"]
        );
        assert_eq!(
            Dialect::Sqlite.begin_statements(Some(IsolationLevel::Serializable)),
            vec!["BEGIN IMMEDIATE"]
        );
        assert_eq!(Dialect::Mysql.begin_statements(None), vec!["START TRANSACTION"]);
        assert_eq!(
            Dialect::Mysql
                .begin_statements(Some(IsolationLevel::RepeatableRead))
                .len(),
            2
        );
    }

    #[test]
    fn test_serde_names() {
        let dialect: Dialect = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(dialect, Dialect::Sqlite);
    }
}
