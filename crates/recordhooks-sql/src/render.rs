//! Statement rendering.
//!
//! Every function returns the SQL text and its parameters. Table and column
//! names are validated as plain identifiers and quoted; values are always
//! bound as parameters.

use recordhooks_core::{CompareOp, Filter, Result, Value, validate_identifier};

use crate::dialect::Dialect;

fn where_clause(dialect: Dialect, filter: &Filter, params: &mut Vec<Value>) -> Result<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(filter.conditions().len());
    for cond in filter.conditions() {
        validate_identifier("column", &cond.column)?;
        let column = dialect.quote(&cond.column);
        if cond.value.is_null() {
            // NULL never compares; only equality has a meaning (IS NULL).
            parts.push(match cond.op {
                CompareOp::Eq => format!("{column} IS NULL"),
                _ => "1 = 0".to_string(),
            });
            continue;
        }
        params.push(cond.value.clone());
        parts.push(format!(
            "{column} {} {}",
            cond.op.as_sql(),
            dialect.placeholder(params.len())
        ));
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn table_name(dialect: Dialect, table: &str) -> Result<String> {
    validate_identifier("table", table)?;
    Ok(dialect.quote(table))
}

/// `SELECT COUNT(*) AS "count" FROM t WHERE ...`
pub fn count(dialect: Dialect, table: &str, filter: &Filter) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT COUNT(*) AS {} FROM {}{}",
        dialect.quote("count"),
        table_name(dialect, table)?,
        where_clause(dialect, filter, &mut params)?
    );
    Ok((sql, params))
}

/// `SELECT * FROM t WHERE ...`
pub fn select(dialect: Dialect, table: &str, filter: &Filter) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT * FROM {}{}",
        table_name(dialect, table)?,
        where_clause(dialect, filter, &mut params)?
    );
    Ok((sql, params))
}

/// `INSERT INTO t (a, b) VALUES ($1, $2)`, optionally `RETURNING` a key.
pub fn insert(
    dialect: Dialect,
    table: &str,
    values: &[(String, Value)],
    returning: Option<&str>,
) -> Result<(String, Vec<Value>)> {
    let table = table_name(dialect, table)?;
    let mut params = Vec::with_capacity(values.len());
    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (column, value) in values {
        validate_identifier("column", column)?;
        columns.push(dialect.quote(column));
        params.push(value.clone());
        placeholders.push(dialect.placeholder(params.len()));
    }

    let mut sql = if columns.is_empty() {
        match dialect {
            Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
            Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
        }
    } else {
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    if let Some(key) = returning.filter(|_| dialect.supports_returning()) {
        validate_identifier("generated_key", key)?;
        sql.push_str(" RETURNING ");
        sql.push_str(&dialect.quote(key));
    }
    Ok((sql, params))
}

/// `UPDATE t SET a = $1 WHERE ...`. Empty SQL when there is nothing to set.
pub fn update(
    dialect: Dialect,
    table: &str,
    filter: &Filter,
    values: &[(String, Value)],
) -> Result<(String, Vec<Value>)> {
    let table = table_name(dialect, table)?;
    if values.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut params = Vec::with_capacity(values.len());
    let mut set_clauses = Vec::with_capacity(values.len());
    for (column, value) in values {
        validate_identifier("column", column)?;
        params.push(value.clone());
        set_clauses.push(format!(
            "{} = {}",
            dialect.quote(column),
            dialect.placeholder(params.len())
        ));
    }
    let sql = format!(
        "UPDATE {table} SET {}{}",
        set_clauses.join(", "),
        where_clause(dialect, filter, &mut params)?
    );
    Ok((sql, params))
}

/// `UPDATE t SET "c" = "c" + $1 WHERE ...`
pub fn update_counters(
    dialect: Dialect,
    table: &str,
    filter: &Filter,
    column: &str,
    delta: i64,
) -> Result<(String, Vec<Value>)> {
    let table = table_name(dialect, table)?;
    validate_identifier("column", column)?;
    let column = dialect.quote(column);
    let mut params = vec![Value::BigInt(delta)];
    let sql = format!(
        "UPDATE {table} SET {column} = {column} + {}{}",
        dialect.placeholder(1),
        where_clause(dialect, filter, &mut params)?
    );
    Ok((sql, params))
}

/// `DELETE FROM t WHERE ...`
pub fn delete(dialect: Dialect, table: &str, filter: &Filter) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let sql = format!(
        "DELETE FROM {}{}",
        table_name(dialect, table)?,
        where_clause(dialect, filter, &mut params)?
    );
    Ok((sql, params))
}
