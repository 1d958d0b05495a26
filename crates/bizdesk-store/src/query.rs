//! SQL query builder with identifier whitelisting
//!
//! The database specialist never writes free-form SQL for the common cases.
//! It fills in table/column/filter parameters and these builders assemble a
//! statement from validated pieces: identifiers must match a strict pattern,
//! filter values become quoted literals, sort directions and limits are
//! normalized.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?$").expect("valid regex")
});

static COUNT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^count\(\*\)\s+(?:as\s+)?[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex")
});

static JOIN_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z_][a-zA-Z0-9_]*\.[a-zA-Z_][a-zA-Z0-9_]*\s*=\s*[a-zA-Z_][a-zA-Z0-9_]*\.[a-zA-Z_][a-zA-Z0-9_]*$",
    )
    .expect("valid regex")
});

static READ_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with)\b").expect("valid regex"));

pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Invalid sort direction: {0}")]
    InvalidDirection(String),
    #[error("Invalid join_condition. Use format like: orders.user_id = users.id")]
    InvalidJoinCondition,
}

/// A statement ready for `execute_query`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub query: String,
    pub parameters: Vec<Value>,
}

impl BuiltQuery {
    fn new(query: String) -> Self {
        Self {
            query,
            parameters: Vec::new(),
        }
    }
}

pub fn validate_identifier(name: &str) -> Result<&str, QueryError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// A selectable column: `*`, `COUNT(*) [AS] alias`, or an identifier
pub fn validate_column(name: &str) -> Result<&str, QueryError> {
    let value = name.trim();
    if value == "*" || COUNT_COLUMN.is_match(value) {
        return Ok(value);
    }
    validate_identifier(value)
}

/// Render a JSON value as a SQL literal
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub fn where_clause(filters: Option<&Map<String, Value>>) -> Result<String, QueryError> {
    let Some(filters) = filters.filter(|f| !f.is_empty()) else {
        return Ok(String::new());
    };

    let clauses = filters
        .iter()
        .map(|(field, value)| {
            validate_identifier(field).map(|f| format!("{} = {}", f, sql_literal(value)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

pub fn order_by_clause(order_by: Option<&str>) -> Result<String, QueryError> {
    let Some(order_by) = order_by else {
        return Ok(String::new());
    };

    let mut parts = Vec::new();
    for raw in order_by.split(',') {
        let mut tokens = raw.split_whitespace();
        let Some(column) = tokens.next() else {
            continue;
        };
        let column = validate_identifier(column)?;
        let direction = match tokens.next() {
            None => "ASC".to_string(),
            Some(dir) => {
                let upper = dir.to_uppercase();
                if upper != "ASC" && upper != "DESC" {
                    return Err(QueryError::InvalidDirection(dir.to_string()));
                }
                upper
            }
        };
        parts.push(format!("{} {}", column, direction));
    }

    if parts.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }
}

pub fn limit_clause(limit: Option<i64>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n.clamp(1, MAX_LIMIT)),
        None => String::new(),
    }
}

fn column_list(columns: &[String]) -> Result<String, QueryError> {
    if columns.is_empty() {
        return Ok("*".to_string());
    }
    let cols = columns
        .iter()
        .map(|c| validate_column(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols.join(", "))
}

pub fn build_select(
    table: &str,
    columns: &[String],
    filters: Option<&Map<String, Value>>,
    limit: Option<i64>,
    order_by: Option<&str>,
) -> Result<BuiltQuery, QueryError> {
    let table = validate_identifier(table)?;
    let query = format!(
        "SELECT {} FROM {}{}{}{}",
        column_list(columns)?,
        table,
        where_clause(filters)?,
        order_by_clause(order_by)?,
        limit_clause(limit),
    );
    Ok(BuiltQuery::new(query))
}

pub fn build_count(
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<BuiltQuery, QueryError> {
    let table = validate_identifier(table)?;
    Ok(BuiltQuery::new(format!(
        "SELECT COUNT(*) AS total FROM {}{}",
        table,
        where_clause(filters)?
    )))
}

pub fn build_join(
    primary: &str,
    related: &str,
    join_condition: &str,
    columns: &[String],
    filters: Option<&Map<String, Value>>,
    limit: Option<i64>,
) -> Result<BuiltQuery, QueryError> {
    let left = validate_identifier(primary)?;
    let right = validate_identifier(related)?;
    let condition = join_condition.trim();
    if !JOIN_CONDITION.is_match(condition) {
        return Err(QueryError::InvalidJoinCondition);
    }

    let query = format!(
        "SELECT {} FROM {} JOIN {} ON {}{}{}",
        column_list(columns)?,
        left,
        right,
        condition,
        where_clause(filters)?,
        limit_clause(limit),
    );
    Ok(BuiltQuery::new(query))
}

/// Statements that return rows
pub fn is_read_query(query: &str) -> bool {
    READ_QUERY.is_match(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("public.users").is_ok());
        assert_eq!(
            validate_identifier("users; DROP TABLE x").unwrap_err().to_string(),
            "Invalid SQL identifier: users; DROP TABLE x"
        );
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("1abc").is_err());
    }

    #[test]
    fn test_column_rules() {
        assert_eq!(validate_column(" * ").unwrap(), "*");
        assert_eq!(validate_column("COUNT(*) AS total").unwrap(), "COUNT(*) AS total");
        assert_eq!(validate_column("count(*) n").unwrap(), "count(*) n");
        assert!(validate_column("count(id) as n").is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(sql_literal(&Value::Null), "NULL");
        assert_eq!(sql_literal(&json!(true)), "TRUE");
        assert_eq!(sql_literal(&json!(42)), "42");
        assert_eq!(sql_literal(&json!("O'Brien")), "'O''Brien'");
    }

    #[test]
    fn test_build_select_full() {
        let f = filters(json!({"status": "active"}));
        let q = build_select(
            "users",
            &["id".into(), "name".into()],
            Some(&f),
            Some(5000),
            Some("id desc, name"),
        )
        .unwrap();
        assert_eq!(
            q.query,
            "SELECT id, name FROM users WHERE status = 'active' ORDER BY id DESC, name ASC LIMIT 1000"
        );
        assert!(q.parameters.is_empty());
    }

    #[test]
    fn test_build_select_defaults() {
        let q = build_select("news", &[], None, None, None).unwrap();
        assert_eq!(q.query, "SELECT * FROM news");
        let q = build_select("news", &[], None, Some(0), Some(" , ")).unwrap();
        assert_eq!(q.query, "SELECT * FROM news LIMIT 1");
    }

    #[test]
    fn test_bad_direction() {
        let err = build_select("users", &[], None, None, Some("id sideways")).unwrap_err();
        assert_eq!(err, QueryError::InvalidDirection("sideways".into()));
    }

    #[test]
    fn test_build_count() {
        let f = filters(json!({"user_id": 3}));
        let q = build_count("orders", Some(&f)).unwrap();
        assert_eq!(q.query, "SELECT COUNT(*) AS total FROM orders WHERE user_id = 3");
    }

    #[test]
    fn test_build_join() {
        let q = build_join(
            "orders",
            "users",
            " orders.user_id = users.id ",
            &["COUNT(*) AS total".into()],
            None,
            Some(10),
        )
        .unwrap();
        assert_eq!(
            q.query,
            "SELECT COUNT(*) AS total FROM orders JOIN users ON orders.user_id = users.id LIMIT 10"
        );

        let err = build_join("orders", "users", "1=1", &[], None, None).unwrap_err();
        assert_eq!(err, QueryError::InvalidJoinCondition);
    }

    #[test]
    fn test_is_read_query() {
        assert!(is_read_query("  select * from users"));
        assert!(is_read_query("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_read_query("selection"));
        assert!(!is_read_query("DELETE FROM users"));
    }
}
