//! Query builders and executor for the sandbox database
//!
//! The builders never touch the database; they return `{"query", "parameters"}`
//! for `execute_query` to run. Validation failures surface as tool errors.

use anyhow::Result;
use rusqlite::Connection;
use serde_json::{Value, json};
use tracing::{info, warn};

use bizdesk_store::query::{self, is_read_query};
use bizdesk_store::rows::query_rows;

use crate::tools::params::{opt_i64, opt_object, opt_str, req_str, str_list};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const COLUMNS: Param = Param::opt("columns", Kind::Array, "Columns to select (default *)");
const FILTERS: Param = Param::opt("filters", Kind::Object, "Equality filters, column to value");
const LIMIT: Param = Param::opt("limit", Kind::Integer, "Row limit, clamped to 1..1000");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "build_select_query",
        description: "Prepare a SELECT statement from a table, columns, filters, order and limit.",
        params: &[
            Param::req("table_name", Kind::String, "Table to read (users, orders, news)"),
            COLUMNS,
            FILTERS,
            LIMIT,
            Param::opt("order_by", Kind::String, "e.g. 'created_at DESC, id'"),
        ],
        handler: Handler::Pure(build_select_query),
    },
    ToolSpec {
        name: "build_count_query",
        description: "Prepare a COUNT(*) statement with optional filters.",
        params: &[
            Param::req("table_name", Kind::String, "Table to count"),
            FILTERS,
        ],
        handler: Handler::Pure(build_count_query),
    },
    ToolSpec {
        name: "build_join_query",
        description: "Prepare a two-table JOIN. join_condition looks like orders.user_id = users.id",
        params: &[
            Param::req("primary_table", Kind::String, "Left table"),
            Param::req("related_table", Kind::String, "Right table"),
            Param::req("join_condition", Kind::String, "a.col = b.col"),
            COLUMNS,
            FILTERS,
            LIMIT,
        ],
        handler: Handler::Pure(build_join_query),
    },
    ToolSpec {
        name: "execute_query",
        description: "Execute a prepared query. SELECT/WITH return rows; other statements return a message.",
        params: &[
            Param::req("query", Kind::String, "SQL from one of the build tools"),
            Param::opt("parameters", Kind::Array, "Unused, kept for builder payload compatibility"),
        ],
        handler: Handler::Sql(execute_query),
    },
];

fn build_select_query(input: &Value) -> Result<Value> {
    let table = req_str(input, "table_name")?;
    let filters = opt_object(input, "filters")?;
    let built = query::build_select(
        table,
        &str_list(input, "columns"),
        filters.as_ref(),
        opt_i64(input, "limit")?,
        opt_str(input, "order_by"),
    )?;
    info!("build_select_query table={}", table);
    Ok(serde_json::to_value(built)?)
}

fn build_count_query(input: &Value) -> Result<Value> {
    let table = req_str(input, "table_name")?;
    let filters = opt_object(input, "filters")?;
    let built = query::build_count(table, filters.as_ref())?;
    info!("build_count_query table={}", table);
    Ok(serde_json::to_value(built)?)
}

fn build_join_query(input: &Value) -> Result<Value> {
    let primary = req_str(input, "primary_table")?;
    let related = req_str(input, "related_table")?;
    let filters = opt_object(input, "filters")?;
    let built = query::build_join(
        primary,
        related,
        req_str(input, "join_condition")?,
        &str_list(input, "columns"),
        filters.as_ref(),
        opt_i64(input, "limit")?,
    )?;
    info!("build_join_query primary={} related={}", primary, related);
    Ok(serde_json::to_value(built)?)
}

fn execute_query(conn: &Connection, input: &Value) -> Result<Value> {
    let sql = req_str(input, "query")?;
    info!("execute_query: {}", sql);

    let outcome = if is_read_query(sql) {
        query_rows(conn, sql, rusqlite::params![]).map(|rows| {
            json!({
                "status": "ok",
                "query": sql,
                "row_count": rows.len(),
                "rows": rows,
            })
        })
    } else {
        conn.execute_batch(sql)
            .map(|_| {
                json!({
                    "status": "ok",
                    "query": sql,
                    "message": format!("{} row(s) affected", conn.changes()),
                })
            })
            .map_err(Into::into)
    };

    Ok(outcome.unwrap_or_else(|e| {
        warn!("execute_query failed: {}", e);
        json!({"status": "error", "query": sql, "error": e.to_string()})
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::seeded;
    use bizdesk_store::AppKind;

    fn run(conn: &Connection, name: &str, input: Value) -> Value {
        crate::tools::testing::run(TOOLS, conn, name, input)
    }

    #[test]
    fn test_builders() {
        let out = build_select_query(&json!({
            "table_name": "users",
            "columns": ["name", "city"],
            "filters": {"status": "active"},
            "order_by": "name desc",
            "limit": 3
        }))
        .unwrap();
        assert_eq!(
            out["query"],
            "SELECT name, city FROM users WHERE status = 'active' ORDER BY name DESC LIMIT 3"
        );
        assert_eq!(out["parameters"], json!([]));

        let err = build_select_query(&json!({"table_name": "users; drop table users"})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid SQL identifier"));

        let err = build_join_query(&json!({
            "primary_table": "orders",
            "related_table": "users",
            "join_condition": "1 = 1"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("orders.user_id = users.id"));
    }

    #[test]
    fn test_execute_built_queries() {
        let conn = seeded(AppKind::Fusion);
        let count = build_count_query(&json!({"table_name": "users", "filters": {"status": "active"}})).unwrap();
        let out = run(&conn, "execute_query", json!({"query": count["query"]}));
        assert_eq!(out["status"], "ok");
        assert_eq!(out["rows"][0]["total"], 6);

        let join = build_join_query(&json!({
            "primary_table": "orders",
            "related_table": "users",
            "join_condition": "orders.user_id = users.id",
            "columns": ["users.name", "orders.product"],
            "filters": {"users.city": "Tokyo"}
        }))
        .unwrap();
        let out = run(&conn, "execute_query", json!({"query": join["query"]}));
        assert_eq!(out["row_count"], 0);
    }

    #[test]
    fn test_execute_write_and_error() {
        let conn = seeded(AppKind::Fusion);
        let out = run(
            &conn,
            "execute_query",
            json!({"query": "UPDATE users SET status = 'inactive' WHERE city = 'Lagos'"}),
        );
        assert_eq!(out["status"], "ok");
        assert_eq!(out["message"], "1 row(s) affected");

        let out = run(&conn, "execute_query", json!({"query": "SELECT * FROM nowhere"}));
        assert_eq!(out["status"], "error");
        assert!(out["error"].as_str().unwrap().contains("no such table"));
    }
}
