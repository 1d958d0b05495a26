//! Medical supplies stock and reorder alerts
//!
//! An item is low once its quantity drops to its reorder level. Stock
//! movements that leave an item low open a reorder alert unless one is
//! already open for it.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};
use tracing::info;

use bizdesk_store::rows::{int, num, query_one, query_rows, text};
use bizdesk_store::time::{date_offset, now_ts};

use super::{error, usd};
use crate::tools::params::{i64_or, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const ITEM_NAME: Param = Param::req("item_name", Kind::String, "Inventory item name");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_all_stock",
        description: "Every inventory item with quantity, reorder level and OK/LOW status.",
        params: &[],
        handler: Handler::Sql(get_all_stock),
    },
    ToolSpec {
        name: "get_low_stock_items",
        description: "Items at or below their reorder level.",
        params: &[],
        handler: Handler::Sql(get_low_stock_items),
    },
    ToolSpec {
        name: "check_item_stock",
        description: "Stock of items whose name matches the search text.",
        params: &[ITEM_NAME],
        handler: Handler::Sql(check_item_stock),
    },
    ToolSpec {
        name: "update_stock",
        description: "Add or subtract stock for an item. Opens a reorder alert when it drops to the reorder level.",
        params: &[
            ITEM_NAME,
            Param::req("quantity_change", Kind::Integer, "Units to add or subtract"),
            Param::opt("operation", Kind::String, "add or subtract (default add)"),
        ],
        handler: Handler::Sql(update_stock),
    },
    ToolSpec {
        name: "create_reorder_alert",
        description: "Open a reorder alert for an item.",
        params: &[ITEM_NAME],
        handler: Handler::Sql(create_reorder_alert),
    },
    ToolSpec {
        name: "get_open_reorder_alerts",
        description: "Open reorder alerts with current stock and supplier.",
        params: &[],
        handler: Handler::Sql(get_open_reorder_alerts),
    },
    ToolSpec {
        name: "resolve_reorder_alert",
        description: "Close a reorder alert once the order is placed.",
        params: &[Param::req("alert_id", Kind::Integer, "Alert id")],
        handler: Handler::Sql(resolve_reorder_alert),
    },
    ToolSpec {
        name: "get_expiring_items",
        description: "Items expiring within the given number of days (default 30).",
        params: &[Param::opt("days", Kind::Integer, "Look-ahead window in days")],
        handler: Handler::Sql(get_expiring_items),
    },
];

const STOCK_COLUMNS: &str = "id, name, category, quantity, unit, reorder_level, expiry_date, supplier,
     cost_per_unit, CASE WHEN quantity <= reorder_level THEN 'LOW' ELSE 'OK' END AS stock_status";

fn get_all_stock(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        &format!("SELECT {} FROM inventory_items ORDER BY category, name", STOCK_COLUMNS),
        [],
    )?;
    Ok(Value::Array(rows))
}

fn get_low_stock_items(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT id, name, quantity, unit, reorder_level, supplier,
                reorder_level - quantity AS shortfall
         FROM inventory_items WHERE quantity <= reorder_level
         ORDER BY shortfall DESC, name",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "All items are above their reorder level."}]));
    }
    Ok(Value::Array(rows))
}

fn check_item_stock(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "item_name")?;
    let rows = query_rows(
        conn,
        &format!(
            "SELECT {} FROM inventory_items WHERE name LIKE ?1 ORDER BY name",
            STOCK_COLUMNS
        ),
        params![format!("%{}%", name)],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No inventory item matches '{}'.", name)}]));
    }
    Ok(Value::Array(rows))
}

fn item_by_name(conn: &Connection, name: &str) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT id, name, quantity, unit, reorder_level FROM inventory_items
         WHERE lower(name) = lower(?1)",
        params![name],
    )
}

fn open_alert(conn: &Connection, item_id: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM reorder_alerts WHERE item_id = ?1 AND status = 'open'",
            params![item_id],
            |r| r.get(0),
        )
        .optional()?)
}

fn update_stock(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "item_name")?;
    let change = req_i64(input, "quantity_change")?;
    let operation = str_or(input, "operation", "add").to_lowercase();

    let Some(item) = item_by_name(conn, name)? else {
        return Ok(error(format!("Item '{}' not found.", name)));
    };
    if change <= 0 {
        return Ok(error("quantity_change must be positive."));
    }
    let current = int(&item, "quantity");
    let updated = match operation.as_str() {
        "add" => current + change,
        "subtract" if change > current => {
            return Ok(error(format!(
                "Insufficient stock: {} has {} {}, cannot remove {}.",
                text(&item, "name"),
                current,
                text(&item, "unit"),
                change
            )));
        }
        "subtract" => current - change,
        _ => return Ok(error("operation must be 'add' or 'subtract'.")),
    };

    let id = int(&item, "id");
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE inventory_items SET quantity = ?1 WHERE id = ?2",
        params![updated, id],
    )?;
    let mut alert_id = None;
    if updated <= int(&item, "reorder_level") && open_alert(&tx, id)?.is_none() {
        tx.execute(
            "INSERT INTO reorder_alerts (item_id, quantity_at_trigger) VALUES (?1, ?2)",
            params![id, updated],
        )?;
        alert_id = Some(tx.last_insert_rowid());
    }
    tx.commit()?;

    let mut out = json!({
        "status": "updated",
        "item": text(&item, "name"),
        "previous_quantity": current,
        "new_quantity": updated,
        "message": format!(
            "{}: {} -> {} {}.",
            text(&item, "name"),
            current,
            updated,
            text(&item, "unit")
        ),
    });
    if let Some(alert) = alert_id {
        info!("Reorder alert #{} opened for {}", alert, text(&item, "name"));
        out["reorder_alert_id"] = json!(alert);
    }
    Ok(out)
}

fn create_reorder_alert(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "item_name")?;
    let Some(item) = item_by_name(conn, name)? else {
        return Ok(error(format!("Item '{}' not found.", name)));
    };
    let id = int(&item, "id");
    if let Some(existing) = open_alert(conn, id)? {
        return Ok(json!({
            "status": "exists",
            "alert_id": existing,
            "message": format!("Reorder alert #{} is already open for {}.", existing, text(&item, "name")),
        }));
    }
    conn.execute(
        "INSERT INTO reorder_alerts (item_id, quantity_at_trigger) VALUES (?1, ?2)",
        params![id, int(&item, "quantity")],
    )?;
    let alert = conn.last_insert_rowid();
    Ok(json!({
        "status": "created",
        "alert_id": alert,
        "message": format!("Reorder alert #{} opened for {}.", alert, text(&item, "name")),
    }))
}

fn get_open_reorder_alerts(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT a.id AS alert_id, i.name, a.quantity_at_trigger, i.quantity AS current_quantity,
                i.reorder_level, i.supplier, i.cost_per_unit,
                substr(a.triggered_at, 1, 16) AS triggered_at
         FROM reorder_alerts a JOIN inventory_items i ON i.id = a.item_id
         WHERE a.status = 'open' ORDER BY a.triggered_at",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No open reorder alerts."}]));
    }
    Ok(Value::Array(rows))
}

fn resolve_reorder_alert(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "alert_id")?;
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM reorder_alerts WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    match status.as_deref() {
        None => return Ok(error(format!("Reorder alert #{} not found.", id))),
        Some("resolved") => return Ok(error(format!("Reorder alert #{} is already resolved.", id))),
        _ => {}
    }
    conn.execute(
        "UPDATE reorder_alerts SET status = 'resolved', resolved_at = ?1 WHERE id = ?2",
        params![now_ts(), id],
    )?;
    Ok(json!({"status": "resolved", "message": format!("Reorder alert #{} resolved.", id)}))
}

fn get_expiring_items(conn: &Connection, input: &Value) -> Result<Value> {
    let days = i64_or(input, "days", 30)?.max(0);
    let rows = query_rows(
        conn,
        "SELECT name, quantity, unit, expiry_date, cost_per_unit * quantity AS stock_value
         FROM inventory_items
         WHERE expiry_date IS NOT NULL AND expiry_date <= ?1
         ORDER BY expiry_date",
        params![date_offset(days)],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("Nothing expires in the next {} days.", days)}]));
    }
    let rows = rows
        .into_iter()
        .map(|mut r| {
            let value = usd(num(&r, "stock_value"));
            r["stock_value"] = json!(value);
            r
        })
        .collect();
    Ok(Value::Array(rows))
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
    fn test_stock_views() {
        let conn = seeded(AppKind::Hospital);
        let all = run(&conn, "get_all_stock", json!({}));
        assert_eq!(all.as_array().unwrap().len(), 10);

        let low = run(&conn, "get_low_stock_items", json!({}));
        assert_eq!(low[0]["name"], "Hand Sanitizer");
        assert_eq!(low[1]["name"], "Oxygen Cylinders");

        let gloves = run(&conn, "check_item_stock", json!({"item_name": "glove"}));
        assert_eq!(gloves[0]["stock_status"], "OK");

        let expiring = run(&conn, "get_expiring_items", json!({"days": 30}));
        assert_eq!(expiring[0]["name"], "Hand Sanitizer");
        assert_eq!(expiring[0]["stock_value"], "$90.00");
    }

    #[test]
    fn test_subtract_opens_one_alert() {
        let conn = seeded(AppKind::Hospital);
        let too_many = run(
            &conn,
            "update_stock",
            json!({"item_name": "bandages", "quantity_change": 500, "operation": "subtract"}),
        );
        assert!(too_many["message"].as_str().unwrap().starts_with("Insufficient stock"));

        let low = run(
            &conn,
            "update_stock",
            json!({"item_name": "Bandages", "quantity_change": 330, "operation": "subtract"}),
        );
        assert_eq!(low["new_quantity"], 70);
        assert!(low["reorder_alert_id"].is_i64());

        let lower = run(
            &conn,
            "update_stock",
            json!({"item_name": "Bandages", "quantity_change": 10, "operation": "subtract"}),
        );
        assert!(lower.get("reorder_alert_id").is_none());

        let manual = run(&conn, "create_reorder_alert", json!({"item_name": "Bandages"}));
        assert_eq!(manual["status"], "exists");
    }

    #[test]
    fn test_alert_lifecycle() {
        let conn = seeded(AppKind::Hospital);
        let open = run(&conn, "get_open_reorder_alerts", json!({}));
        assert_eq!(open[0]["name"], "Oxygen Cylinders");

        let created = run(&conn, "create_reorder_alert", json!({"item_name": "Hand Sanitizer"}));
        assert_eq!(created["alert_id"], 2);

        let resolved = run(&conn, "resolve_reorder_alert", json!({"alert_id": 1}));
        assert_eq!(resolved["status"], "resolved");
        let twice = run(&conn, "resolve_reorder_alert", json!({"alert_id": 1}));
        assert_eq!(twice["status"], "error");

        let restocked = run(
            &conn,
            "update_stock",
            json!({"item_name": "Oxygen Cylinders", "quantity_change": 16}),
        );
        assert_eq!(restocked["new_quantity"], 20);
        assert!(restocked.get("reorder_alert_id").is_none());
    }
}
