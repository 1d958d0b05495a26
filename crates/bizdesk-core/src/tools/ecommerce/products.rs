//! Product catalogue, stock levels and restocking

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, text};
use bizdesk_store::time::date_offset;

use crate::tools::fmt::rupees;
use crate::tools::params::{i64_or, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

/// Supplier lead time quoted for out-of-stock items
const RESTOCK_DAYS: i64 = 7;

const PRODUCT_ID: Param = Param::req("product_id", Kind::Integer, "Product id");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "search_products",
        description: "Search products by name, brand or category (case-insensitive).",
        params: &[Param::req("query", Kind::String, "Search text")],
        handler: Handler::Sql(search_products),
    },
    ToolSpec {
        name: "get_product_info",
        description: "Get full information about a specific product.",
        params: &[PRODUCT_ID],
        handler: Handler::Sql(get_product_info),
    },
    ToolSpec {
        name: "check_stock_level",
        description: "Check the current stock level of a product against its reorder level.",
        params: &[PRODUCT_ID],
        handler: Handler::Sql(check_stock_level),
    },
    ToolSpec {
        name: "get_category_products",
        description: "List every product in a category with availability, cheapest first.",
        params: &[Param::req("category", Kind::String, "Category, e.g. Electronics")],
        handler: Handler::Sql(get_category_products),
    },
    ToolSpec {
        name: "get_low_stock_items",
        description: "List products at or below a stock threshold, for restock alerts.",
        params: &[Param::opt("threshold", Kind::Integer, "Stock threshold (default 10)")],
        handler: Handler::Sql(get_low_stock_items),
    },
    ToolSpec {
        name: "get_price",
        description: "Get the current price of a product.",
        params: &[PRODUCT_ID],
        handler: Handler::Sql(get_price),
    },
    ToolSpec {
        name: "update_stock",
        description: "Adjust stock for a product. Positive adds stock, negative removes it.",
        params: &[
            PRODUCT_ID,
            Param::req("quantity_change", Kind::Integer, "Units to add or remove"),
            Param::opt("reason", Kind::String, "Why stock is changing"),
        ],
        handler: Handler::Sql(update_stock),
    },
    ToolSpec {
        name: "check_restock_date",
        description: "Get the expected restock date for an out-of-stock product.",
        params: &[PRODUCT_ID],
        handler: Handler::Sql(check_restock_date),
    },
];

fn not_found(product_id: i64) -> Value {
    json!({"found": false, "message": format!("Product #{} not found.", product_id)})
}

fn availability(stock: i64) -> &'static str {
    if stock > 0 { "In Stock" } else { "Out of Stock" }
}

/// Adds an `availability` field to every catalogue row
fn with_availability(rows: Vec<Value>) -> Value {
    rows.into_iter()
        .map(|mut row| {
            let label = availability(int(&row, "stock_qty"));
            if let Some(obj) = row.as_object_mut() {
                obj.insert("availability".into(), label.into());
            }
            row
        })
        .collect()
}

fn product(conn: &Connection, product_id: i64) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT id, name, sku, category, brand, price, stock_qty, reorder_level, description
         FROM products WHERE id = ?1",
        params![product_id],
    )
}

fn search_products(conn: &Connection, input: &Value) -> Result<Value> {
    let query = req_str(input, "query")?;
    let pattern = format!("%{}%", query.to_lowercase());
    let rows = query_rows(
        conn,
        "SELECT id, name, sku, category, brand, price, stock_qty, description
         FROM products
         WHERE lower(name) LIKE ?1 OR lower(brand) LIKE ?1 OR lower(category) LIKE ?1
         ORDER BY stock_qty DESC LIMIT 10",
        params![pattern],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No products found matching '{}'.", query)}]));
    }
    Ok(with_availability(rows))
}

fn get_product_info(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let Some(mut row) = product(conn, product_id)? else {
        return Ok(not_found(product_id));
    };

    let stock = int(&row, "stock_qty");
    let stock_status = match stock {
        s if s > 20 => "Plenty in stock",
        s if s > 0 => "Low stock",
        _ => "Out of stock",
    };
    if let Some(obj) = row.as_object_mut() {
        obj.insert("found".into(), true.into());
        obj.insert("availability".into(), availability(stock).into());
        obj.insert("stock_status".into(), stock_status.into());
    }
    Ok(row)
}

fn check_stock_level(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let Some(row) = product(conn, product_id)? else {
        return Ok(not_found(product_id));
    };

    let qty = int(&row, "stock_qty");
    let reorder = int(&row, "reorder_level");
    let status = if qty > reorder * 2 {
        "Well stocked"
    } else if qty > 0 {
        "Low stock"
    } else {
        "Out of stock, reorder needed"
    };
    Ok(json!({
        "product_id": product_id,
        "name": row["name"],
        "sku": row["sku"],
        "stock_qty": qty,
        "reorder_level": reorder,
        "availability": availability(qty),
        "status": status,
        "message": format!("{}: {} units available.", text(&row, "name"), qty),
    }))
}

fn get_category_products(conn: &Connection, input: &Value) -> Result<Value> {
    let category = req_str(input, "category")?;
    let rows = query_rows(
        conn,
        "SELECT id, name, brand, price, stock_qty, description
         FROM products WHERE lower(category) = lower(?1) ORDER BY price",
        params![category],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No products found in category '{}'.", category)}]));
    }
    Ok(with_availability(rows))
}

fn get_low_stock_items(conn: &Connection, input: &Value) -> Result<Value> {
    let threshold = i64_or(input, "threshold", 10)?;
    let rows = query_rows(
        conn,
        "SELECT id, name, sku, category, stock_qty, reorder_level
         FROM products WHERE stock_qty <= ?1 ORDER BY stock_qty, id",
        params![threshold],
    )?;
    if rows.is_empty() {
        return Ok(json!([{
            "message": format!("No products below stock threshold of {}.", threshold)
        }]));
    }
    Ok(Value::Array(rows))
}

fn get_price(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let Some(row) = product(conn, product_id)? else {
        return Ok(not_found(product_id));
    };

    let price = num(&row, "price");
    Ok(json!({
        "product_id": product_id,
        "name": row["name"],
        "price": price,
        "currency": "INR",
        "availability": availability(int(&row, "stock_qty")),
        "message": format!("{} for {}.", rupees(price), text(&row, "name")),
    }))
}

fn update_stock(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let change = req_i64(input, "quantity_change")?;
    let reason = str_or(input, "reason", "Manual adjustment");
    let Some(row) = product(conn, product_id)? else {
        return Ok(json!({
            "status": "error",
            "message": format!("Product #{} not found.", product_id),
        }));
    };

    let old_qty = int(&row, "stock_qty");
    let new_qty = (old_qty + change).max(0);
    conn.execute(
        "UPDATE products SET stock_qty = ?1 WHERE id = ?2",
        params![new_qty, product_id],
    )?;
    Ok(json!({
        "status": "updated",
        "product": row["name"],
        "old_qty": old_qty,
        "new_qty": new_qty,
        "reason": reason,
        "message": format!(
            "Stock updated: {}, {} -> {} units.",
            text(&row, "name"),
            old_qty,
            new_qty
        ),
    }))
}

fn check_restock_date(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let Some(row) = product(conn, product_id)? else {
        return Ok(not_found(product_id));
    };

    let name = text(&row, "name");
    let qty = int(&row, "stock_qty");
    if qty > 0 {
        return Ok(json!({
            "in_stock": true,
            "stock_qty": qty,
            "message": format!("'{}' is currently in stock ({} units).", name, qty),
        }));
    }
    let eta = date_offset(RESTOCK_DAYS);
    Ok(json!({
        "in_stock": false,
        "product": name,
        "sku": row["sku"],
        "estimated_restock": eta,
        "message": format!(
            "'{}' is out of stock. Expected restock by {}. We can notify you when it is back.",
            name, eta
        ),
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

    fn product_id(conn: &Connection, sku: &str) -> i64 {
        conn.query_row("SELECT id FROM products WHERE sku = ?1", params![sku], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_search_and_category() {
        let conn = seeded(AppKind::Ecommerce);
        let found = run(&conn, "search_products", json!({"query": "ELECTRONICS"}));
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(found[0]["sku"], "SONY-WH5-BLK");
        assert_eq!(found[4]["availability"], "Out of Stock");

        let none = run(&conn, "search_products", json!({"query": "sofa"}));
        assert!(none[0]["message"].as_str().unwrap().contains("No products found"));

        let kitchen = run(&conn, "get_category_products", json!({"category": "kitchen"}));
        assert_eq!(kitchen[0]["name"], "Prestige Electric Kettle");
        assert_eq!(kitchen[1]["brand"], "Bosch");
    }

    #[test]
    fn test_stock_labels() {
        let conn = seeded(AppKind::Ecommerce);
        let tv = product_id(&conn, "SAM-TV65-4K");
        let info = run(&conn, "get_product_info", json!({"product_id": tv}));
        assert_eq!(info["found"], true);
        assert_eq!(info["stock_status"], "Low stock");

        let level = run(&conn, "check_stock_level", json!({"product_id": tv}));
        assert_eq!(level["status"], "Well stocked");

        let speaker = product_id(&conn, "JBL-FLIP7-BLK");
        let level = run(&conn, "check_stock_level", json!({"product_id": speaker}));
        assert_eq!(level["status"], "Out of stock, reorder needed");

        let low = run(&conn, "get_low_stock_items", json!({}));
        let low = low.as_array().unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[0]["sku"], "JBL-FLIP7-BLK");

        let missing = run(&conn, "get_product_info", json!({"product_id": 999}));
        assert_eq!(missing["found"], false);
    }

    #[test]
    fn test_price() {
        let conn = seeded(AppKind::Ecommerce);
        let id = product_id(&conn, "SONY-WH5-BLK");
        let price = run(&conn, "get_price", json!({"product_id": id}));
        assert_eq!(price["price"], 29999.0);
        assert_eq!(price["message"], "₹29,999 for Sony WH-1000XM5 Headphones.");
    }

    #[test]
    fn test_stock_updates_and_restock() {
        let conn = seeded(AppKind::Ecommerce);
        let speaker = product_id(&conn, "JBL-FLIP7-BLK");
        let eta = run(&conn, "check_restock_date", json!({"product_id": speaker}));
        assert_eq!(eta["in_stock"], false);
        assert_eq!(eta["estimated_restock"], date_offset(RESTOCK_DAYS));

        let added = run(
            &conn,
            "update_stock",
            json!({"product_id": speaker, "quantity_change": 20, "reason": "Supplier delivery"}),
        );
        assert_eq!(added["old_qty"], 0);
        assert_eq!(added["new_qty"], 20);

        let eta = run(&conn, "check_restock_date", json!({"product_id": speaker}));
        assert_eq!(eta["in_stock"], true);

        let drained = run(&conn, "update_stock", json!({"product_id": speaker, "quantity_change": -50}));
        assert_eq!(drained["new_qty"], 0);
    }
}
