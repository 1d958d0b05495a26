//! Order tracking and management

use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{query_one, query_rows, text};
use bizdesk_store::time::{format_date, parse_ts};

use crate::tools::params::{req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const ORDER_ID: Param = Param::req("order_id", Kind::Integer, "Order number");
const EMAIL: Param = Param::req("customer_email", Kind::String, "Email address on the order");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "list_customer_orders",
        description: "List all orders for a customer with their current status.",
        params: &[EMAIL],
        handler: Handler::Sql(list_customer_orders),
    },
    ToolSpec {
        name: "get_order_details",
        description: "Get full details of a specific order including all items.",
        params: &[ORDER_ID],
        handler: Handler::Sql(get_order_details),
    },
    ToolSpec {
        name: "get_order_status",
        description: "Get the current status and tracking information for an order.",
        params: &[ORDER_ID],
        handler: Handler::Sql(get_order_status),
    },
    ToolSpec {
        name: "get_delivery_estimate",
        description: "Get the estimated delivery date for an order.",
        params: &[ORDER_ID],
        handler: Handler::Sql(get_delivery_estimate),
    },
    ToolSpec {
        name: "cancel_order",
        description: "Cancel an order that has not yet been shipped.",
        params: &[
            ORDER_ID,
            EMAIL,
            Param::opt("reason", Kind::String, "Why the customer is cancelling"),
        ],
        handler: Handler::Sql(cancel_order),
    },
    ToolSpec {
        name: "update_shipping_address",
        description: "Update the shipping address for an order that is still processing.",
        params: &[
            ORDER_ID,
            EMAIL,
            Param::req("new_address", Kind::String, "Full new shipping address"),
        ],
        handler: Handler::Sql(update_shipping_address),
    },
];

const ORDER_COLUMNS: &str = "id, status, total_amount, tracking_number, carrier,
    substr(created_at, 1, 16) AS created_at,
    substr(shipped_at, 1, 16) AS shipped_at,
    substr(delivered_at, 1, 16) AS delivered_at";

fn not_found(order_id: i64) -> Value {
    json!({"found": false, "message": format!("Order #{} not found.", order_id)})
}

fn refuse(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn list_customer_orders(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE customer_email = ?1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ),
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No orders found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn get_order_details(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let order = query_one(
        conn,
        "SELECT o.id, o.customer_email, cu.name AS customer_name, o.status, o.total_amount,
                o.shipping_address, o.tracking_number, o.carrier,
                substr(o.created_at, 1, 16) AS created_at,
                substr(o.shipped_at, 1, 16) AS shipped_at,
                substr(o.delivered_at, 1, 16) AS delivered_at
         FROM orders o JOIN customers cu ON o.customer_email = cu.email
         WHERE o.id = ?1",
        params![order_id],
    )?;
    let Some(order) = order else {
        return Ok(not_found(order_id));
    };

    let items = query_rows(
        conn,
        "SELECT p.name, p.sku, p.brand, oi.quantity, oi.unit_price, oi.subtotal
         FROM order_items oi JOIN products p ON oi.product_id = p.id
         WHERE oi.order_id = ?1",
        params![order_id],
    )?;
    Ok(json!({"found": true, "order": order, "items": items}))
}

fn status_message(status: &str) -> &str {
    match status {
        "processing" => "Your order is being prepared.",
        "shipped" => "Your order is on its way!",
        "out_for_delivery" => "Your order is out for delivery today!",
        "delivered" => "Your order has been delivered.",
        "cancelled" => "This order has been cancelled.",
        other => other,
    }
}

fn get_order_status(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let Some(row) = query_one(
        conn,
        "SELECT status, tracking_number, carrier,
                substr(shipped_at, 1, 16) AS shipped_at,
                substr(delivered_at, 1, 16) AS delivered_at
         FROM orders WHERE id = ?1",
        params![order_id],
    )?
    else {
        return Ok(not_found(order_id));
    };

    let status = text(&row, "status");
    Ok(json!({
        "found": true,
        "order_id": order_id,
        "status": status,
        "message": status_message(status),
        "tracking_number": row["tracking_number"],
        "carrier": row["carrier"],
        "shipped_at": row["shipped_at"],
        "delivered_at": row["delivered_at"],
    }))
}

fn get_delivery_estimate(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let Some(row) = query_one(
        conn,
        "SELECT status, shipped_at, carrier, substr(delivered_at, 1, 16) AS delivered_at
         FROM orders WHERE id = ?1",
        params![order_id],
    )?
    else {
        return Ok(not_found(order_id));
    };

    let status = text(&row, "status");
    let estimate = match status {
        "delivered" => json!({
            "status": "delivered",
            "delivered_at": row["delivered_at"],
            "message": "This order has already been delivered.",
        }),
        "processing" => json!({
            "status": "processing",
            "message": "Order is still being prepared. Will ship within 1-2 business days.",
        }),
        "out_for_delivery" => json!({
            "status": "out_for_delivery",
            "message": "Out for delivery today, expected by 8 PM.",
        }),
        _ => match parse_ts(text(&row, "shipped_at")) {
            Some(shipped) => {
                let eta = format_date((shipped + Duration::days(3)).date());
                let carrier = text(&row, "carrier");
                json!({
                    "status": "shipped",
                    "carrier": carrier,
                    "estimated_delivery": eta,
                    "message": format!("Expected delivery by {} via {}.", eta, carrier),
                })
            }
            None => json!({
                "status": status,
                "message": "Delivery estimate not available yet.",
            }),
        },
    };
    Ok(estimate)
}

fn cancel_order(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let reason = str_or(input, "reason", "Customer request");

    let Some(row) = query_one(
        conn,
        "SELECT status, customer_email FROM orders WHERE id = ?1",
        params![order_id],
    )?
    else {
        return Ok(refuse(format!("Order #{} not found.", order_id)));
    };

    if !text(&row, "customer_email").eq_ignore_ascii_case(email) {
        return Ok(refuse("This order does not belong to this email address."));
    }
    match text(&row, "status") {
        status @ ("shipped" | "out_for_delivery" | "delivered") => {
            return Ok(refuse(format!(
                "Order #{} cannot be cancelled, it is already '{}'.",
                order_id, status
            )));
        }
        "cancelled" => {
            return Ok(refuse(format!("Order #{} is already cancelled.", order_id)));
        }
        _ => {}
    }

    conn.execute(
        "UPDATE orders SET status = 'cancelled' WHERE id = ?1",
        params![order_id],
    )?;
    Ok(json!({
        "status": "cancelled",
        "order_id": order_id,
        "reason": reason,
        "message": format!(
            "Order #{} has been cancelled. Refund will be processed within 3-5 business days.",
            order_id
        ),
    }))
}

fn update_shipping_address(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let address = req_str(input, "new_address")?;

    let Some(row) = query_one(
        conn,
        "SELECT status, customer_email FROM orders WHERE id = ?1",
        params![order_id],
    )?
    else {
        return Ok(refuse(format!("Order #{} not found.", order_id)));
    };

    if !text(&row, "customer_email").eq_ignore_ascii_case(email) {
        return Ok(refuse("Unauthorised: email does not match this order."));
    }
    let status = text(&row, "status");
    if status != "processing" {
        return Ok(refuse(format!(
            "Cannot update address, order is already '{}'.",
            status
        )));
    }

    conn.execute(
        "UPDATE orders SET shipping_address = ?1 WHERE id = ?2",
        params![address, order_id],
    )?;
    Ok(json!({
        "status": "updated",
        "order_id": order_id,
        "message": format!("Shipping address updated for Order #{}.", order_id),
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

    fn order_id(conn: &Connection, email: &str, status: &str) -> i64 {
        conn.query_row(
            "SELECT id FROM orders WHERE customer_email = ?1 AND status = ?2 LIMIT 1",
            params![email, status],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_list_and_details() {
        let conn = seeded(AppKind::Ecommerce);
        let orders = run(&conn, "list_customer_orders", json!({"customer_email": "aarav.sharma@shop.com"}));
        assert_eq!(orders.as_array().unwrap().len(), 2);

        let empty = run(&conn, "list_customer_orders", json!({"customer_email": "nobody@shop.com"}));
        assert!(empty[0]["message"].as_str().unwrap().contains("No orders found"));

        let id = order_id(&conn, "aarav.sharma@shop.com", "delivered");
        let details = run(&conn, "get_order_details", json!({"order_id": id}));
        assert_eq!(details["found"], true);
        assert_eq!(details["order"]["customer_name"], "Aarav Sharma");
        assert_eq!(details["items"][0]["sku"], "SONY-WH5-BLK");

        let missing = run(&conn, "get_order_details", json!({"order_id": 9999}));
        assert_eq!(missing["found"], false);
    }

    #[test]
    fn test_status_messages_and_estimates() {
        let conn = seeded(AppKind::Ecommerce);
        let shipped = order_id(&conn, "priya.mehta@shop.com", "shipped");
        let status = run(&conn, "get_order_status", json!({"order_id": shipped}));
        assert_eq!(status["message"], "Your order is on its way!");

        let estimate = run(&conn, "get_delivery_estimate", json!({"order_id": shipped}));
        assert_eq!(estimate["status"], "shipped");
        assert!(estimate["estimated_delivery"].is_string());

        let processing = order_id(&conn, "rohan.verma@shop.com", "processing");
        let estimate = run(&conn, "get_delivery_estimate", json!({"order_id": processing}));
        assert!(estimate["message"].as_str().unwrap().contains("1-2 business days"));
    }

    #[test]
    fn test_cancel_rules() {
        let conn = seeded(AppKind::Ecommerce);
        let processing = order_id(&conn, "rohan.verma@shop.com", "processing");

        let wrong_owner = run(
            &conn,
            "cancel_order",
            json!({"order_id": processing, "customer_email": "priya.mehta@shop.com"}),
        );
        assert_eq!(wrong_owner["status"], "error");

        let ok = run(
            &conn,
            "cancel_order",
            json!({"order_id": processing, "customer_email": "rohan.verma@shop.com", "reason": "Found cheaper"}),
        );
        assert_eq!(ok["status"], "cancelled");

        let again = run(
            &conn,
            "cancel_order",
            json!({"order_id": processing, "customer_email": "rohan.verma@shop.com"}),
        );
        assert!(again["message"].as_str().unwrap().contains("already cancelled"));

        let delivered = order_id(&conn, "sneha.patel@shop.com", "delivered");
        let refused = run(
            &conn,
            "cancel_order",
            json!({"order_id": delivered, "customer_email": "sneha.patel@shop.com"}),
        );
        assert!(refused["message"].as_str().unwrap().contains("already 'delivered'"));
    }

    #[test]
    fn test_address_only_while_processing() {
        let conn = seeded(AppKind::Ecommerce);
        let processing = order_id(&conn, "kavya.reddy@shop.com", "processing");
        let ok = run(
            &conn,
            "update_shipping_address",
            json!({"order_id": processing, "customer_email": "kavya.reddy@shop.com", "new_address": "1 New Road"}),
        );
        assert_eq!(ok["status"], "updated");

        let shipped = order_id(&conn, "karan.gupta@shop.com", "shipped");
        let refused = run(
            &conn,
            "update_shipping_address",
            json!({"order_id": shipped, "customer_email": "karan.gupta@shop.com", "new_address": "x"}),
        );
        assert_eq!(refused["status"], "error");
    }
}
