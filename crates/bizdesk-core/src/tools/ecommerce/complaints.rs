//! Complaints, replacements, escalations and product reviews

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, round_to, text};
use bizdesk_store::time::now_ts;

use crate::tools::params::{opt_i64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub const COMPLAINT_TYPES: &[&str] = &[
    "product_defect",
    "late_delivery",
    "wrong_item",
    "billing_issue",
    "out_of_stock",
    "return_rejected",
    "other",
];

pub const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

const STATUSES: &[&str] = &["open", "in_progress", "resolved", "closed"];

/// Loyalty points for every accepted review
const REVIEW_POINTS: i64 = 50;

const EMAIL: Param = Param::req("customer_email", Kind::String, "Customer email address");
const COMPLAINT_ID: Param = Param::req("complaint_id", Kind::Integer, "Complaint number");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "submit_complaint",
        description: "File a complaint. Types: product_defect, late_delivery, wrong_item, billing_issue, \
                      out_of_stock, return_rejected, other. Urgent complaints are escalated at once.",
        params: &[
            EMAIL,
            Param::opt("order_id", Kind::Integer, "Order the complaint is about"),
            Param::req("complaint_type", Kind::String, "Complaint type"),
            Param::req("description", Kind::String, "What went wrong"),
            Param::opt("priority", Kind::String, "low, medium (default), high or urgent"),
        ],
        handler: Handler::Sql(submit_complaint),
    },
    ToolSpec {
        name: "get_complaint_status",
        description: "List every complaint a customer has filed, newest first.",
        params: &[EMAIL],
        handler: Handler::Sql(get_complaint_status),
    },
    ToolSpec {
        name: "update_complaint_status",
        description: "Move a complaint to open, in_progress, resolved or closed.",
        params: &[
            COMPLAINT_ID,
            Param::req("new_status", Kind::String, "New status"),
            Param::opt("resolution", Kind::String, "How it was resolved"),
        ],
        handler: Handler::Sql(update_complaint_status),
    },
    ToolSpec {
        name: "request_replacement",
        description: "Request a replacement instead of a refund for a delivered order.",
        params: &[
            EMAIL,
            Param::req("order_id", Kind::Integer, "Order number"),
            Param::req("reason", Kind::String, "Why a replacement is needed"),
        ],
        handler: Handler::Sql(request_replacement),
    },
    ToolSpec {
        name: "escalate_to_human",
        description: "Hand a complaint to a senior human agent; it becomes urgent.",
        params: &[
            COMPLAINT_ID,
            Param::req("reason", Kind::String, "Why it needs a human"),
        ],
        handler: Handler::Sql(escalate_to_human),
    },
    ToolSpec {
        name: "add_review",
        description: "Submit a 1-5 star review for a product from a delivered order. Earns 50 loyalty points.",
        params: &[
            EMAIL,
            Param::req("product_id", Kind::Integer, "Product id"),
            Param::req("order_id", Kind::Integer, "Order the product came from"),
            Param::req("rating", Kind::Integer, "Stars, 1 to 5"),
            Param::opt("comment", Kind::String, "Review text"),
        ],
        handler: Handler::Sql(add_review),
    },
    ToolSpec {
        name: "get_product_reviews",
        description: "Get every review of a product with its average rating.",
        params: &[Param::req("product_id", Kind::Integer, "Product id")],
        handler: Handler::Sql(get_product_reviews),
    },
];

fn refuse(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn response_time(priority: &str) -> &'static str {
    match priority {
        "urgent" => "1 hour",
        "high" => "4 hours",
        _ => "24 hours",
    }
}

fn submit_complaint(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let order_id = opt_i64(input, "order_id")?;
    let kind = req_str(input, "complaint_type")?.to_lowercase();
    let description = req_str(input, "description")?;
    let priority = str_or(input, "priority", "medium").to_lowercase();

    if !COMPLAINT_TYPES.contains(&kind.as_str()) {
        return Ok(refuse(format!(
            "Invalid type. Choose: {}",
            COMPLAINT_TYPES.join(", ")
        )));
    }
    if !PRIORITIES.contains(&priority.as_str()) {
        return Ok(refuse(format!("Invalid priority. Choose: {}", PRIORITIES.join(", "))));
    }
    let registered = query_one(conn, "SELECT name FROM customers WHERE email = ?1", params![email])?;
    if registered.is_none() {
        return Ok(refuse(format!("Customer '{}' not registered.", email)));
    }
    if let Some(order_id) = order_id {
        let owned = query_one(
            conn,
            "SELECT id FROM orders WHERE id = ?1 AND customer_email = ?2",
            params![order_id, email],
        )?;
        if owned.is_none() {
            return Ok(refuse(format!("Order #{} not found for '{}'.", order_id, email)));
        }
    }

    let escalated = priority == "urgent";
    conn.execute(
        "INSERT INTO complaints (customer_email, order_id, type, description, status, priority, escalated, created_at)
         VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7)",
        params![email, order_id, kind, description, priority, escalated, now_ts()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "submitted",
        "complaint_id": id,
        "escalated": escalated,
        "message": format!(
            "Complaint #{} filed ({}response within {}).",
            id,
            if escalated { "escalated to the senior team, " } else { "" },
            response_time(&priority)
        ),
    }))
}

fn get_complaint_status(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        "SELECT id, order_id, type, description, status, priority, escalated, resolution,
                substr(created_at, 1, 16) AS created_at,
                substr(resolved_at, 1, 16) AS resolved_at
         FROM complaints WHERE customer_email = ?1
         ORDER BY created_at DESC, id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No complaints found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn update_complaint_status(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "complaint_id")?;
    let status = req_str(input, "new_status")?.to_lowercase();
    let resolution = str_or(input, "resolution", "");
    if !STATUSES.contains(&status.as_str()) {
        return Ok(refuse(format!("Invalid status. Choose: {}", STATUSES.join(", "))));
    }
    if query_one(conn, "SELECT id FROM complaints WHERE id = ?1", params![id])?.is_none() {
        return Ok(refuse(format!("Complaint #{} not found.", id)));
    }

    let closing = matches!(status.as_str(), "resolved" | "closed");
    conn.execute(
        "UPDATE complaints
         SET status = ?1,
             resolution = COALESCE(NULLIF(?2, ''), resolution),
             resolved_at = CASE WHEN ?3 THEN ?4 ELSE resolved_at END
         WHERE id = ?5",
        params![status, resolution, closing, now_ts(), id],
    )?;
    Ok(json!({
        "status": "updated",
        "complaint_id": id,
        "new_status": status,
        "message": format!("Complaint #{} status is now '{}'.", id, status),
    }))
}

fn request_replacement(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let order_id = req_i64(input, "order_id")?;
    let reason = req_str(input, "reason")?;
    let Some(order) = query_one(
        conn,
        "SELECT status FROM orders WHERE id = ?1 AND customer_email = ?2",
        params![order_id, email],
    )?
    else {
        return Ok(refuse(format!("Order #{} not found for '{}'.", order_id, email)));
    };
    if text(&order, "status") != "delivered" {
        return Ok(refuse("Replacements are only available for delivered orders."));
    }

    conn.execute(
        "INSERT INTO complaints (customer_email, order_id, type, description, status, priority, created_at)
         VALUES (?1, ?2, 'product_defect', ?3, 'in_progress', 'high', ?4)",
        params![email, order_id, format!("Replacement request: {}", reason), now_ts()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "replacement_requested",
        "complaint_id": id,
        "message": format!(
            "Replacement request #{} filed for Order #{}. A replacement ships within 2-3 business days after verification.",
            id, order_id
        ),
    }))
}

fn escalate_to_human(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "complaint_id")?;
    let reason = req_str(input, "reason")?;
    let changed = conn.execute(
        "UPDATE complaints SET escalated = 1, priority = 'urgent', status = 'in_progress' WHERE id = ?1",
        params![id],
    )?;
    if changed == 0 {
        return Ok(refuse(format!("Complaint #{} not found.", id)));
    }
    Ok(json!({
        "status": "escalated",
        "complaint_id": id,
        "message": format!(
            "Complaint #{} escalated to a senior human agent. Reason: {}. Response within 1 hour.",
            id, reason
        ),
    }))
}

fn add_review(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let product_id = req_i64(input, "product_id")?;
    let order_id = req_i64(input, "order_id")?;
    let rating = req_i64(input, "rating")?;
    let comment = str_or(input, "comment", "");

    if !(1..=5).contains(&rating) {
        return Ok(refuse("Rating must be between 1 and 5."));
    }
    let delivered = query_one(
        conn,
        "SELECT id FROM orders WHERE id = ?1 AND customer_email = ?2 AND status = 'delivered'",
        params![order_id, email],
    )?;
    if delivered.is_none() {
        return Ok(refuse("Reviews can only be submitted for delivered orders."));
    }
    if query_one(conn, "SELECT id FROM products WHERE id = ?1", params![product_id])?.is_none() {
        return Ok(refuse(format!("Product #{} not found.", product_id)));
    }
    let existing = query_one(
        conn,
        "SELECT id FROM reviews WHERE customer_email = ?1 AND product_id = ?2 AND order_id = ?3",
        params![email, product_id, order_id],
    )?;
    if existing.is_some() {
        return Ok(refuse("You have already reviewed this product for this order."));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO reviews (customer_email, product_id, order_id, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![email, product_id, order_id, rating, comment, now_ts()],
    )?;
    let review_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE customers SET loyalty_points = loyalty_points + ?1 WHERE email = ?2",
        params![REVIEW_POINTS, email],
    )?;
    tx.execute(
        "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
         SELECT ?1, ?2, ?3, loyalty_points FROM customers WHERE email = ?1",
        params![email, REVIEW_POINTS, format!("Review submitted for product #{}", product_id)],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "submitted",
        "review_id": review_id,
        "rating": rating,
        "points_earned": REVIEW_POINTS,
        "message": format!(
            "Review submitted ({} stars). You earned {} loyalty points.",
            rating, REVIEW_POINTS
        ),
    }))
}

fn get_product_reviews(conn: &Connection, input: &Value) -> Result<Value> {
    let product_id = req_i64(input, "product_id")?;
    let Some(product) = query_one(conn, "SELECT name FROM products WHERE id = ?1", params![product_id])? else {
        return Ok(json!({"found": false, "message": format!("Product #{} not found.", product_id)}));
    };

    let reviews = query_rows(
        conn,
        "SELECT r.rating, r.comment, r.response, substr(r.created_at, 1, 10) AS created_at,
                cu.name AS reviewer
         FROM reviews r JOIN customers cu ON r.customer_email = cu.email
         WHERE r.product_id = ?1
         ORDER BY r.created_at DESC, r.id DESC",
        params![product_id],
    )?;
    let average = if reviews.is_empty() {
        Value::Null
    } else {
        let total: f64 = reviews.iter().map(|r| num(r, "rating")).sum();
        json!(round_to(total / reviews.len() as f64, 1))
    };
    Ok(json!({
        "found": true,
        "product": product["name"],
        "review_count": reviews.len(),
        "average_rating": average,
        "lowest_rating": reviews.iter().map(|r| int(r, "rating")).min(),
        "reviews": reviews,
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
    fn test_submit_validation_and_escalation() {
        let conn = seeded(AppKind::Ecommerce);
        let bad = run(
            &conn,
            "submit_complaint",
            json!({"customer_email": "rohan.verma@shop.com", "complaint_type": "rude", "description": "x"}),
        );
        assert!(bad["message"].as_str().unwrap().starts_with("Invalid type"));

        let stranger = run(
            &conn,
            "submit_complaint",
            json!({"customer_email": "ghost@shop.com", "complaint_type": "other", "description": "x"}),
        );
        assert!(stranger["message"].as_str().unwrap().contains("not registered"));

        let order = order_id(&conn, "rohan.verma@shop.com", "processing");
        let filed = run(
            &conn,
            "submit_complaint",
            json!({
                "customer_email": "rohan.verma@shop.com",
                "order_id": order,
                "complaint_type": "billing_issue",
                "description": "Charged before dispatch",
                "priority": "URGENT",
            }),
        );
        assert_eq!(filed["status"], "submitted");
        assert_eq!(filed["escalated"], true);
        assert_eq!(filed["complaint_id"], 7);
        assert!(filed["message"].as_str().unwrap().contains("1 hour"));

        let someone_elses = run(
            &conn,
            "submit_complaint",
            json!({"customer_email": "priya.mehta@shop.com", "order_id": order, "complaint_type": "other", "description": "x"}),
        );
        assert_eq!(someone_elses["status"], "error");

        let listed = run(&conn, "get_complaint_status", json!({"customer_email": "rohan.verma@shop.com"}));
        assert_eq!(listed[0]["priority"], "urgent");
    }

    #[test]
    fn test_status_updates_and_escalation() {
        let conn = seeded(AppKind::Ecommerce);
        let invalid = run(&conn, "update_complaint_status", json!({"complaint_id": 3, "new_status": "done"}));
        assert_eq!(invalid["status"], "error");

        let resolved = run(
            &conn,
            "update_complaint_status",
            json!({"complaint_id": 3, "new_status": "resolved", "resolution": "Correct colour shipped"}),
        );
        assert_eq!(resolved["new_status"], "resolved");
        let listed = run(&conn, "get_complaint_status", json!({"customer_email": "vikram.singh@shop.com"}));
        assert_eq!(listed[0]["resolution"], "Correct colour shipped");
        assert!(listed[0]["resolved_at"].is_string());

        let escalated = run(&conn, "escalate_to_human", json!({"complaint_id": 6, "reason": "Threatening chargeback"}));
        assert_eq!(escalated["status"], "escalated");
        let listed = run(&conn, "get_complaint_status", json!({"customer_email": "serial.returner@shop.com"}));
        assert_eq!(listed[0]["priority"], "urgent");
        assert_eq!(listed[0]["escalated"], 1);

        let missing = run(&conn, "escalate_to_human", json!({"complaint_id": 99, "reason": "x"}));
        assert_eq!(missing["status"], "error");
    }

    #[test]
    fn test_replacement_needs_delivery() {
        let conn = seeded(AppKind::Ecommerce);
        let shipped = order_id(&conn, "karan.gupta@shop.com", "shipped");
        let early = run(
            &conn,
            "request_replacement",
            json!({"customer_email": "karan.gupta@shop.com", "order_id": shipped, "reason": "Scratched"}),
        );
        assert_eq!(early["message"], "Replacements are only available for delivered orders.");

        let delivered = order_id(&conn, "meena.joshi@shop.com", "delivered");
        let ok = run(
            &conn,
            "request_replacement",
            json!({"customer_email": "meena.joshi@shop.com", "order_id": delivered, "reason": "Melted chocolate"}),
        );
        assert_eq!(ok["status"], "replacement_requested");
    }

    #[test]
    fn test_reviews_award_points_once() {
        let conn = seeded(AppKind::Ecommerce);
        let email = "fraud.customer@shop.com";
        let order = order_id(&conn, email, "delivered");
        let sony: i64 = conn
            .query_row("SELECT id FROM products WHERE sku = 'SONY-WH5-BLK'", [], |r| r.get(0))
            .unwrap();

        let bad = run(
            &conn,
            "add_review",
            json!({"customer_email": email, "product_id": sony, "order_id": order, "rating": 6}),
        );
        assert_eq!(bad["message"], "Rating must be between 1 and 5.");

        let review = json!({"customer_email": email, "product_id": sony, "order_id": order, "rating": 2, "comment": "Meh"});
        let added = run(&conn, "add_review", review.clone());
        assert_eq!(added["points_earned"], 50);
        let points: i64 = conn
            .query_row("SELECT loyalty_points FROM customers WHERE email = ?1", params![email], |r| r.get(0))
            .unwrap();
        assert_eq!(points, 50);

        let twice = run(&conn, "add_review", review);
        assert_eq!(twice["status"], "error");

        let reviews = run(&conn, "get_product_reviews", json!({"product_id": sony}));
        assert_eq!(reviews["review_count"], 2);
        assert_eq!(reviews["average_rating"], 3.5);
        assert_eq!(reviews["lowest_rating"], 2);

        let processing = order_id(&conn, "rohan.verma@shop.com", "processing");
        let undelivered = run(
            &conn,
            "add_review",
            json!({"customer_email": "rohan.verma@shop.com", "product_id": sony, "order_id": processing, "rating": 4}),
        );
        assert_eq!(undelivered["message"], "Reviews can only be submitted for delivered orders.");
    }
}
