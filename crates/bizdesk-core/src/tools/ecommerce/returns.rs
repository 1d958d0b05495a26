//! Returns, refunds and return-fraud screening

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{flag, int, num, query_one, query_rows, text};
use bizdesk_store::time::{days_ago, now, now_ts, parse_ts};

use crate::tools::fmt::rupees;
use crate::tools::params::{opt_f64, opt_i64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub const RETURN_WINDOW_DAYS: i64 = 30;

const ORDER_ID: Param = Param::req("order_id", Kind::Integer, "Order number");
const EMAIL: Param = Param::req("customer_email", Kind::String, "Customer email address");
const RETURN_ID: Param = Param::req("return_id", Kind::Integer, "Return request number");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "check_return_eligibility",
        description: "Check whether an order can be returned: delivered, owned by the customer, within 30 days and not already returned.",
        params: &[ORDER_ID, EMAIL],
        handler: Handler::Sql(check_return_eligibility),
    },
    ToolSpec {
        name: "flag_return_fraud",
        description: "Screen a customer for return-fraud patterns before a return is processed.",
        params: &[EMAIL, Param::opt("order_id", Kind::Integer, "Order being returned")],
        handler: Handler::Sql(flag_return_fraud),
    },
    ToolSpec {
        name: "initiate_return",
        description: "Create a return request. Runs the eligibility and fraud checks first.",
        params: &[
            ORDER_ID,
            EMAIL,
            Param::req("reason", Kind::String, "Reason for the return"),
            Param::opt("product_id", Kind::Integer, "Product being returned, defaults to the first item"),
        ],
        handler: Handler::Sql(initiate_return),
    },
    ToolSpec {
        name: "approve_return",
        description: "Approve a pending return so a refund can be issued.",
        params: &[RETURN_ID],
        handler: Handler::Sql(approve_return),
    },
    ToolSpec {
        name: "reject_return",
        description: "Reject a return request with a reason.",
        params: &[RETURN_ID, Param::req("reason", Kind::String, "Rejection reason")],
        handler: Handler::Sql(reject_return),
    },
    ToolSpec {
        name: "process_refund",
        description: "Issue the refund for an approved return. method: original_payment | store_credit | bank_transfer.",
        params: &[
            RETURN_ID,
            Param::opt("method", Kind::String, "original_payment, store_credit or bank_transfer"),
            Param::opt("amount", Kind::Number, "Refund amount, defaults to the returned item's price"),
        ],
        handler: Handler::Sql(process_refund),
    },
    ToolSpec {
        name: "get_return_status",
        description: "Look up one return by id, or every return of a customer by email.",
        params: &[
            Param::opt("return_id", Kind::Integer, "Return request number"),
            Param::opt("customer_email", Kind::String, "Customer email address"),
        ],
        handler: Handler::Sql(get_return_status),
    },
    ToolSpec {
        name: "get_refund_status",
        description: "Look up the refund for a return, or every refund of a customer by email.",
        params: &[
            Param::opt("return_id", Kind::Integer, "Return request number"),
            Param::opt("customer_email", Kind::String, "Customer email address"),
        ],
        handler: Handler::Sql(get_refund_status),
    },
];

fn refuse(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn ineligible(reason: impl Into<String>) -> Value {
    json!({"eligible": false, "reason": reason.into()})
}

pub(crate) fn eligibility(conn: &Connection, order_id: i64, email: &str) -> Result<Value> {
    let Some(order) = query_one(
        conn,
        "SELECT status, delivered_at, customer_email FROM orders WHERE id = ?1",
        params![order_id],
    )?
    else {
        return Ok(ineligible(format!("Order #{} not found.", order_id)));
    };

    if !text(&order, "customer_email").eq_ignore_ascii_case(email) {
        return Ok(ineligible("Email does not match this order."));
    }
    let status = text(&order, "status");
    if status != "delivered" {
        return Ok(ineligible(format!(
            "Order is '{}', only delivered orders can be returned.",
            status
        )));
    }
    let Some(delivered) = parse_ts(text(&order, "delivered_at")) else {
        return Ok(ineligible("Delivery not confirmed."));
    };

    let days_since = (now() - delivered).num_days();
    if days_since > RETURN_WINDOW_DAYS {
        return Ok(ineligible(format!(
            "Return window expired: delivered {} days ago (limit: {} days).",
            days_since, RETURN_WINDOW_DAYS
        )));
    }

    let existing = query_one(
        conn,
        "SELECT id, status FROM returns WHERE order_id = ?1",
        params![order_id],
    )?;
    if let Some(existing) = existing {
        return Ok(ineligible(format!(
            "Return already initiated for this order (#{}, status: {}).",
            int(&existing, "id"),
            text(&existing, "status")
        )));
    }

    Ok(json!({
        "eligible": true,
        "days_since_delivery": days_since,
        "message": format!(
            "Order #{} is eligible for return ({} days since delivery).",
            order_id, days_since
        ),
    }))
}

fn check_return_eligibility(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    eligibility(conn, order_id, email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudRisk {
    Low,
    Medium,
    High,
}

impl FraudRisk {
    fn from_factor_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Self::Low => "APPROVE",
            Self::Medium => "REVIEW",
            Self::High => "BLOCK",
        }
    }
}

pub(crate) struct FraudScreen {
    pub risk: FraudRisk,
    pub factors: Vec<String>,
    pub recent_returns: i64,
}

pub(crate) fn screen_fraud(conn: &Connection, email: &str) -> Result<FraudScreen> {
    let recent_returns: i64 = conn.query_row(
        "SELECT COUNT(*) FROM returns WHERE customer_email = ?1 AND initiated_at > ?2",
        params![email, days_ago(90)],
        |r| r.get(0),
    )?;
    let prior_fraud: i64 = conn.query_row(
        "SELECT COUNT(*) FROM returns WHERE customer_email = ?1 AND fraud_flag = 1",
        params![email],
        |r| r.get(0),
    )?;
    let created: Option<String> = conn
        .query_row(
            "SELECT created_at FROM customers WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )
        .optional()?;

    let mut factors = Vec::new();
    if recent_returns >= 5 {
        factors.push(format!(
            "Serial returner: {} returns in last 90 days",
            recent_returns
        ));
    }
    if prior_fraud > 0 {
        factors.push(format!(
            "Prior fraud flags: {} previous fraud incidents",
            prior_fraud
        ));
    }
    if let Some(created) = created.as_deref().and_then(parse_ts) {
        let age = (now() - created).num_days();
        if age < 7 {
            factors.push(format!("New account: only {} days old", age));
        }
    }

    Ok(FraudScreen {
        risk: FraudRisk::from_factor_count(factors.len()),
        factors,
        recent_returns,
    })
}

fn flag_return_fraud(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let order_id = opt_i64(input, "order_id")?;
    let screen = screen_fraud(conn, email)?;

    let factors_text = if screen.factors.is_empty() {
        "None".to_string()
    } else {
        screen.factors.join("; ")
    };
    Ok(json!({
        "customer_email": email,
        "order_id": order_id,
        "fraud_risk": screen.risk.as_str(),
        "risk_factors": screen.factors,
        "recent_returns_90_days": screen.recent_returns,
        "recommendation": screen.risk.recommendation(),
        "message": format!("Fraud risk: {}. Factors: {}.", screen.risk.as_str(), factors_text),
    }))
}

fn initiate_return(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let reason = req_str(input, "reason")?;

    let owned: Option<i64> = conn
        .query_row(
            "SELECT id FROM orders WHERE id = ?1 AND customer_email = ?2 COLLATE NOCASE",
            params![order_id, email],
            |r| r.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Ok(refuse(format!(
            "Order #{} not found for '{}'.",
            order_id, email
        )));
    }

    let eligibility = eligibility(conn, order_id, email)?;
    if !flag(&eligibility, "eligible") {
        return Ok(json!({"status": "ineligible", "message": eligibility["reason"]}));
    }

    let product_id = match opt_i64(input, "product_id")? {
        Some(id) => Some(id),
        None => conn
            .query_row(
                "SELECT product_id FROM order_items WHERE order_id = ?1 ORDER BY id LIMIT 1",
                params![order_id],
                |r| r.get(0),
            )
            .optional()?,
    };

    let screen = screen_fraud(conn, email)?;
    let fraud_flag = screen.risk != FraudRisk::Low;
    let fraud_reason = (!screen.factors.is_empty()).then(|| screen.factors.join("; "));
    let status = if screen.risk == FraudRisk::High {
        "flagged"
    } else {
        "pending"
    };

    conn.execute(
        "INSERT INTO returns (order_id, customer_email, product_id, reason, status, fraud_flag, fraud_reason, initiated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![order_id, email, product_id, reason, status, fraud_flag, fraud_reason, now_ts()],
    )?;
    let return_id = conn.last_insert_rowid();

    if status == "flagged" {
        return Ok(json!({
            "status": "flagged",
            "return_id": return_id,
            "message": format!(
                "Return #{} flagged for manual review. Reason: {}. Our team will contact you within 24 hours.",
                return_id,
                fraud_reason.unwrap_or_default()
            ),
        }));
    }
    Ok(json!({
        "status": "initiated",
        "return_id": return_id,
        "fraud_flag": fraud_flag,
        "message": format!(
            "Return #{} initiated for Order #{}. We will review within 24-48 hours.",
            return_id, order_id
        ),
    }))
}

fn approve_return(conn: &Connection, input: &Value) -> Result<Value> {
    let return_id = req_i64(input, "return_id")?;
    let Some(ret) = query_one(
        conn,
        "SELECT id, fraud_flag FROM returns WHERE id = ?1",
        params![return_id],
    )?
    else {
        return Ok(refuse(format!("Return #{} not found.", return_id)));
    };
    if flag(&ret, "fraud_flag") {
        return Ok(refuse("Cannot approve: fraud flag is set on this return."));
    }

    conn.execute(
        "UPDATE returns SET status = 'approved', resolved_at = ?1 WHERE id = ?2",
        params![now_ts(), return_id],
    )?;
    Ok(json!({
        "status": "approved",
        "return_id": return_id,
        "message": format!(
            "Return #{} approved. Proceed to process_refund to issue the refund.",
            return_id
        ),
    }))
}

fn reject_return(conn: &Connection, input: &Value) -> Result<Value> {
    let return_id = req_i64(input, "return_id")?;
    let reason = req_str(input, "reason")?;

    let updated = conn.execute(
        "UPDATE returns SET status = 'rejected', fraud_reason = ?1, resolved_at = ?2 WHERE id = ?3",
        params![reason, now_ts(), return_id],
    )?;
    if updated == 0 {
        return Ok(refuse(format!("Return #{} not found.", return_id)));
    }
    Ok(json!({
        "status": "rejected",
        "return_id": return_id,
        "message": format!("Return #{} rejected. Reason: {}", return_id, reason),
    }))
}

fn process_refund(conn: &Connection, input: &Value) -> Result<Value> {
    let return_id = req_i64(input, "return_id")?;
    let method = str_or(input, "method", "original_payment");
    if !matches!(method, "original_payment" | "store_credit" | "bank_transfer") {
        return Ok(refuse(format!(
            "Unknown refund method '{}'. Use original_payment, store_credit or bank_transfer.",
            method
        )));
    }

    let Some(ret) = query_one(
        conn,
        "SELECT r.status, r.customer_email,
                COALESCE(
                    (SELECT oi.subtotal FROM order_items oi
                     WHERE oi.order_id = r.order_id AND oi.product_id = r.product_id LIMIT 1),
                    o.total_amount
                ) AS item_amount
         FROM returns r JOIN orders o ON r.order_id = o.id
         WHERE r.id = ?1",
        params![return_id],
    )?
    else {
        return Ok(refuse(format!("Return #{} not found.", return_id)));
    };

    let status = text(&ret, "status");
    if status != "approved" {
        return Ok(refuse(format!(
            "Return is '{}', it must be approved before refund.",
            status
        )));
    }
    let already: Option<i64> = conn
        .query_row(
            "SELECT id FROM refunds WHERE return_id = ?1",
            params![return_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(refund_id) = already {
        return Ok(refuse(format!(
            "Return #{} was already refunded (refund #{}).",
            return_id, refund_id
        )));
    }

    let email = text(&ret, "customer_email").to_string();
    let amount = opt_f64(input, "amount")?.unwrap_or_else(|| num(&ret, "item_amount"));

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO refunds (return_id, customer_email, amount, method, status, processed_at)
         VALUES (?1, ?2, ?3, ?4, 'completed', ?5)",
        params![return_id, email, amount, method, now_ts()],
    )?;
    let refund_id = tx.last_insert_rowid();

    let mut points_added = 0;
    if method == "store_credit" {
        points_added = (amount / 10.0).floor() as i64;
        tx.execute(
            "UPDATE customers SET loyalty_points = loyalty_points + ?1 WHERE email = ?2",
            params![points_added, email],
        )?;
        tx.execute(
            "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
             SELECT ?1, ?2, ?3, loyalty_points FROM customers WHERE email = ?1",
            params![email, points_added, format!("Store credit refund for Return #{}", return_id)],
        )?;
    }
    tx.commit()?;

    Ok(json!({
        "status": "processed",
        "refund_id": refund_id,
        "amount": amount,
        "method": method,
        "loyalty_points_added": points_added,
        "message": format!(
            "Refund #{} of {} processed via {}.",
            refund_id,
            rupees(amount),
            method.replace('_', " ")
        ),
    }))
}

fn get_return_status(conn: &Connection, input: &Value) -> Result<Value> {
    const SELECT: &str = "SELECT r.id, r.order_id, r.reason, r.status, r.fraud_flag,
            substr(r.initiated_at, 1, 16) AS initiated_at,
            substr(r.resolved_at, 1, 16) AS resolved_at,
            p.name AS product_name
         FROM returns r LEFT JOIN products p ON r.product_id = p.id";

    if let Some(return_id) = opt_i64(input, "return_id")? {
        let row = query_one(conn, &format!("{} WHERE r.id = ?1", SELECT), params![return_id])?;
        return Ok(row.map(|mut r| {
            r["found"] = json!(true);
            r
        })
        .unwrap_or_else(|| {
            json!({"found": false, "message": format!("Return #{} not found.", return_id)})
        }));
    }

    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        &format!("{} WHERE r.customer_email = ?1 ORDER BY r.initiated_at DESC", SELECT),
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No returns found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn get_refund_status(conn: &Connection, input: &Value) -> Result<Value> {
    const SELECT: &str = "SELECT id, return_id, amount, method, status,
            substr(processed_at, 1, 16) AS processed_at
         FROM refunds";

    if let Some(return_id) = opt_i64(input, "return_id")? {
        let rows = query_rows(conn, &format!("{} WHERE return_id = ?1", SELECT), params![return_id])?;
        if rows.is_empty() {
            return Ok(json!({
                "found": false,
                "message": format!("No refund issued yet for Return #{}.", return_id),
            }));
        }
        return Ok(json!({"found": true, "refunds": rows}));
    }

    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        &format!("{} WHERE customer_email = ?1 ORDER BY processed_at DESC", SELECT),
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No refunds found for '{}'.", email)}]));
    }
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

    fn delivered_order(conn: &Connection, email: &str) -> i64 {
        conn.query_row(
            "SELECT id FROM orders WHERE customer_email = ?1 AND status = 'delivered'
             ORDER BY delivered_at DESC LIMIT 1",
            params![email],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_eligibility_rules() {
        let conn = seeded(AppKind::Ecommerce);
        // delivered 10 days ago, no return yet
        let order = delivered_order(&conn, "sneha.patel@shop.com");
        let ok = run(&conn, "check_return_eligibility", json!({"order_id": order, "customer_email": "sneha.patel@shop.com"}));
        assert_eq!(ok["eligible"], true);
        assert_eq!(ok["days_since_delivery"], 10);

        let wrong = run(&conn, "check_return_eligibility", json!({"order_id": order, "customer_email": "x@shop.com"}));
        assert_eq!(wrong["eligible"], false);

        // delivered 55 days ago
        let old: i64 = conn
            .query_row("SELECT id FROM orders WHERE total_amount = 129999", [], |r| r.get(0))
            .unwrap();
        let expired = run(&conn, "check_return_eligibility", json!({"order_id": old, "customer_email": "anjali.nair@shop.com"}));
        assert!(expired["reason"].as_str().unwrap().contains("window expired"));

        // already returned
        let returned = delivered_order(&conn, "fraud.customer@shop.com");
        let dup = run(&conn, "check_return_eligibility", json!({"order_id": returned, "customer_email": "fraud.customer@shop.com"}));
        assert!(dup["reason"].as_str().unwrap().contains("already initiated"));
    }

    #[test]
    fn test_fraud_screen_levels() {
        let conn = seeded(AppKind::Ecommerce);
        let clean = run(&conn, "flag_return_fraud", json!({"customer_email": "sneha.patel@shop.com"}));
        assert_eq!(clean["fraud_risk"], "LOW");
        assert_eq!(clean["recommendation"], "APPROVE");

        let serial = run(&conn, "flag_return_fraud", json!({"customer_email": "serial.returner@shop.com"}));
        assert_eq!(serial["fraud_risk"], "MEDIUM");

        // prior fraud flag plus a 3-day-old account
        let fraud = run(&conn, "flag_return_fraud", json!({"customer_email": "fraud.customer@shop.com"}));
        assert_eq!(fraud["fraud_risk"], "HIGH");
        assert_eq!(fraud["recommendation"], "BLOCK");
    }

    #[test]
    fn test_return_approve_refund_flow() {
        let conn = seeded(AppKind::Ecommerce);
        let email = "sneha.patel@shop.com";
        let order = delivered_order(&conn, email);

        let created = run(&conn, "initiate_return", json!({"order_id": order, "customer_email": email, "reason": "Strap torn"}));
        assert_eq!(created["status"], "initiated");
        let return_id = created["return_id"].as_i64().unwrap();

        let early = run(&conn, "process_refund", json!({"return_id": return_id}));
        assert!(early["message"].as_str().unwrap().contains("must be approved"));

        let approved = run(&conn, "approve_return", json!({"return_id": return_id}));
        assert_eq!(approved["status"], "approved");

        let before: i64 = conn
            .query_row("SELECT loyalty_points FROM customers WHERE email = ?1", params![email], |r| r.get(0))
            .unwrap();
        let refund = run(&conn, "process_refund", json!({"return_id": return_id, "method": "store_credit"}));
        assert_eq!(refund["status"], "processed");
        assert_eq!(refund["amount"], 2999.0);
        assert_eq!(refund["loyalty_points_added"], 299);

        let after: i64 = conn
            .query_row("SELECT loyalty_points FROM customers WHERE email = ?1", params![email], |r| r.get(0))
            .unwrap();
        assert_eq!(after - before, 299);

        let status = run(&conn, "get_refund_status", json!({"return_id": return_id}));
        assert_eq!(status["found"], true);

        let twice = run(&conn, "process_refund", json!({"return_id": return_id}));
        assert_eq!(twice["status"], "error");
    }

    #[test]
    fn test_flagged_return_cannot_be_approved() {
        let conn = seeded(AppKind::Ecommerce);
        let flagged: i64 = conn
            .query_row("SELECT id FROM returns WHERE status = 'flagged' LIMIT 1", [], |r| r.get(0))
            .unwrap();
        let result = run(&conn, "approve_return", json!({"return_id": flagged}));
        assert_eq!(result["status"], "error");

        let rejected = run(&conn, "reject_return", json!({"return_id": flagged, "reason": "Abuse"}));
        assert_eq!(rejected["status"], "rejected");

        let by_id = run(&conn, "get_return_status", json!({"return_id": flagged}));
        assert_eq!(by_id["status"], "rejected");
        let by_email = run(&conn, "get_return_status", json!({"customer_email": "serial.returner@shop.com"}));
        assert_eq!(by_email.as_array().unwrap().len(), 2);
    }
}
