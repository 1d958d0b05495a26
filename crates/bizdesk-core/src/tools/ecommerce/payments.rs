//! Payments, duplicate charges, coupons and invoices

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, round_to, text};
use bizdesk_store::time::{format_date, parse_date, today};

use super::loyalty::PROMOS;
use crate::tools::fmt::{grouped, inr, rupees, title};
use crate::tools::params::{req_f64, req_i64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const ORDER_ID: Param = Param::req("order_id", Kind::Integer, "Order number");
const EMAIL: Param = Param::req("customer_email", Kind::String, "Email address on the order");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_payment_details",
        description: "Get every payment transaction for an order, warning about possible duplicates.",
        params: &[ORDER_ID, EMAIL],
        handler: Handler::Sql(get_payment_details),
    },
    ToolSpec {
        name: "verify_charge",
        description: "Check the amount charged for an order against its total; detects duplicates and overcharges.",
        params: &[ORDER_ID, EMAIL],
        handler: Handler::Sql(verify_charge),
    },
    ToolSpec {
        name: "flag_duplicate_charge",
        description: "Flag the later of two identical charges on an order for refund.",
        params: &[ORDER_ID, EMAIL],
        handler: Handler::Sql(flag_duplicate_charge),
    },
    ToolSpec {
        name: "check_coupon",
        description: "Check whether a coupon code applies to an order total and compute the discount.",
        params: &[
            Param::req("code", Kind::String, "Coupon code"),
            Param::req("order_total", Kind::Number, "Order total in rupees"),
        ],
        handler: Handler::Pure(check_coupon),
    },
    ToolSpec {
        name: "get_invoice",
        description: "Build the invoice for an order.",
        params: &[ORDER_ID, EMAIL],
        handler: Handler::Sql(get_invoice),
    },
    ToolSpec {
        name: "get_transaction_history",
        description: "Get the full payment history of a customer, newest first.",
        params: &[Param::req("customer_email", Kind::String, "Customer email address")],
        handler: Handler::Sql(get_transaction_history),
    },
    ToolSpec {
        name: "apply_store_credit",
        description: "Pay part of an order with loyalty points as store credit. 1 point = ₹1.",
        params: &[
            Param::req("customer_email", Kind::String, "Customer email address"),
            ORDER_ID,
            Param::req("credit_amount", Kind::Number, "Rupees of credit to apply"),
        ],
        handler: Handler::Sql(apply_store_credit),
    },
];

fn refuse(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn order_not_found(order_id: i64, email: &str) -> String {
    format!("Order #{} not found for '{}'.", order_id, email)
}

/// `credit_card` -> `Credit Card`
fn method_label(method: &str) -> String {
    method.split('_').map(title).collect::<Vec<_>>().join(" ")
}

fn get_payment_details(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let mut rows = query_rows(
        conn,
        "SELECT id, amount, method, status, transaction_id,
                substr(payment_date, 1, 16) AS payment_date
         FROM payments WHERE order_id = ?1 AND customer_email = ?2
         ORDER BY payment_date, id",
        params![order_id, email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No payments found for Order #{}.", order_id)}]));
    }

    let mut amounts: Vec<i64> = rows.iter().map(|r| (num(r, "amount") * 100.0).round() as i64).collect();
    amounts.sort_unstable();
    let repeated = amounts.windows(2).any(|w| w[0] == w[1]);
    if repeated {
        for row in rows.iter_mut() {
            if let Some(obj) = row.as_object_mut() {
                obj.insert("warning".into(), "Possible duplicate charge detected!".into());
            }
        }
    }
    Ok(Value::Array(rows))
}

fn verify_charge(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let Some(order) = query_one(
        conn,
        "SELECT total_amount FROM orders WHERE id = ?1 AND customer_email = ?2",
        params![order_id, email],
    )?
    else {
        return Ok(refuse(order_not_found(order_id, email)));
    };

    let paid = query_one(
        conn,
        "SELECT COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total FROM payments
         WHERE order_id = ?1 AND customer_email = ?2 AND status = 'completed'",
        params![order_id, email],
    )?
    .unwrap_or(Value::Null);

    let order_total = num(&order, "total_amount");
    let charged = num(&paid, "total");
    let count = int(&paid, "count");
    let overcharge = round_to(charged - order_total, 2);

    let mut issues = Vec::new();
    if count > 1 {
        issues.push(format!("Duplicate charge: {} transactions found for the same order", count));
    }
    if overcharge > 0.0 {
        issues.push(format!("Overcharged by {}", inr(overcharge)));
    }
    let message = if issues.is_empty() {
        "Charge verified, amount matches the order total.".to_string()
    } else {
        format!("Issue found: {}", issues.join("; "))
    };
    Ok(json!({
        "order_id": order_id,
        "order_total": order_total,
        "total_charged": charged,
        "transaction_count": count,
        "duplicate_detected": count > 1,
        "overcharge_detected": overcharge > 0.0,
        "issues": issues,
        "status": if issues.is_empty() { "ok" } else { "issues_found" },
        "message": message,
    }))
}

fn flag_duplicate_charge(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let payments = query_rows(
        conn,
        "SELECT id, amount, transaction_id FROM payments
         WHERE order_id = ?1 AND customer_email = ?2 AND status = 'completed'
         ORDER BY payment_date, id",
        params![order_id, email],
    )?;
    if payments.len() < 2 {
        return Ok(refuse(format!("No duplicate charges found for Order #{}.", order_id)));
    }

    // the later of a repeated amount is the duplicate
    let duplicate = payments.iter().enumerate().rev().find(|(i, later)| {
        payments[..*i]
            .iter()
            .any(|earlier| num(earlier, "amount") == num(later, "amount"))
    });
    let Some((_, duplicate)) = duplicate else {
        return Ok(json!({
            "status": "no_duplicate",
            "message": "Charges are for different amounts, not a duplicate.",
        }));
    };

    let amount = num(duplicate, "amount");
    conn.execute(
        "UPDATE payments SET status = 'refund_pending' WHERE id = ?1",
        params![int(duplicate, "id")],
    )?;
    Ok(json!({
        "status": "flagged",
        "duplicate_payment_id": duplicate["id"],
        "duplicate_amount": amount,
        "transaction_id": duplicate["transaction_id"],
        "message": format!(
            "Duplicate charge of {} flagged. Refund will be processed within 3-5 business days.",
            rupees(amount)
        ),
    }))
}

fn coupon_quote(code: &str, order_total: f64, on: NaiveDate) -> Value {
    let code = code.trim().to_uppercase();
    let Some(promo) = PROMOS.iter().find(|p| p.code == code) else {
        return json!({"valid": false, "message": format!("Coupon code '{}' does not exist.", code)});
    };
    if parse_date(promo.valid_until).is_some_and(|until| until < on) {
        return json!({
            "valid": false,
            "message": format!("Coupon code '{}' expired on {}.", code, promo.valid_until),
        });
    }
    if order_total < promo.min_order {
        return json!({
            "valid": false,
            "message": format!(
                "Order total {} is below the minimum {} for code '{}'.",
                rupees(order_total),
                rupees(promo.min_order),
                code
            ),
        });
    }
    if let Some(tiers) = promo.tiers {
        let tiers: Vec<String> = tiers.iter().map(|t| title(t)).collect();
        return json!({
            "valid": false,
            "members_only": true,
            "message": format!(
                "Code '{}' is for {} members only; validate it against the customer's loyalty account.",
                code,
                tiers.join(" and ")
            ),
        });
    }

    let discount = round_to(order_total * promo.discount_pct as f64 / 100.0, 2);
    let final_total = round_to(order_total - discount, 2);
    json!({
        "valid": true,
        "code": code,
        "discount_pct": promo.discount_pct,
        "discount_amount": discount,
        "original_total": order_total,
        "final_total": final_total,
        "description": promo.description,
        "checked_on": format_date(on),
        "message": format!(
            "Code '{}' valid! {}% off, save {}. Final total: {}.",
            code,
            promo.discount_pct,
            rupees(discount),
            rupees(final_total)
        ),
    })
}

fn check_coupon(input: &Value) -> Result<Value> {
    let code = req_str(input, "code")?;
    let total = req_f64(input, "order_total")?;
    Ok(coupon_quote(code, total, today()))
}

fn get_invoice(conn: &Connection, input: &Value) -> Result<Value> {
    let order_id = req_i64(input, "order_id")?;
    let email = req_str(input, "customer_email")?;
    let Some(order) = query_one(
        conn,
        "SELECT o.total_amount, substr(o.created_at, 1, 10) AS created_at,
                cu.name, cu.email, cu.address, cu.city
         FROM orders o JOIN customers cu ON o.customer_email = cu.email
         WHERE o.id = ?1 AND o.customer_email = ?2",
        params![order_id, email],
    )?
    else {
        return Ok(json!({"found": false, "message": order_not_found(order_id, email)}));
    };

    let items = query_rows(
        conn,
        "SELECT p.name, p.sku, oi.quantity, oi.unit_price, oi.subtotal
         FROM order_items oi JOIN products p ON oi.product_id = p.id
         WHERE oi.order_id = ?1",
        params![order_id],
    )?;
    let payment = query_one(
        conn,
        "SELECT method, transaction_id FROM payments
         WHERE order_id = ?1 AND status = 'completed' ORDER BY payment_date, id LIMIT 1",
        params![order_id],
    )?;

    let (method, transaction) = match &payment {
        Some(p) => (method_label(text(p, "method")), p["transaction_id"].clone()),
        None => ("Unknown".to_string(), Value::Null),
    };
    Ok(json!({
        "found": true,
        "invoice_no": format!("INV-{:05}", order_id),
        "order_id": order_id,
        "customer": order["name"],
        "email": order["email"],
        "address": format!("{}, {}", text(&order, "address"), text(&order, "city")),
        "date": order["created_at"],
        "items": items,
        "total": num(&order, "total_amount"),
        "payment_method": method,
        "transaction_id": transaction,
    }))
}

fn get_transaction_history(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        "SELECT id, order_id, amount, method, status, transaction_id,
                substr(payment_date, 1, 16) AS payment_date
         FROM payments WHERE customer_email = ?1
         ORDER BY payment_date DESC, id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No transactions found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn apply_store_credit(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let order_id = req_i64(input, "order_id")?;
    let credit = req_f64(input, "credit_amount")?;
    let points = credit.floor() as i64;
    if points <= 0 {
        return Ok(refuse("Store credit must be at least ₹1."));
    }
    let Some(row) = query_one(
        conn,
        "SELECT loyalty_points FROM customers WHERE email = ?1",
        params![email],
    )?
    else {
        return Ok(refuse(format!("Customer '{}' not found.", email)));
    };

    let balance = int(&row, "loyalty_points");
    if balance < points {
        return Ok(refuse(format!(
            "Insufficient points. You have {} points ({} credit), need {}.",
            grouped(balance),
            rupees(balance as f64),
            rupees(points as f64)
        )));
    }

    let remaining = balance - points;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE customers SET loyalty_points = ?1 WHERE email = ?2",
        params![remaining, email],
    )?;
    tx.execute(
        "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            email,
            -points,
            format!("Store credit applied to Order #{}", order_id),
            remaining
        ],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "applied",
        "credit_applied": points,
        "points_deducted": points,
        "remaining_points": remaining,
        "message": format!(
            "{} store credit applied to Order #{}. Remaining points: {}.",
            rupees(points as f64),
            order_id,
            grouped(remaining)
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

    fn charged_twice(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT order_id FROM payments WHERE transaction_id = 'TXN-AN-DUP'",
            [],
            |r| r.get(0),
        )
        .unwrap()
    }

    const ANJALI: &str = "anjali.nair@shop.com";

    #[test]
    fn test_duplicate_charge_flow() {
        let conn = seeded(AppKind::Ecommerce);
        let order = charged_twice(&conn);

        let details = run(&conn, "get_payment_details", json!({"order_id": order, "customer_email": ANJALI}));
        assert_eq!(details.as_array().unwrap().len(), 2);
        assert_eq!(details[0]["warning"], "Possible duplicate charge detected!");

        let verdict = run(&conn, "verify_charge", json!({"order_id": order, "customer_email": ANJALI}));
        assert_eq!(verdict["duplicate_detected"], true);
        assert_eq!(verdict["total_charged"], 259998.0);
        assert_eq!(verdict["issues"][1], "Overcharged by ₹129,999.00");

        let flagged = run(&conn, "flag_duplicate_charge", json!({"order_id": order, "customer_email": ANJALI}));
        assert_eq!(flagged["status"], "flagged");
        assert_eq!(flagged["transaction_id"], "TXN-AN-DUP");

        let verdict = run(&conn, "verify_charge", json!({"order_id": order, "customer_email": ANJALI}));
        assert_eq!(verdict["status"], "ok");

        let again = run(&conn, "flag_duplicate_charge", json!({"order_id": order, "customer_email": ANJALI}));
        assert_eq!(again["status"], "error");
    }

    #[test]
    fn test_charge_checks_need_the_owner() {
        let conn = seeded(AppKind::Ecommerce);
        let order = charged_twice(&conn);
        let wrong = run(&conn, "verify_charge", json!({"order_id": order, "customer_email": "aarav.sharma@shop.com"}));
        assert_eq!(wrong["status"], "error");

        let none = run(&conn, "get_payment_details", json!({"order_id": order, "customer_email": "aarav.sharma@shop.com"}));
        assert!(none[0]["message"].as_str().unwrap().starts_with("No payments found"));
    }

    #[test]
    fn test_coupon_rules() {
        let march = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let ok = coupon_quote(" save10 ", 1000.0, march);
        assert_eq!(ok["valid"], true);
        assert_eq!(ok["final_total"], 900.0);

        let below = coupon_quote("WELCOME20", 999.0, march);
        assert_eq!(below["valid"], false);

        let members = coupon_quote("GOLD15", 5000.0, march);
        assert_eq!(members["members_only"], true);

        let july = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let expired = coupon_quote("FLASH50", 8000.0, july);
        assert_eq!(expired["message"], "Coupon code 'FLASH50' expired on 2026-06-30.");
        assert_eq!(coupon_quote("FLASH50", 8000.0, march)["discount_amount"], 4000.0);

        let unknown = coupon_quote("FREE", 100.0, march);
        assert!(unknown["message"].as_str().unwrap().contains("does not exist"));
    }

    #[test]
    fn test_invoice_and_history() {
        let conn = seeded(AppKind::Ecommerce);
        let order: i64 = conn
            .query_row("SELECT order_id FROM payments WHERE transaction_id = 'TXN-AA-001'", [], |r| r.get(0))
            .unwrap();
        let invoice = run(&conn, "get_invoice", json!({"order_id": order, "customer_email": "aarav.sharma@shop.com"}));
        assert_eq!(invoice["invoice_no"], format!("INV-{:05}", order));
        assert_eq!(invoice["payment_method"], "Credit Card");
        assert_eq!(invoice["address"], "12 MG Road, Mumbai");
        assert_eq!(invoice["items"][0]["sku"], "SONY-WH5-BLK");

        let history = run(&conn, "get_transaction_history", json!({"customer_email": ANJALI}));
        assert_eq!(history.as_array().unwrap().len(), 3);
        assert_eq!(history[0]["transaction_id"], "TXN-AN-002");

        let none = run(&conn, "get_transaction_history", json!({"customer_email": "kavya.reddy@shop.com"}));
        assert!(none[0]["message"].as_str().unwrap().contains("No transactions"));
    }

    #[test]
    fn test_store_credit() {
        let conn = seeded(AppKind::Ecommerce);
        let order = charged_twice(&conn);
        let applied = run(
            &conn,
            "apply_store_credit",
            json!({"customer_email": ANJALI, "order_id": order, "credit_amount": 2000}),
        );
        assert_eq!(applied["status"], "applied");
        assert_eq!(applied["remaining_points"], 7800);

        let history: String = conn
            .query_row(
                "SELECT reason FROM loyalty_history WHERE customer_email = ?1 ORDER BY id DESC LIMIT 1",
                params![ANJALI],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(history, format!("Store credit applied to Order #{}", order));

        let short = run(
            &conn,
            "apply_store_credit",
            json!({"customer_email": "rohan.verma@shop.com", "order_id": order, "credit_amount": 500}),
        );
        assert!(short["message"].as_str().unwrap().starts_with("Insufficient points"));
    }
}
