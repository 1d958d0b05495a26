//! Invoices, charge estimates and revenue

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{num, query_rows, round_to};

use super::{PATIENT_EMAIL, error, usd};
use crate::tools::params::{f64_or, opt_i64, req_f64, req_i64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const INVOICE_STATUSES: &[&str] = &["pending", "paid", "cancelled"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_patient_bill",
        description: "All invoices of a patient with line items and totals.",
        params: &[PATIENT_EMAIL],
        handler: Handler::Sql(get_patient_bill),
    },
    ToolSpec {
        name: "generate_invoice",
        description: "Create an invoice from line items [{name, cost}]. Total due is subtotal less insurance, never below zero.",
        params: &[
            PATIENT_EMAIL,
            Param::req("items", Kind::Array, "Line items as [{\"name\", \"cost\"}] or JSON text"),
            Param::opt("insurance_covered", Kind::Number, "Amount covered by insurance"),
            Param::opt("appointment_id", Kind::Integer, "Related appointment"),
        ],
        handler: Handler::Sql(generate_invoice),
    },
    ToolSpec {
        name: "update_invoice_status",
        description: "Set an invoice's status: pending, paid or cancelled.",
        params: &[
            Param::req("invoice_id", Kind::Integer, "Invoice id"),
            Param::req("status", Kind::String, "New status"),
        ],
        handler: Handler::Sql(update_invoice_status),
    },
    ToolSpec {
        name: "calculate_charges",
        description: "Estimate charges from a consultation fee plus procedures and lab tests [{name, cost}].",
        params: &[
            Param::req("consultation_fee", Kind::Number, "Consultation fee"),
            Param::opt("procedures", Kind::Array, "Procedures as [{\"name\", \"cost\"}]"),
            Param::opt("lab_tests", Kind::Array, "Lab tests as [{\"name\", \"cost\"}]"),
        ],
        handler: Handler::Pure(calculate_charges),
    },
    ToolSpec {
        name: "get_pending_invoices",
        description: "Unpaid invoices across all patients, largest first.",
        params: &[],
        handler: Handler::Sql(get_pending_invoices),
    },
    ToolSpec {
        name: "get_revenue_summary",
        description: "Total billed, collected and outstanding amounts.",
        params: &[],
        handler: Handler::Sql(get_revenue_summary),
    },
];

#[derive(Debug, Clone, PartialEq)]
struct LineItem {
    name: String,
    cost: f64,
}

/// Line items from an array or its JSON text; absent means none
fn line_items(input: &Value, key: &str) -> Result<Vec<LineItem>> {
    let parsed;
    let raw = match input.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => {
            parsed = serde_json::from_str::<Value>(s)
                .map_err(|_| anyhow!("Invalid '{}' parameter: expected a JSON list of items", key))?;
            &parsed
        }
        Some(v) => v,
    };
    let Value::Array(items) = raw else {
        return Err(anyhow!("Invalid '{}' parameter: expected a list of items", key));
    };
    items
        .iter()
        .map(|item| {
            let name = item["name"].as_str().unwrap_or("Item").to_string();
            let cost = match &item["cost"] {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| anyhow!("Item '{}' has no numeric cost", name))?;
            Ok(LineItem { name, cost })
        })
        .collect()
}

fn total(items: &[LineItem]) -> f64 {
    round_to(items.iter().map(|i| i.cost).sum(), 2)
}

fn get_patient_bill(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let mut rows = query_rows(
        conn,
        "SELECT id AS invoice_id, appointment_id, items, subtotal, insurance_covered,
                total_due, status, substr(created_at, 1, 10) AS issued_on
         FROM invoices WHERE patient_email = ?1 ORDER BY created_at DESC, id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!({"found": false, "message": format!("No invoices found for '{}'.", email)}));
    }
    let outstanding: f64 = rows
        .iter()
        .filter(|r| r["status"] == "pending")
        .map(|r| num(r, "total_due"))
        .sum();
    for row in &mut rows {
        let items = row["items"]
            .as_str()
            .and_then(|s| serde_json::from_str::<Value>(s).ok());
        if let Some(items) = items {
            row["items"] = items;
        }
    }
    Ok(json!({
        "found": true,
        "patient_email": email,
        "invoices": rows,
        "outstanding": usd(outstanding),
    }))
}

fn generate_invoice(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let items = line_items(input, "items")?;
    let insurance = f64_or(input, "insurance_covered", 0.0)?;
    let appointment = opt_i64(input, "appointment_id")?;

    let registered: Option<i64> = conn
        .query_row("SELECT id FROM patients WHERE email = ?1", params![email], |r| r.get(0))
        .optional()?;
    if registered.is_none() {
        return Ok(error(format!("Patient '{}' not found.", email)));
    }
    if items.is_empty() {
        return Ok(error("An invoice needs at least one line item."));
    }
    if items.iter().any(|i| i.cost < 0.0) || insurance < 0.0 {
        return Ok(error("Costs and insurance cannot be negative."));
    }
    if let Some(id) = appointment {
        let owner: Option<String> = conn
            .query_row(
                "SELECT patient_email FROM appointments WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        if owner.as_deref() != Some(email.as_str()) {
            return Ok(error(format!("Appointment #{} does not belong to {}.", id, email)));
        }
    }

    let subtotal = total(&items);
    let due = round_to((subtotal - insurance).max(0.0), 2);
    let stored: Vec<Value> = items
        .iter()
        .map(|i| json!({"name": i.name, "cost": i.cost}))
        .collect();
    conn.execute(
        "INSERT INTO invoices (patient_email, appointment_id, items, subtotal, insurance_covered, total_due)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            email,
            appointment,
            Value::Array(stored).to_string(),
            subtotal,
            insurance,
            due
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "created",
        "invoice_id": id,
        "subtotal": subtotal,
        "insurance_covered": insurance,
        "total_due": due,
        "message": format!("Invoice #{} issued to {}: {} due.", id, email, usd(due)),
    }))
}

fn update_invoice_status(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "invoice_id")?;
    let status = req_str(input, "status")?.to_lowercase();
    if !INVOICE_STATUSES.contains(&status.as_str()) {
        return Ok(error(format!(
            "Invalid status. Choose from: {}",
            INVOICE_STATUSES.join(", ")
        )));
    }
    let updated = conn.execute(
        "UPDATE invoices SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    if updated == 0 {
        return Ok(error(format!("Invoice #{} not found.", id)));
    }
    Ok(json!({
        "status": "updated",
        "message": format!("Invoice #{} marked {}.", id, status),
    }))
}

fn calculate_charges(input: &Value) -> Result<Value> {
    let consultation = req_f64(input, "consultation_fee")?;
    let procedures = line_items(input, "procedures")?;
    let labs = line_items(input, "lab_tests")?;

    let procedure_total = total(&procedures);
    let lab_total = total(&labs);
    let grand = round_to(consultation + procedure_total + lab_total, 2);
    Ok(json!({
        "consultation_fee": consultation,
        "procedures_total": procedure_total,
        "lab_tests_total": lab_total,
        "total": grand,
        "formatted_total": usd(grand),
    }))
}

fn get_pending_invoices(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT i.id AS invoice_id, i.patient_email, p.name AS patient, i.total_due,
                substr(i.created_at, 1, 10) AS issued_on
         FROM invoices i LEFT JOIN patients p ON p.email = i.patient_email
         WHERE i.status = 'pending'
         ORDER BY i.total_due DESC, i.id",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No pending invoices."}]));
    }
    Ok(Value::Array(rows))
}

fn get_revenue_summary(conn: &Connection, _input: &Value) -> Result<Value> {
    let (billed, collected, outstanding, count): (f64, f64, f64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN status != 'cancelled' THEN total_due END), 0),
                COALESCE(SUM(CASE WHEN status = 'paid' THEN total_due END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN total_due END), 0),
                COUNT(*)
         FROM invoices",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )?;
    Ok(json!({
        "invoices": count,
        "total_billed": round_to(billed, 2),
        "total_collected": round_to(collected, 2),
        "outstanding": round_to(outstanding, 2),
        "summary": format!(
            "Billed {}, collected {}, outstanding {}.",
            usd(billed),
            usd(collected),
            usd(outstanding)
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

    #[test]
    fn test_line_items_accept_text_or_array() {
        let from_text = line_items(&json!({"items": r#"[{"name":"X-ray","cost":"80"}]"#}), "items").unwrap();
        let from_array = line_items(&json!({"items": [{"name": "X-ray", "cost": 80}]}), "items").unwrap();
        assert_eq!(from_text, from_array);
        assert!(line_items(&json!({"items": [{"name": "X-ray"}]}), "items").is_err());
        assert!(line_items(&json!({}), "items").unwrap().is_empty());
    }

    #[test]
    fn test_charges() {
        let est = calculate_charges(&json!({
            "consultation_fee": 150,
            "procedures": [{"name": "Dressing", "cost": 40.5}],
            "lab_tests": "[{\"name\": \"CBC\", \"cost\": 25}]",
        }))
        .unwrap();
        assert_eq!(est["total"], 215.5);
        assert_eq!(est["formatted_total"], "$215.50");
    }

    #[test]
    fn test_invoice_floor_and_summary() {
        let conn = seeded(AppKind::Hospital);
        let summary = run(&conn, "get_revenue_summary", json!({}));
        assert_eq!(summary["total_billed"], 495.0);
        assert_eq!(summary["total_collected"], 170.0);
        assert_eq!(summary["outstanding"], 325.0);

        let covered = run(
            &conn,
            "generate_invoice",
            json!({"patient_email": "emma.wilson@mail.com", "items": [{"name": "Consultation", "cost": 120}],
                   "insurance_covered": 300, "appointment_id": 1}),
        );
        assert_eq!(covered["total_due"], 0.0);

        let wrong_owner = run(
            &conn,
            "generate_invoice",
            json!({"patient_email": "emma.wilson@mail.com", "items": [{"name": "ECG", "cost": 100}],
                   "appointment_id": 2}),
        );
        assert_eq!(wrong_owner["status"], "error");

        let bill = run(&conn, "get_patient_bill", json!({"patient_email": "liam.brown@mail.com"}));
        assert_eq!(bill["invoices"][0]["items"][1]["name"], "ECG");
        assert_eq!(bill["outstanding"], "$300.00");

        let pending = run(&conn, "get_pending_invoices", json!({}));
        assert_eq!(pending[0]["patient"], "Liam Brown");
    }

    #[test]
    fn test_status_updates() {
        let conn = seeded(AppKind::Hospital);
        let bad = run(&conn, "update_invoice_status", json!({"invoice_id": 2, "status": "refunded"}));
        assert_eq!(bad["status"], "error");

        let paid = run(&conn, "update_invoice_status", json!({"invoice_id": 2, "status": "Paid"}));
        assert_eq!(paid["status"], "updated");

        let summary = run(&conn, "get_revenue_summary", json!({}));
        assert_eq!(summary["total_collected"], 470.0);
        assert_eq!(summary["outstanding"], 25.0);
    }
}
