//! Loan servicing: schedules, payments, missed installments and restructuring

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, round_to, text};

use super::{APPLICANT_EMAIL, LOAN_ID, active_debt, applicant_missing, dti_pct, error, missed_installments};
use crate::tools::fmt::inr;
use crate::tools::params::{i64_or, req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const PAYMENT_METHODS: &[&str] = &["bank_transfer", "upi", "net_banking", "cheque", "auto_debit"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_loan_status",
        description: "Outstanding balance, installment counts and next due date for a loan.",
        params: &[LOAN_ID],
        handler: Handler::Sql(get_loan_status),
    },
    ToolSpec {
        name: "get_repayment_schedule",
        description: "Full EMI schedule of a loan with per-installment status.",
        params: &[LOAN_ID],
        handler: Handler::Sql(get_repayment_schedule),
    },
    ToolSpec {
        name: "record_payment",
        description: "Record a payment against the next unpaid installment of the borrower's loan.",
        params: &[
            LOAN_ID,
            APPLICANT_EMAIL,
            Param::req("amount", Kind::Number, "Amount paid"),
            Param::opt("method", Kind::String, "bank_transfer, upi, net_banking, cheque or auto_debit"),
        ],
        handler: Handler::Sql(record_payment),
    },
    ToolSpec {
        name: "get_payment_history",
        description: "Payments made by an applicant, newest first.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_payment_history),
    },
    ToolSpec {
        name: "flag_missed_payment",
        description: "Mark an installment as missed.",
        params: &[
            LOAN_ID,
            Param::req("installment_no", Kind::Integer, "Installment number"),
        ],
        handler: Handler::Sql(flag_missed_payment),
    },
    ToolSpec {
        name: "assess_default_risk",
        description: "Default risk from missed installments, DTI and credit score, with suggested interventions.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(assess_default_risk),
    },
    ToolSpec {
        name: "restructure_loan",
        description: "Defer the remaining installments of a loan by some months. Missed installments become pending again.",
        params: &[
            LOAN_ID,
            Param::opt("defer_months", Kind::Integer, "Months to defer (default 2)"),
        ],
        handler: Handler::Sql(restructure_loan),
    },
];

fn loan_missing(loan_id: i64) -> Value {
    error(format!("Loan #{} not found.", loan_id))
}

fn get_loan_status(conn: &Connection, input: &Value) -> Result<Value> {
    let loan_id = req_i64(input, "loan_id")?;
    let loan = query_one(
        conn,
        "SELECT l.id AS loan_id, l.applicant_email, a.name, l.principal, l.interest_rate, l.term_months,
                l.outstanding_balance, l.status, l.disbursed_at,
                SUM(CASE WHEN s.status = 'paid' THEN 1 ELSE 0 END) AS paid_installments,
                SUM(CASE WHEN s.status = 'pending' THEN 1 ELSE 0 END) AS pending_installments,
                SUM(CASE WHEN s.status = 'missed' THEN 1 ELSE 0 END) AS missed_installments,
                MIN(CASE WHEN s.status IN ('pending', 'missed') THEN s.due_date END) AS next_due_date
         FROM loans l
         LEFT JOIN applicants a ON a.email = l.applicant_email
         LEFT JOIN repayment_schedule s ON s.loan_id = l.id
         WHERE l.id = ?1
         GROUP BY l.id",
        params![loan_id],
    )?;
    Ok(loan.unwrap_or_else(|| loan_missing(loan_id)))
}

fn get_repayment_schedule(conn: &Connection, input: &Value) -> Result<Value> {
    let loan_id = req_i64(input, "loan_id")?;
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM loans WHERE id = ?1", params![loan_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(loan_missing(loan_id));
    }
    let rows = query_rows(
        conn,
        "SELECT installment_no, due_date, amount_due, amount_paid, status
         FROM repayment_schedule WHERE loan_id = ?1 ORDER BY installment_no",
        params![loan_id],
    )?;
    Ok(json!({"loan_id": loan_id, "installments": rows}))
}

fn record_payment(conn: &Connection, input: &Value) -> Result<Value> {
    let loan_id = req_i64(input, "loan_id")?;
    let email = req_str(input, "applicant_email")?;
    let amount = req_f64(input, "amount")?;
    let method = str_or(input, "method", "bank_transfer");
    if amount <= 0.0 {
        return Ok(error("Payment amount must be positive."));
    }
    if !PAYMENT_METHODS.contains(&method) {
        return Ok(error(format!(
            "Invalid method '{}'. Use one of: {}",
            method,
            PAYMENT_METHODS.join(", ")
        )));
    }

    let Some(loan) = query_one(
        conn,
        "SELECT applicant_email, outstanding_balance, status FROM loans WHERE id = ?1",
        params![loan_id],
    )?
    else {
        return Ok(loan_missing(loan_id));
    };
    if text(&loan, "applicant_email") != email {
        return Ok(error(format!("Loan #{} does not belong to '{}'.", loan_id, email)));
    }
    if text(&loan, "status") == "closed" {
        return Ok(error(format!("Loan #{} is already closed.", loan_id)));
    }

    let installment = query_one(
        conn,
        "SELECT id, installment_no FROM repayment_schedule
         WHERE loan_id = ?1 AND status IN ('pending', 'missed', 'overdue')
         ORDER BY installment_no LIMIT 1",
        params![loan_id],
    )?;

    let balance = round_to((num(&loan, "outstanding_balance") - amount).max(0.0), 2);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO payments (loan_id, applicant_email, amount_paid, method) VALUES (?1, ?2, ?3, ?4)",
        params![loan_id, email, amount, method],
    )?;
    if let Some(inst) = &installment {
        tx.execute(
            "UPDATE repayment_schedule SET amount_paid = ?1, status = 'paid' WHERE id = ?2",
            params![amount, int(inst, "id")],
        )?;
    }
    let status = if balance == 0.0 { "closed" } else { "active" };
    tx.execute(
        "UPDATE loans SET outstanding_balance = ?1, status = ?2 WHERE id = ?3",
        params![balance, status, loan_id],
    )?;
    tx.commit()?;

    let installment_no = installment.as_ref().map(|i| int(i, "installment_no"));
    let mut message = format!(
        "Payment of {} recorded for loan #{}. Outstanding: {}.",
        inr(amount),
        loan_id,
        inr(balance)
    );
    if status == "closed" {
        message.push_str(" Loan closed.");
    }
    Ok(json!({
        "status": "recorded",
        "loan_id": loan_id,
        "installment_no": installment_no,
        "amount_paid": amount,
        "outstanding_balance": balance,
        "loan_status": status,
        "message": message,
    }))
}

fn get_payment_history(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "applicant_email")?;
    let rows = query_rows(
        conn,
        "SELECT id, loan_id, amount_paid, substr(payment_date, 1, 10) AS payment_date, method, notes
         FROM payments WHERE applicant_email = ?1 ORDER BY payment_date DESC, id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No payments found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn flag_missed_payment(conn: &Connection, input: &Value) -> Result<Value> {
    let loan_id = req_i64(input, "loan_id")?;
    let installment_no = req_i64(input, "installment_no")?;
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM repayment_schedule WHERE loan_id = ?1 AND installment_no = ?2",
            params![loan_id, installment_no],
            |r| r.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(error(format!(
            "Installment #{} not found for loan #{}.",
            installment_no, loan_id
        )));
    };
    if current == "paid" {
        return Ok(error(format!(
            "Installment #{} is already paid.",
            installment_no
        )));
    }

    conn.execute(
        "UPDATE repayment_schedule SET status = 'missed' WHERE loan_id = ?1 AND installment_no = ?2",
        params![loan_id, installment_no],
    )?;
    Ok(json!({
        "status": "flagged",
        "loan_id": loan_id,
        "installment_no": installment_no,
        "message": format!("Installment #{} of loan #{} marked as missed.", installment_no, loan_id),
    }))
}

/// Points-based default risk. Missing credit data falls back to a 600 score and 30% DTI.
pub fn default_risk(missed: i64, dti: f64, score: i64) -> (i64, &'static str) {
    let mut points = 0;
    points += match missed {
        m if m >= 3 => 3,
        m if m >= 1 => 2,
        _ => 0,
    };
    if dti > 60.0 {
        points += 2;
    } else if dti > 40.0 {
        points += 1;
    }
    if score < 580 {
        points += 2;
    } else if score < 650 {
        points += 1;
    }
    let level = match points {
        p if p >= 4 => "High",
        p if p >= 2 => "Medium",
        _ => "Low",
    };
    (points, level)
}

fn assess_default_risk(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "applicant_email")?;
    let income: Option<f64> = conn
        .query_row(
            "SELECT annual_income FROM applicants WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )
        .optional()?;
    let Some(income) = income else {
        return Ok(applicant_missing(email));
    };

    let missed = missed_installments(conn, email)?;
    let credit = query_one(
        conn,
        "SELECT credit_score, debt_to_income_pct FROM credit_scores
         WHERE applicant_email = ?1 ORDER BY score_date DESC, id DESC LIMIT 1",
        params![email],
    )?;
    let (score, dti) = match &credit {
        Some(c) => (int(c, "credit_score"), num(c, "debt_to_income_pct")),
        None => (600, 30.0),
    };
    let (points, level) = default_risk(missed, dti, score);

    let mut interventions = Vec::new();
    if missed > 0 {
        interventions.push("Contact borrower about missed installments");
    }
    if dti > 40.0 {
        interventions.push("Offer restructuring to reduce EMI burden");
    }
    if level == "High" {
        interventions.push("Assign to collections team for close monitoring");
    }
    if interventions.is_empty() {
        interventions.push("No action needed");
    }

    Ok(json!({
        "applicant_email": email,
        "default_risk": level,
        "risk_points": points,
        "missed_installments": missed,
        "credit_score": score,
        "debt_to_income_pct": dti,
        "current_dti_pct": dti_pct(income, active_debt(conn, email)?),
        "interventions": interventions,
    }))
}

fn restructure_loan(conn: &Connection, input: &Value) -> Result<Value> {
    let loan_id = req_i64(input, "loan_id")?;
    let defer = i64_or(input, "defer_months", 2)?;
    if !(1..=12).contains(&defer) {
        return Ok(error("defer_months must be between 1 and 12."));
    }
    let status: Option<String> = conn
        .query_row("SELECT status FROM loans WHERE id = ?1", params![loan_id], |r| r.get(0))
        .optional()?;
    match status.as_deref() {
        None => return Ok(loan_missing(loan_id)),
        Some("closed") => return Ok(error(format!("Loan #{} is already closed.", loan_id))),
        Some(_) => {}
    }

    let modifier = format!("+{} months", defer);
    let moved = conn.execute(
        "UPDATE repayment_schedule
         SET due_date = date(due_date, ?1),
             status = CASE WHEN status = 'missed' THEN 'pending' ELSE status END
         WHERE loan_id = ?2 AND status IN ('pending', 'missed', 'overdue')",
        params![modifier, loan_id],
    )?;
    Ok(json!({
        "status": "restructured",
        "loan_id": loan_id,
        "installments_deferred": moved,
        "defer_months": defer,
        "message": format!(
            "Loan #{} restructured: {} installments deferred by {} months.",
            loan_id, moved, defer
        ),
    }))
}
