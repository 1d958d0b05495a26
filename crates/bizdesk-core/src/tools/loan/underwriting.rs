//! Underwriting decisions and loan terms

use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{flag, int, num, query_one, round_to, text};
use bizdesk_store::schema::loan::monthly_emi;
use bizdesk_store::time::{format_date, today};

use super::{error, term_months};
use crate::tools::fmt::rupees;
use crate::tools::params::{req_f64, req_i64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const APPLICATION_ID: Param = Param::req("application_id", Kind::Integer, "Loan application id");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "run_underwriting_decision",
        description: "Approve, reject or escalate an application from its KYC, credit score and DTI. Approval creates the loan and its repayment schedule.",
        params: &[APPLICATION_ID],
        handler: Handler::Sql(run_underwriting_decision),
    },
    ToolSpec {
        name: "calculate_loan_terms",
        description: "Preview rate, tenure, EMI and total interest. risk_level: Low, Medium or High.",
        params: &[
            Param::req("principal", Kind::Number, "Loan amount"),
            Param::req("loan_type", Kind::String, "personal, home, education, business or vehicle"),
            Param::req("risk_level", Kind::String, "Low, Medium or High"),
        ],
        handler: Handler::Pure(calculate_loan_terms),
    },
    ToolSpec {
        name: "get_underwriting_decision",
        description: "Latest underwriting decision for an application.",
        params: &[APPLICATION_ID],
        handler: Handler::Sql(get_underwriting_decision),
    },
    ToolSpec {
        name: "escalate_to_human",
        description: "Send an application to a human underwriter.",
        params: &[
            APPLICATION_ID,
            Param::req("reason", Kind::String, "Why it needs manual review"),
        ],
        handler: Handler::Sql(escalate_to_human),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Escalate => "escalate",
        }
    }

    fn application_status(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
            Self::Escalate => "escalated",
        }
    }
}

/// Approved terms for an application
#[derive(Debug, Clone, PartialEq)]
pub struct Terms {
    pub amount: f64,
    pub rate: f64,
    pub months: i64,
    pub emi: f64,
}

/// Rate applied by the automatic underwriter
fn decision_rate(risk: &str, loan_type: &str) -> f64 {
    let secured = matches!(loan_type, "home" | "education");
    match (risk, secured) {
        ("Low", true) => 10.5,
        ("Low", false) => 11.5,
        ("Medium", true) => 13.0,
        ("Medium", false) => 14.0,
        _ => 15.5,
    }
}

/// Rate card used for previews
fn preview_rate(loan_type: &str, risk: &str) -> f64 {
    match (loan_type, risk) {
        ("home", "Low") => 9.5,
        ("home", "Medium") => 10.5,
        ("home", "High") => 12.0,
        ("education", "Low") => 9.0,
        ("education", "Medium") => 10.5,
        ("education", "High") => 13.0,
        ("personal", "Low") => 11.5,
        ("personal", "Medium") => 14.0,
        ("personal", "High") => 16.5,
        ("business", "Low") => 12.0,
        ("business", "Medium") => 14.5,
        ("business", "High") => 17.0,
        ("vehicle", "Low") => 9.5,
        ("vehicle", "Medium") => 11.0,
        ("vehicle", "High") => 13.5,
        _ => 14.0,
    }
}

/// Decide an application from its credit inputs
pub fn decide(
    score: i64,
    risk: &str,
    dti: f64,
    amount: f64,
    income: f64,
    loan_type: &str,
) -> (Decision, Option<Terms>, String) {
    if score < 550 || dti > 65.0 {
        return (
            Decision::Reject,
            None,
            format!("Credit score too low ({}) or DTI too high ({}%).", score, dti),
        );
    }
    if amount > income * 5.0 || risk == "Very High" {
        return (
            Decision::Escalate,
            None,
            format!(
                "High amount ({}) relative to income, or very high risk. Human review needed.",
                rupees(amount)
            ),
        );
    }

    let rate = decision_rate(risk, loan_type);
    let base = if dti < 40.0 { amount } else { amount * 0.8 };
    let approved = (base / 1000.0).round() * 1000.0;
    let months = term_months(loan_type);
    let terms = Terms {
        amount: approved,
        rate,
        months,
        emi: monthly_emi(approved, rate, months),
    };
    (
        Decision::Approve,
        Some(terms),
        format!("Credit score {} ({} risk). DTI {}%. Auto-approved.", score, risk, dti),
    )
}

fn run_underwriting_decision(conn: &Connection, input: &Value) -> Result<Value> {
    let application_id = req_i64(input, "application_id")?;
    let app = query_one(
        conn,
        "SELECT la.applicant_email, la.loan_type, la.amount_requested, a.name, a.annual_income
         FROM loan_applications la JOIN applicants a ON a.email = la.applicant_email
         WHERE la.id = ?1",
        params![application_id],
    )?;
    let Some(app) = app else {
        return Ok(error(format!("Application #{} not found.", application_id)));
    };
    let email = text(&app, "applicant_email");

    let kyc = query_one(
        conn,
        "SELECT kyc_status, fraud_flag FROM kyc_records WHERE applicant_email = ?1",
        params![email],
    )?;
    let blocked = |message: String| json!({"status": "blocked", "message": message});
    match &kyc {
        Some(k) if text(k, "kyc_status") == "approved" => {
            if flag(k, "fraud_flag") {
                return Ok(blocked(
                    "Cannot underwrite: fraud flag set on this application.".to_string(),
                ));
            }
        }
        _ => {
            return Ok(blocked(format!(
                "KYC not approved for '{}'. Complete KYC first.",
                email
            )));
        }
    }

    let credit = query_one(
        conn,
        "SELECT credit_score, risk_level, debt_to_income_pct FROM credit_scores
         WHERE applicant_email = ?1 ORDER BY score_date DESC, id DESC LIMIT 1",
        params![email],
    )?;
    let Some(credit) = credit else {
        return Ok(blocked("No credit score found. Run credit scoring first.".to_string()));
    };

    let loan_type = text(&app, "loan_type");
    let (decision, terms, reason) = decide(
        int(&credit, "credit_score"),
        text(&credit, "risk_level"),
        num(&credit, "debt_to_income_pct"),
        num(&app, "amount_requested"),
        num(&app, "annual_income"),
        loan_type,
    );

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO underwriting_decisions
           (application_id, decision, approved_amount, interest_rate, term_months, monthly_emi, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            application_id,
            decision.as_str(),
            terms.as_ref().map(|t| t.amount),
            terms.as_ref().map(|t| t.rate),
            terms.as_ref().map(|t| t.months),
            terms.as_ref().map(|t| t.emi),
            reason,
        ],
    )?;
    let decision_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE loan_applications SET status = ?1 WHERE id = ?2",
        params![decision.application_status(), application_id],
    )?;

    let mut loan_id = None;
    if let Some(t) = &terms {
        let start = today();
        tx.execute(
            "INSERT INTO loans (application_id, applicant_email, principal, interest_rate, term_months,
                                outstanding_balance, disbursed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?3, ?6)",
            params![application_id, email, t.amount, t.rate, t.months, format_date(start)],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO repayment_schedule (loan_id, installment_no, due_date, amount_due)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for n in 1..=t.months {
                let due = start + Duration::days(30 * n);
                stmt.execute(params![id, n, format_date(due), t.emi])?;
            }
        }
        loan_id = Some(id);
    }
    tx.commit()?;

    let label = match decision {
        Decision::Approve => "APPROVED",
        Decision::Reject => "REJECTED",
        Decision::Escalate => "ESCALATED",
    };
    Ok(json!({
        "decision_id": decision_id,
        "application_id": application_id,
        "decision": label,
        "reason": reason,
        "approved_amount": terms.as_ref().map(|t| t.amount),
        "interest_rate": terms.as_ref().map(|t| t.rate),
        "term_months": terms.as_ref().map(|t| t.months),
        "monthly_emi": terms.as_ref().map(|t| t.emi),
        "loan_id": loan_id,
        "message": format!("{}: {}", label, reason),
    }))
}

fn calculate_loan_terms(input: &Value) -> Result<Value> {
    let principal = req_f64(input, "principal")?;
    let loan_type = req_str(input, "loan_type")?.to_lowercase();
    let risk = req_str(input, "risk_level")?;
    if principal <= 0.0 {
        return Ok(error("principal must be positive."));
    }

    let rate = preview_rate(&loan_type, risk);
    let months = term_months(&loan_type);
    let emi = monthly_emi(principal, rate, months);
    let total = round_to(emi * months as f64, 2);
    Ok(json!({
        "principal": principal,
        "loan_type": loan_type,
        "risk_level": risk,
        "interest_rate_pct": rate,
        "term_months": months,
        "monthly_emi": emi,
        "total_payable": total,
        "total_interest": round_to(total - principal, 2),
    }))
}

fn get_underwriting_decision(conn: &Connection, input: &Value) -> Result<Value> {
    let application_id = req_i64(input, "application_id")?;
    let row = query_one(
        conn,
        "SELECT id, application_id, decision, approved_amount, interest_rate, term_months,
                monthly_emi, reason, substr(decided_at, 1, 16) AS decided_at
         FROM underwriting_decisions WHERE application_id = ?1
         ORDER BY decided_at DESC, id DESC LIMIT 1",
        params![application_id],
    )?;
    match row {
        Some(mut decision) => {
            decision["found"] = json!(true);
            Ok(decision)
        }
        None => Ok(json!({
            "found": false,
            "message": format!("No underwriting decision for application #{}.", application_id),
        })),
    }
}

fn escalate_to_human(conn: &Connection, input: &Value) -> Result<Value> {
    let application_id = req_i64(input, "application_id")?;
    let reason = req_str(input, "reason")?;
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM loan_applications WHERE id = ?1",
            params![application_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(error(format!("Application #{} not found.", application_id)));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE loan_applications SET status = 'escalated' WHERE id = ?1",
        params![application_id],
    )?;
    tx.execute(
        "INSERT INTO underwriting_decisions (application_id, decision, reason) VALUES (?1, 'escalate', ?2)",
        params![application_id, reason],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "escalated",
        "message": format!(
            "Application #{} escalated to human underwriter. Reason: {}",
            application_id, reason
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
    fn test_decide_rules() {
        let (d, terms, _) = decide(540, "Very High", 20.0, 100_000.0, 600_000.0, "personal");
        assert_eq!(d, Decision::Reject);
        assert!(terms.is_none());

        let (d, _, _) = decide(700, "Medium", 30.0, 4_000_000.0, 600_000.0, "home");
        assert_eq!(d, Decision::Escalate);

        // DTI at 40 takes a 20% haircut rounded to the nearest thousand
        let (d, terms, _) = decide(700, "Medium", 40.0, 333_333.0, 900_000.0, "home");
        assert_eq!(d, Decision::Approve);
        let terms = terms.unwrap();
        assert_eq!(terms.amount, 267_000.0);
        assert_eq!(terms.rate, 13.0);
        assert_eq!(terms.months, 180);
    }

    #[test]
    fn test_approval_creates_loan_and_schedule() {
        let conn = seeded(AppKind::Loan);
        // Sneha: KYC approved, 620 Medium, DTI 35
        let out = run(&conn, "run_underwriting_decision", json!({"application_id": 4}));
        assert_eq!(out["decision"], "APPROVED");
        assert_eq!(out["approved_amount"], 150_000.0);
        assert_eq!(out["interest_rate"], 14.0);
        assert_eq!(out["term_months"], 36);

        let loan_id = out["loan_id"].as_i64().unwrap();
        let installments: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM repayment_schedule WHERE loan_id = ?1 AND status = 'pending'",
                [loan_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(installments, 36);

        let latest = run(&conn, "get_underwriting_decision", json!({"application_id": 4}));
        assert_eq!(latest["decision"], "approve");
        assert_eq!(latest["monthly_emi"], out["monthly_emi"]);
    }

    #[test]
    fn test_blocked_and_rejected() {
        let conn = seeded(AppKind::Loan);
        let pending_kyc = run(&conn, "run_underwriting_decision", json!({"application_id": 8}));
        assert_eq!(pending_kyc["status"], "blocked");

        conn.execute(
            "UPDATE credit_scores SET credit_score = 500 WHERE applicant_email = 'sneha.patel@email.com'",
            [],
        )
        .unwrap();
        let rejected = run(&conn, "run_underwriting_decision", json!({"application_id": 4}));
        assert_eq!(rejected["decision"], "REJECTED");
        assert!(rejected["loan_id"].is_null());
        let status: String = conn
            .query_row("SELECT status FROM loan_applications WHERE id = 4", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "rejected");

        let missing = run(&conn, "run_underwriting_decision", json!({"application_id": 404}));
        assert_eq!(missing["message"], "Application #404 not found.");
    }

    #[test]
    fn test_terms_preview_and_escalation() {
        let terms = calculate_loan_terms(&json!({"principal": 120000, "loan_type": "personal", "risk_level": "Low"})).unwrap();
        assert_eq!(terms["interest_rate_pct"], 11.5);
        assert_eq!(terms["term_months"], 36);
        assert!(terms["total_interest"].as_f64().unwrap() > 0.0);

        let conn = seeded(AppKind::Loan);
        let out = run(&conn, "escalate_to_human", json!({"application_id": 8, "reason": "Thin file"}));
        assert_eq!(out["status"], "escalated");
        let latest = run(&conn, "get_underwriting_decision", json!({"application_id": 8}));
        assert_eq!(latest["reason"], "Thin file");
    }
}
