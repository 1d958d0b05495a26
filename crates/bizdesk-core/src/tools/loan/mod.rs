//! Loan processing tool servers

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::round_to;

use super::{Kind, Param, ToolServer};

pub mod application;
pub mod credit;
pub mod kyc;
pub mod repayment;
pub mod underwriting;

pub static APPLICATION_SERVER: ToolServer = ToolServer {
    name: "ApplicationServer",
    tools: application::TOOLS,
};

pub static KYC_SERVER: ToolServer = ToolServer {
    name: "KYCServer",
    tools: kyc::TOOLS,
};

pub static CREDIT_RISK_SERVER: ToolServer = ToolServer {
    name: "CreditRiskServer",
    tools: credit::TOOLS,
};

pub static UNDERWRITING_SERVER: ToolServer = ToolServer {
    name: "UnderwritingServer",
    tools: underwriting::TOOLS,
};

pub static REPAYMENT_SERVER: ToolServer = ToolServer {
    name: "RepaymentServer",
    tools: repayment::TOOLS,
};

const APPLICANT_EMAIL: Param = Param::req("applicant_email", Kind::String, "Applicant email");

const LOAN_ID: Param = Param::req("loan_id", Kind::Integer, "Loan id");

fn error(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn applicant_missing(email: &str) -> Value {
    error(format!("Applicant '{}' not found.", email))
}

/// Outstanding balance over the applicant's active loans
fn active_debt(conn: &Connection, email: &str) -> Result<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(outstanding_balance), 0) FROM loans
         WHERE applicant_email = ?1 AND status = 'active'",
        params![email],
        |r| r.get(0),
    )?)
}

fn missed_installments(conn: &Connection, email: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM repayment_schedule s JOIN loans l ON l.id = s.loan_id
         WHERE l.applicant_email = ?1 AND s.status = 'missed'",
        params![email],
        |r| r.get(0),
    )?)
}

/// Debt-to-income as a percentage of monthly income, 2 dp.
///
/// Outstanding debt is spread over twelve months the same way income is.
fn dti_pct(annual_income: f64, debt: f64) -> f64 {
    let monthly_income = annual_income / 12.0;
    if monthly_income <= 0.0 {
        return 0.0;
    }
    round_to(debt / 12.0 / monthly_income * 100.0, 2)
}

/// Tenure in months by loan type
fn term_months(loan_type: &str) -> i64 {
    match loan_type {
        "home" => 180,
        "education" => 72,
        "business" | "vehicle" => 60,
        _ => 36,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dti() {
        assert_eq!(dti_pct(720_000.0, 462_000.0), 64.17);
        assert_eq!(dti_pct(0.0, 1000.0), 0.0);
        assert_eq!(dti_pct(600_000.0, 0.0), 0.0);
    }

    #[test]
    fn test_terms() {
        assert_eq!(term_months("home"), 180);
        assert_eq!(term_months("vehicle"), 60);
        assert_eq!(term_months("gold"), 36);
    }
}
