//! Applicant registration and loan applications

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{query_one, query_rows};

use super::{APPLICANT_EMAIL, error};
use crate::tools::fmt::rupees;
use crate::tools::params::{req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub(crate) struct LoanType {
    pub name: &'static str,
    pub description: &'static str,
    pub max_amount: f64,
    pub rate_range: &'static str,
    pub max_term_months: i64,
}

pub(crate) const LOAN_TYPES: &[LoanType] = &[
    LoanType {
        name: "personal",
        description: "Personal Loan",
        max_amount: 1_500_000.0,
        rate_range: "10.5-18%",
        max_term_months: 60,
    },
    LoanType {
        name: "home",
        description: "Home Loan",
        max_amount: 10_000_000.0,
        rate_range: "8.5-11%",
        max_term_months: 240,
    },
    LoanType {
        name: "education",
        description: "Education Loan",
        max_amount: 2_000_000.0,
        rate_range: "9-13%",
        max_term_months: 84,
    },
    LoanType {
        name: "business",
        description: "Business Loan",
        max_amount: 5_000_000.0,
        rate_range: "12-18%",
        max_term_months: 60,
    },
    LoanType {
        name: "vehicle",
        description: "Vehicle Loan",
        max_amount: 2_500_000.0,
        rate_range: "9-13%",
        max_term_months: 84,
    },
];

const APPLICATION_STATUSES: &[&str] = &[
    "submitted",
    "under_review",
    "approved",
    "rejected",
    "escalated",
    "flagged",
];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_loan_types",
        description: "Available loan types with maximum amounts, rate ranges and terms.",
        params: &[],
        handler: Handler::Pure(get_loan_types),
    },
    ToolSpec {
        name: "register_applicant",
        description: "Register a new loan applicant. employment_type: salaried or self_employed.",
        params: &[
            Param::req("name", Kind::String, "Full name"),
            Param::req("email", Kind::String, "Email address"),
            Param::req("age", Kind::Integer, "Age in years (18-70)"),
            Param::req("employment_type", Kind::String, "salaried or self_employed"),
            Param::req("employer", Kind::String, "Employer or business name"),
            Param::req("annual_income", Kind::Number, "Annual income in rupees"),
        ],
        handler: Handler::Sql(register_applicant),
    },
    ToolSpec {
        name: "submit_application",
        description: "Submit a loan application. Requires approved KYC. loan_type: personal, home, education, business or vehicle.",
        params: &[
            APPLICANT_EMAIL,
            Param::req("loan_type", Kind::String, "Loan type"),
            Param::req("amount_requested", Kind::Number, "Requested amount"),
            Param::opt("purpose", Kind::String, "What the loan is for"),
        ],
        handler: Handler::Sql(submit_application),
    },
    ToolSpec {
        name: "get_application_status",
        description: "All loan applications of an applicant with their status.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_application_status),
    },
    ToolSpec {
        name: "get_applicant_profile",
        description: "Registration details of an applicant.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_applicant_profile),
    },
    ToolSpec {
        name: "update_application_status",
        description: "Set an application's status: submitted, under_review, approved, rejected, escalated or flagged.",
        params: &[
            Param::req("application_id", Kind::Integer, "Application id"),
            Param::req("new_status", Kind::String, "New status"),
        ],
        handler: Handler::Sql(update_application_status),
    },
];

pub(crate) fn loan_type(name: &str) -> Option<&'static LoanType> {
    LOAN_TYPES.iter().find(|t| t.name == name)
}

fn type_names() -> String {
    LOAN_TYPES.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
}

fn get_loan_types(_input: &Value) -> Result<Value> {
    let types: Vec<Value> = LOAN_TYPES
        .iter()
        .map(|t| {
            json!({
                "type": t.name,
                "description": t.description,
                "max_amount": t.max_amount,
                "rate_range": t.rate_range,
                "max_term_months": t.max_term_months,
            })
        })
        .collect();
    Ok(Value::Array(types))
}

fn register_applicant(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "name")?;
    let email = req_str(input, "email")?.to_lowercase();
    let age = req_i64(input, "age")?;
    let employment_type = req_str(input, "employment_type")?.to_lowercase();
    let employer = req_str(input, "employer")?;
    let income = req_f64(input, "annual_income")?;

    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, name FROM applicants WHERE email = ?1",
            params![email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((id, existing_name)) = existing {
        return Ok(json!({
            "status": "already_exists",
            "applicant_id": id,
            "message": format!("Applicant '{}' already registered with {}.", existing_name, email),
        }));
    }
    if !(18..=70).contains(&age) {
        return Ok(error("Applicant age must be between 18 and 70."));
    }
    if employment_type != "salaried" && employment_type != "self_employed" {
        return Ok(error("employment_type must be 'salaried' or 'self_employed'."));
    }
    if income < 0.0 {
        return Ok(error("annual_income cannot be negative."));
    }

    conn.execute(
        "INSERT INTO applicants (name, email, age, employment_type, employer, annual_income)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![name, email, age, employment_type, employer, income],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "registered",
        "applicant_id": id,
        "message": format!("Applicant '{}' registered successfully. ID: {}", name, id),
    }))
}

fn submit_application(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "applicant_email")?.to_lowercase();
    let kind = req_str(input, "loan_type")?.to_lowercase();
    let amount = req_f64(input, "amount_requested")?;
    let purpose = str_or(input, "purpose", "");

    let exists: Option<i64> = conn
        .query_row("SELECT id FROM applicants WHERE email = ?1", params![email], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(error(format!(
            "Applicant '{}' not found. Please register first.",
            email
        )));
    }
    let kyc: Option<String> = conn
        .query_row(
            "SELECT kyc_status FROM kyc_records WHERE applicant_email = ?1",
            params![email],
            |r| r.get(0),
        )
        .optional()?;
    if kyc.as_deref() != Some("approved") {
        return Ok(error(format!(
            "KYC not approved for '{}'. Complete KYC and fraud verification before applying for a loan.",
            email
        )));
    }
    if loan_type(&kind).is_none() {
        return Ok(error(format!("Invalid loan_type. Choose from: {}", type_names())));
    }
    if amount <= 0.0 {
        return Ok(error("amount_requested must be positive."));
    }

    conn.execute(
        "INSERT INTO loan_applications (applicant_email, loan_type, amount_requested, purpose)
         VALUES (?1, ?2, ?3, ?4)",
        params![email, kind, amount, purpose],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "submitted",
        "application_id": id,
        "message": format!(
            "Application #{} submitted for {} loan of {}.",
            id,
            kind,
            rupees(amount)
        ),
    }))
}

fn get_application_status(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "applicant_email")?.to_lowercase();
    let rows = query_rows(
        conn,
        "SELECT id, loan_type, amount_requested, purpose, status,
                substr(created_at, 1, 16) AS created_at
         FROM loan_applications WHERE applicant_email = ?1
         ORDER BY created_at DESC, id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No applications found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn get_applicant_profile(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "applicant_email")?.to_lowercase();
    let row = query_one(
        conn,
        "SELECT id, name, email, age, employment_type, employer, annual_income,
                substr(created_at, 1, 16) AS created_at
         FROM applicants WHERE email = ?1",
        params![email],
    )?;
    match row {
        Some(mut profile) => {
            profile["found"] = json!(true);
            Ok(profile)
        }
        None => Ok(json!({
            "found": false,
            "message": format!("Applicant '{}' not found.", email),
        })),
    }
}

fn update_application_status(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "application_id")?;
    let status = req_str(input, "new_status")?.to_lowercase();
    if !APPLICATION_STATUSES.contains(&status.as_str()) {
        return Ok(error(format!(
            "Invalid status. Choose from: {}",
            APPLICATION_STATUSES.join(", ")
        )));
    }
    let updated = conn.execute(
        "UPDATE loan_applications SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    if updated == 0 {
        return Ok(error(format!("Application #{} not found.", id)));
    }
    Ok(json!({
        "status": "updated",
        "message": format!("Application #{} status -> '{}'.", id, status),
    }))
}
