//! KYC checks and fraud flags
//!
//! Identity, document, employment, AML and sanctions checks run against
//! fixed watchlists. Each check creates the applicant's KYC record on first
//! use and flips its own column; `approve_kyc` needs the first four set and
//! no fraud flag.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{flag, query_one, text};

use super::{APPLICANT_EMAIL, applicant_missing, error};
use crate::tools::params::req_str;
use crate::tools::{Handler, Kind, Param, ToolSpec};

/// Emails on the simulated sanctions / AML watchlist
const WATCHLIST: &[&str] = &[
    "john.doe.sanctions@test.com",
    "blacklisted@fraud.com",
    "fraud.test@email.com",
];

/// Employer name fragments treated as unverifiable
const HIGH_RISK_EMPLOYERS: &[&str] = &["unknown corp", "shell co", "offshore ltd"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_kyc_status",
        description: "Current KYC verification flags and status for an applicant.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_kyc_status),
    },
    ToolSpec {
        name: "verify_identity",
        description: "Verify the applicant's identity against government records.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(verify_identity),
    },
    ToolSpec {
        name: "check_document_authenticity",
        description: "Check submitted ID, income and address documents for tampering.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(check_document_authenticity),
    },
    ToolSpec {
        name: "verify_employment",
        description: "Verify employer and stated income.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(verify_employment),
    },
    ToolSpec {
        name: "run_aml_check",
        description: "Anti-money-laundering screen for suspicious patterns.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(run_aml_check),
    },
    ToolSpec {
        name: "screen_sanctions",
        description: "Screen the applicant against OFAC, UN and EU sanctions lists.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(screen_sanctions),
    },
    ToolSpec {
        name: "flag_fraud_risk",
        description: "Manually flag an applicant for fraud review. Open applications become flagged.",
        params: &[
            APPLICANT_EMAIL,
            Param::req("reason", Kind::String, "Why the applicant is flagged"),
        ],
        handler: Handler::Sql(flag_fraud_risk),
    },
    ToolSpec {
        name: "approve_kyc",
        description: "Approve KYC once identity, documents, employment and AML checks pass.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(approve_kyc),
    },
];

struct Applicant {
    name: String,
    employer: String,
    employment_type: String,
    annual_income: f64,
}

impl Applicant {
    fn employer_suspicious(&self) -> bool {
        let employer = self.employer.to_lowercase();
        HIGH_RISK_EMPLOYERS.iter().any(|w| employer.contains(w))
    }
}

fn email_of(input: &Value) -> Result<String> {
    Ok(req_str(input, "applicant_email")?.to_lowercase())
}

fn on_watchlist(email: &str) -> bool {
    WATCHLIST.contains(&email)
}

/// Look up the applicant and make sure a KYC row exists for them
fn prepare(conn: &Connection, email: &str) -> Result<Option<Applicant>> {
    let applicant = conn
        .query_row(
            "SELECT name, COALESCE(employer, ''), employment_type, annual_income
             FROM applicants WHERE email = ?1",
            params![email],
            |r| {
                Ok(Applicant {
                    name: r.get(0)?,
                    employer: r.get(1)?,
                    employment_type: r.get(2)?,
                    annual_income: r.get(3)?,
                })
            },
        )
        .optional()?;
    if applicant.is_some() {
        conn.execute(
            "INSERT OR IGNORE INTO kyc_records (applicant_email) VALUES (?1)",
            params![email],
        )?;
    }
    Ok(applicant)
}

#[derive(Clone, Copy)]
enum Check {
    Identity,
    Documents,
    Employment,
    Aml,
    Sanctions,
}

impl Check {
    fn column(self) -> &'static str {
        match self {
            Check::Identity => "identity_verified",
            Check::Documents => "doc_verified",
            Check::Employment => "employment_verified",
            Check::Aml => "aml_passed",
            Check::Sanctions => "sanctions_clear",
        }
    }
}

fn set_check(conn: &Connection, email: &str, check: Check, value: bool) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE kyc_records SET {} = ?1 WHERE applicant_email = ?2",
            check.column()
        ),
        params![value, email],
    )?;
    Ok(())
}

fn raise_fraud_flag(conn: &Connection, email: &str, reason: &str) -> Result<()> {
    conn.execute(
        "UPDATE kyc_records SET fraud_flag = 1, fraud_reason = ?1 WHERE applicant_email = ?2",
        params![reason, email],
    )?;
    Ok(())
}

fn get_kyc_status(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let row = query_one(
        conn,
        "SELECT applicant_email, identity_verified, doc_verified, employment_verified,
                aml_passed, sanctions_clear, fraud_flag, fraud_reason, kyc_status,
                substr(verified_at, 1, 16) AS verified_at
         FROM kyc_records WHERE applicant_email = ?1",
        params![email],
    )?;
    let Some(mut record) = row else {
        return Ok(json!({
            "found": false,
            "kyc_status": "not_started",
            "message": format!("No KYC record for '{}'. Run verification first.", email),
        }));
    };
    for key in [
        "identity_verified",
        "doc_verified",
        "employment_verified",
        "aml_passed",
        "sanctions_clear",
        "fraud_flag",
    ] {
        record[key] = json!(flag(&record, key));
    }
    record["found"] = json!(true);
    Ok(record)
}

fn verify_identity(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(json!({"verified": false, "message": format!("Applicant '{}' not found.", email)}));
    };
    set_check(conn, &email, Check::Identity, true)?;
    Ok(json!({
        "verified": true,
        "applicant": applicant.name,
        "message": format!("Identity verified for {}. Government records match.", applicant.name),
    }))
}

fn check_document_authenticity(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(json!({"authentic": false, "message": format!("Applicant '{}' not found.", email)}));
    };

    if on_watchlist(&email) || applicant.employer_suspicious() {
        let tx = conn.unchecked_transaction()?;
        set_check(&tx, &email, Check::Documents, false)?;
        raise_fraud_flag(
            &tx,
            &email,
            "Document metadata mismatch. Font inconsistency detected. Possible AI-generated document.",
        )?;
        tx.commit()?;
        return Ok(json!({
            "authentic": false,
            "fraud_detected": true,
            "findings": ["Metadata date mismatch", "Font inconsistency", "Possible AI-generated content"],
            "message": "Document authenticity FAILED. Fraud flag raised.",
        }));
    }

    set_check(conn, &email, Check::Documents, true)?;
    Ok(json!({
        "authentic": true,
        "fraud_detected": false,
        "findings": ["Metadata valid", "Font consistent", "Document template verified"],
        "message": "All documents verified as authentic.",
    }))
}

fn verify_employment(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(json!({"verified": false, "message": format!("Applicant '{}' not found.", email)}));
    };

    if applicant.employer_suspicious() {
        set_check(conn, &email, Check::Employment, false)?;
        return Ok(json!({
            "verified": false,
            "message": format!(
                "Employer '{}' not found in verified employer database.",
                applicant.employer
            ),
        }));
    }
    set_check(conn, &email, Check::Employment, true)?;
    Ok(json!({
        "verified": true,
        "employer": applicant.employer,
        "employment_type": applicant.employment_type,
        "annual_income_verified": applicant.annual_income,
        "message": format!(
            "Employment verified. {} confirmed at {}.",
            applicant.name, applicant.employer
        ),
    }))
}

fn run_aml_check(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(json!({"passed": false, "message": format!("Applicant '{}' not found.", email)}));
    };

    if on_watchlist(&email) {
        let tx = conn.unchecked_transaction()?;
        set_check(&tx, &email, Check::Aml, false)?;
        raise_fraud_flag(&tx, &email, "AML screening: suspicious transaction pattern detected.")?;
        tx.commit()?;
        return Ok(json!({
            "passed": false,
            "alerts": ["Suspicious transaction pattern", "Linked to flagged network"],
            "message": "AML check FAILED. Application flagged for compliance review.",
        }));
    }
    set_check(conn, &email, Check::Aml, true)?;
    Ok(json!({
        "passed": true,
        "alerts": [],
        "message": format!("AML check passed for {}. No suspicious activity found.", applicant.name),
    }))
}

fn screen_sanctions(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(json!({"clear": false, "message": format!("Applicant '{}' not found.", email)}));
    };

    let listed = on_watchlist(&email);
    set_check(conn, &email, Check::Sanctions, !listed)?;
    if listed {
        return Ok(json!({
            "clear": false,
            "lists_matched": ["OFAC SDN List"],
            "message": "Sanctions match found. Application must be blocked immediately.",
        }));
    }
    Ok(json!({
        "clear": true,
        "lists_checked": ["OFAC", "UN Consolidated", "EU Sanctions"],
        "message": format!("{} cleared on all sanctions lists.", applicant.name),
    }))
}

fn flag_fraud_risk(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let reason = req_str(input, "reason")?;
    let Some(applicant) = prepare(conn, &email)? else {
        return Ok(applicant_missing(&email));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE kyc_records SET fraud_flag = 1, fraud_reason = ?1, kyc_status = 'flagged'
         WHERE applicant_email = ?2",
        params![reason, email],
    )?;
    let flagged = tx.execute(
        "UPDATE loan_applications SET status = 'flagged'
         WHERE applicant_email = ?1 AND status NOT IN ('approved', 'rejected')",
        params![email],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "flagged",
        "applicant": applicant.name,
        "applications_flagged": flagged,
        "message": format!(
            "Application for {} flagged for fraud review. Reason: {}",
            applicant.name, reason
        ),
    }))
}

fn approve_kyc(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let name: Option<String> = conn
        .query_row("SELECT name FROM applicants WHERE email = ?1", params![email], |r| r.get(0))
        .optional()?;
    let Some(name) = name else {
        return Ok(applicant_missing(&email));
    };
    let kyc = query_one(
        conn,
        "SELECT identity_verified, doc_verified, employment_verified, aml_passed, fraud_flag, fraud_reason
         FROM kyc_records WHERE applicant_email = ?1",
        params![email],
    )?;
    let Some(kyc) = kyc else {
        return Ok(error("No KYC record found. Run verification checks first."));
    };
    if flag(&kyc, "fraud_flag") {
        return Ok(json!({
            "status": "error",
            "fraud_reason": text(&kyc, "fraud_reason"),
            "message": "Cannot approve KYC: fraud flag is set.",
        }));
    }

    let missing: Vec<&str> = [
        ("Identity", "identity_verified"),
        ("Documents", "doc_verified"),
        ("Employment", "employment_verified"),
        ("AML", "aml_passed"),
    ]
    .into_iter()
    .filter(|(_, column)| !flag(&kyc, column))
    .map(|(label, _)| label)
    .collect();
    if !missing.is_empty() {
        return Ok(json!({
            "status": "incomplete",
            "missing_checks": missing,
            "message": format!("Cannot approve. Pending checks: {}", missing.join(", ")),
        }));
    }

    conn.execute(
        "UPDATE kyc_records SET kyc_status = 'approved', verified_at = CURRENT_TIMESTAMP
         WHERE applicant_email = ?1",
        params![email],
    )?;
    Ok(json!({
        "status": "approved",
        "applicant": name,
        "message": format!("KYC fully approved for {}.", name),
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

    fn register(conn: &Connection, email: &str, employer: &str) {
        conn.execute(
            "INSERT INTO applicants (name, email, age, employment_type, employer, annual_income)
             VALUES ('New Person', ?1, 30, 'salaried', ?2, 600000)",
            params![email, employer],
        )
        .unwrap();
    }

    #[test]
    fn test_full_kyc_flow() {
        let conn = seeded(AppKind::Loan);
        register(&conn, "new.person@email.com", "Zoho");
        let email = json!({"applicant_email": "new.person@email.com"});

        let status = run(&conn, "get_kyc_status", email.clone());
        assert_eq!(status["kyc_status"], "not_started");

        run(&conn, "verify_identity", email.clone());
        let early = run(&conn, "approve_kyc", email.clone());
        assert_eq!(early["status"], "incomplete");
        assert_eq!(early["missing_checks"], json!(["Documents", "Employment", "AML"]));

        assert_eq!(run(&conn, "check_document_authenticity", email.clone())["authentic"], true);
        assert_eq!(run(&conn, "verify_employment", email.clone())["verified"], true);
        assert_eq!(run(&conn, "run_aml_check", email.clone())["passed"], true);
        assert_eq!(run(&conn, "screen_sanctions", email.clone())["clear"], true);

        let approved = run(&conn, "approve_kyc", email.clone());
        assert_eq!(approved["status"], "approved");
        let status = run(&conn, "get_kyc_status", email);
        assert_eq!(status["kyc_status"], "approved");
        assert_eq!(status["identity_verified"], true);
    }

    #[test]
    fn test_watchlisted_applicant_is_flagged() {
        let conn = seeded(AppKind::Loan);
        let email = json!({"applicant_email": "fraud.test@email.com"});
        let docs = run(&conn, "check_document_authenticity", email.clone());
        assert_eq!(docs["fraud_detected"], true);
        assert_eq!(run(&conn, "screen_sanctions", email.clone())["clear"], false);
        assert_eq!(run(&conn, "run_aml_check", email.clone())["passed"], false);

        let refused = run(&conn, "approve_kyc", email);
        assert_eq!(refused["message"], "Cannot approve KYC: fraud flag is set.");
    }

    #[test]
    fn test_suspicious_employer() {
        let conn = seeded(AppKind::Loan);
        register(&conn, "shell@email.com", "Offshore Ltd Holdings");
        let email = json!({"applicant_email": "shell@email.com"});
        let job = run(&conn, "verify_employment", email.clone());
        assert_eq!(job["verified"], false);
        let docs = run(&conn, "check_document_authenticity", email);
        assert_eq!(docs["authentic"], false);
    }

    #[test]
    fn test_manual_fraud_flag() {
        let conn = seeded(AppKind::Loan);
        let out = run(
            &conn,
            "flag_fraud_risk",
            json!({"applicant_email": "meena.joshi@email.com", "reason": "Mismatched PAN"}),
        );
        assert_eq!(out["status"], "flagged");
        assert_eq!(out["applications_flagged"], 1);
        let status: String = conn
            .query_row("SELECT status FROM loan_applications WHERE id = 8", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "flagged");

        let nobody = run(&conn, "flag_fraud_risk", json!({"applicant_email": "x@y.z", "reason": "r"}));
        assert_eq!(nobody["message"], "Applicant 'x@y.z' not found.");
    }
}
