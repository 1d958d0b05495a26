//! Credit scoring and risk assessment

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{flag, int, num, query_one, query_rows, round_to, text};

use super::{APPLICANT_EMAIL, active_debt, applicant_missing, dti_pct, error, missed_installments};
use crate::tools::params::{req_f64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_credit_report",
        description: "Latest credit score report for an applicant.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_credit_report),
    },
    ToolSpec {
        name: "calculate_credit_score",
        description: "Compute a 300-850 credit score from income, employment, age, debt and repayment history, and store it.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(calculate_credit_score),
    },
    ToolSpec {
        name: "get_debt_to_income_ratio",
        description: "Current debt-to-income ratio for an applicant.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(get_debt_to_income_ratio),
    },
    ToolSpec {
        name: "check_existing_loans",
        description: "Loans held by an applicant with outstanding balances.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(check_existing_loans),
    },
    ToolSpec {
        name: "assess_risk_level",
        description: "Risk assessment and recommendation for a specific requested amount.",
        params: &[
            APPLICANT_EMAIL,
            Param::req("requested_amount", Kind::Number, "Amount being requested"),
        ],
        handler: Handler::Sql(assess_risk_level),
    },
    ToolSpec {
        name: "generate_risk_summary",
        description: "One-page risk summary for underwriting: score, DTI, debt, missed payments, KYC.",
        params: &[APPLICANT_EMAIL],
        handler: Handler::Sql(generate_risk_summary),
    },
];

/// Inputs to the credit score
#[derive(Debug, Clone, PartialEq)]
pub struct CreditProfile {
    pub annual_income: f64,
    pub salaried: bool,
    pub age: i64,
    pub dti_pct: f64,
    pub missed_payments: i64,
}

impl CreditProfile {
    /// Score on the 300-850 scale
    pub fn score(&self) -> i64 {
        let mut score = 600;
        score += match self.annual_income {
            i if i >= 1_000_000.0 => 80,
            i if i >= 700_000.0 => 60,
            i if i >= 500_000.0 => 40,
            i if i >= 300_000.0 => 20,
            _ => -20,
        };
        score += if self.salaried { 30 } else { 10 };
        score += match self.age {
            30..=50 => 20,
            25..=29 => 10,
            a if a > 55 => -10,
            _ => 0,
        };
        score += match self.dti_pct {
            d if d < 20.0 => 40,
            d if d < 35.0 => 20,
            d if d < 50.0 => -20,
            _ => -50,
        };
        score -= self.missed_payments * 30;
        score.clamp(300, 850)
    }
}

pub fn risk_tier(score: i64) -> &'static str {
    match score {
        s if s >= 750 => "Low",
        s if s >= 650 => "Medium",
        s if s >= 550 => "High",
        _ => "Very High",
    }
}

fn dti_level(dti: f64) -> &'static str {
    match dti {
        d if d < 20.0 => "Excellent (<20%)",
        d if d < 35.0 => "Good (20-35%)",
        d if d < 50.0 => "Moderate (35-50%)",
        _ => "High (>50%)",
    }
}

fn email_of(input: &Value) -> Result<String> {
    Ok(req_str(input, "applicant_email")?.to_lowercase())
}

fn annual_income(conn: &Connection, email: &str) -> Result<Option<f64>> {
    Ok(conn
        .query_row(
            "SELECT annual_income FROM applicants WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )
        .optional()?)
}

fn latest_score(conn: &Connection, email: &str) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT credit_score, risk_level, debt_to_income_pct FROM credit_scores
         WHERE applicant_email = ?1 ORDER BY score_date DESC, id DESC LIMIT 1",
        params![email],
    )
}

fn get_credit_report(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let row = query_one(
        conn,
        "SELECT cs.applicant_email, cs.credit_score, cs.risk_level, cs.debt_to_income_pct,
                cs.total_existing_debt, substr(cs.score_date, 1, 10) AS score_date,
                a.name, a.annual_income, a.employment_type
         FROM credit_scores cs JOIN applicants a ON a.email = cs.applicant_email
         WHERE cs.applicant_email = ?1 ORDER BY cs.score_date DESC, cs.id DESC LIMIT 1",
        params![email],
    )?;
    match row {
        Some(mut report) => {
            report["found"] = json!(true);
            Ok(report)
        }
        None => Ok(json!({
            "found": false,
            "message": format!(
                "No credit report for '{}'. Run calculate_credit_score first.",
                email
            ),
        })),
    }
}

fn calculate_credit_score(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let applicant = query_one(
        conn,
        "SELECT name, age, employment_type, annual_income FROM applicants WHERE email = ?1",
        params![email],
    )?;
    let Some(applicant) = applicant else {
        return Ok(applicant_missing(&email));
    };

    let income = num(&applicant, "annual_income");
    let debt = active_debt(conn, &email)?;
    let profile = CreditProfile {
        annual_income: income,
        salaried: text(&applicant, "employment_type") == "salaried",
        age: int(&applicant, "age"),
        dti_pct: dti_pct(income, debt),
        missed_payments: missed_installments(conn, &email)?,
    };
    let score = profile.score();
    let risk = risk_tier(score);

    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE credit_scores SET credit_score = ?1, risk_level = ?2, debt_to_income_pct = ?3,
                total_existing_debt = ?4, score_date = CURRENT_DATE
         WHERE applicant_email = ?5",
        params![score, risk, profile.dti_pct, debt, email],
    )?;
    if updated == 0 {
        tx.execute(
            "INSERT INTO credit_scores (applicant_email, credit_score, risk_level, debt_to_income_pct, total_existing_debt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![email, score, risk, profile.dti_pct, debt],
        )?;
    }
    tx.commit()?;

    Ok(json!({
        "applicant": applicant["name"],
        "credit_score": score,
        "risk_level": risk,
        "debt_to_income_pct": profile.dti_pct,
        "total_existing_debt": debt,
        "annual_income": income,
        "missed_payments": profile.missed_payments,
        "message": format!(
            "Credit score calculated: {} ({} risk). DTI: {}%.",
            score, risk, profile.dti_pct
        ),
    }))
}

fn get_debt_to_income_ratio(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let Some(income) = annual_income(conn, &email)? else {
        return Ok(applicant_missing(&email));
    };
    let debt = active_debt(conn, &email)?;
    let dti = dti_pct(income, debt);
    Ok(json!({
        "annual_income": income,
        "total_existing_debt": debt,
        "monthly_income": round_to(income / 12.0, 2),
        "monthly_debt_obligation": round_to(debt / 12.0, 2),
        "debt_to_income_pct": dti,
        "dti_level": dti_level(dti),
    }))
}

fn check_existing_loans(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let rows = query_rows(
        conn,
        "SELECT l.id, la.loan_type, l.principal, l.interest_rate, l.term_months,
                l.outstanding_balance, l.status, substr(l.disbursed_at, 1, 10) AS disbursed_at
         FROM loans l JOIN loan_applications la ON la.id = l.application_id
         WHERE l.applicant_email = ?1 ORDER BY l.disbursed_at DESC, l.id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No active loans for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn assess_risk_level(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let amount = req_f64(input, "requested_amount")?;
    let Some(income) = annual_income(conn, &email)? else {
        return Ok(applicant_missing(&email));
    };
    let Some(latest) = latest_score(conn, &email)? else {
        return Ok(error("No credit score found. Run calculate_credit_score first."));
    };

    let score = int(&latest, "credit_score");
    let risk = text(&latest, "risk_level");
    let dti = num(&latest, "debt_to_income_pct");
    let ati = if income > 0.0 {
        round_to(amount / income, 2)
    } else {
        99.0
    };

    let mut concerns = Vec::new();
    if score < 600 {
        concerns.push(format!("Low credit score ({})", score));
    }
    if dti > 50.0 {
        concerns.push(format!("High DTI ({}%)", dti));
    }
    if ati > 3.0 {
        concerns.push(format!("Loan amount is {}x annual income", ati));
    }
    if risk == "Very High" {
        concerns.push("Very high risk tier".to_string());
    }
    let recommendation = match concerns.len() {
        0 => "Approve",
        1 => "Conditional Approve",
        _ => "Reject",
    };
    let issues = if concerns.is_empty() {
        "None".to_string()
    } else {
        concerns.join("; ")
    };

    Ok(json!({
        "credit_score": score,
        "risk_level": risk,
        "dti_pct": dti,
        "amount_to_income_ratio": ati,
        "concerns": concerns,
        "recommendation": recommendation,
        "message": format!("Risk assessment: {}. Issues: {}.", recommendation, issues),
    }))
}

fn generate_risk_summary(conn: &Connection, input: &Value) -> Result<Value> {
    let email = email_of(input)?;
    let applicant = query_one(
        conn,
        "SELECT name, annual_income, employment_type FROM applicants WHERE email = ?1",
        params![email],
    )?;
    let Some(applicant) = applicant else {
        return Ok(applicant_missing(&email));
    };
    let latest = latest_score(conn, &email)?;
    let kyc = query_one(
        conn,
        "SELECT kyc_status, fraud_flag FROM kyc_records WHERE applicant_email = ?1",
        params![email],
    )?;
    let missed = missed_installments(conn, &email)?;
    let debt = active_debt(conn, &email)?;

    let kyc_status = kyc
        .as_ref()
        .map(|k| text(k, "kyc_status").to_string())
        .unwrap_or_else(|| "pending".to_string());
    let fraud = kyc.as_ref().is_some_and(|k| flag(k, "fraud_flag"));
    let (score, risk, dti) = match &latest {
        Some(s) => (
            json!(int(s, "credit_score")),
            text(s, "risk_level").to_string(),
            num(s, "debt_to_income_pct"),
        ),
        None => (json!("Not calculated"), "Unknown".to_string(), 0.0),
    };
    let score_label = latest
        .as_ref()
        .map(|s| int(s, "credit_score").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    Ok(json!({
        "applicant": applicant["name"],
        "email": email,
        "annual_income": applicant["annual_income"],
        "employment_type": applicant["employment_type"],
        "credit_score": score,
        "risk_level": risk,
        "dti_pct": dti,
        "total_existing_debt": debt,
        "missed_payments": missed,
        "kyc_status": kyc_status,
        "fraud_flag": fraud,
        "summary": format!(
            "{}Score: {}, Risk: {}, KYC: {}.",
            if fraud { "FRAUD FLAG SET. " } else { "" },
            score_label,
            if latest.is_some() { risk.as_str() } else { "N/A" },
            kyc_status
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
    fn test_score_factors() {
        let strong = CreditProfile {
            annual_income: 1_500_000.0,
            salaried: true,
            age: 40,
            dti_pct: 5.0,
            missed_payments: 0,
        };
        assert_eq!(strong.score(), 770);
        assert_eq!(risk_tier(strong.score()), "Low");

        let weak = CreditProfile {
            annual_income: 200_000.0,
            salaried: false,
            age: 60,
            dti_pct: 80.0,
            missed_payments: 10,
        };
        assert_eq!(weak.score(), 300);
        assert_eq!(risk_tier(weak.score()), "Very High");
    }

    #[test]
    fn test_calculate_for_seeded_borrowers() {
        let conn = seeded(AppKind::Loan);
        // 720k income, one active loan of 462k outstanding
        let aarav = run(&conn, "calculate_credit_score", json!({"applicant_email": "aarav.sharma@email.com"}));
        assert_eq!(aarav["debt_to_income_pct"], 64.17);
        assert_eq!(aarav["credit_score"], 660);
        assert_eq!(aarav["risk_level"], "Medium");

        // first installment missed
        let mike = run(&conn, "calculate_credit_score", json!({"applicant_email": "defaulter.mike@email.com"}));
        assert_eq!(mike["missed_payments"], 1);
        assert_eq!(mike["credit_score"], 590);

        let report = run(&conn, "get_credit_report", json!({"applicant_email": "aarav.sharma@email.com"}));
        assert_eq!(report["credit_score"], 660);
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM credit_scores WHERE applicant_email = 'aarav.sharma@email.com'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_dti_and_loans() {
        let conn = seeded(AppKind::Loan);
        let dti = run(&conn, "get_debt_to_income_ratio", json!({"applicant_email": "meena.joshi@email.com"}));
        assert_eq!(dti["debt_to_income_pct"], 0.0);
        assert_eq!(dti["dti_level"], "Excellent (<20%)");

        let loans = run(&conn, "check_existing_loans", json!({"applicant_email": "karan.gupta@email.com"}));
        assert_eq!(loans[0]["loan_type"], "home");
        let none = run(&conn, "check_existing_loans", json!({"applicant_email": "meena.joshi@email.com"}));
        assert_eq!(none[0]["message"], "No active loans for 'meena.joshi@email.com'.");
    }

    #[test]
    fn test_risk_recommendations() {
        let conn = seeded(AppKind::Loan);
        let good = run(
            &conn,
            "assess_risk_level",
            json!({"applicant_email": "karan.gupta@email.com", "requested_amount": 1_000_000}),
        );
        assert_eq!(good["recommendation"], "Approve");

        // 540 score, 55% DTI
        let bad = run(
            &conn,
            "assess_risk_level",
            json!({"applicant_email": "kavya.reddy@email.com", "requested_amount": 2_000_000}),
        );
        assert_eq!(bad["recommendation"], "Reject");
        assert_eq!(bad["concerns"].as_array().unwrap().len(), 3);

        let summary = run(&conn, "generate_risk_summary", json!({"applicant_email": "fraud.test@email.com"}));
        assert_eq!(summary["fraud_flag"], true);
        assert_eq!(summary["summary"], "FRAUD FLAG SET. Score: 310, Risk: High, KYC: flagged.");
    }
}
