//! Loan processing: applicants, KYC, credit, underwriting and repayment

use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, params};

use crate::time::{date_offset, days_ago, format_date, today};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS applicants (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    age             INTEGER NOT NULL,
    employment_type TEXT NOT NULL DEFAULT 'salaried',
    employer        TEXT,
    annual_income   REAL DEFAULT 0,
    created_at      TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS loan_applications (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    applicant_email  TEXT NOT NULL,
    loan_type        TEXT NOT NULL,
    amount_requested REAL NOT NULL,
    purpose          TEXT,
    status           TEXT DEFAULT 'submitted',
    created_at       TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS kyc_records (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    applicant_email     TEXT NOT NULL UNIQUE,
    identity_verified   INTEGER DEFAULT 0,
    doc_verified        INTEGER DEFAULT 0,
    employment_verified INTEGER DEFAULT 0,
    aml_passed          INTEGER DEFAULT 0,
    sanctions_clear     INTEGER DEFAULT 0,
    fraud_flag          INTEGER DEFAULT 0,
    fraud_reason        TEXT,
    kyc_status          TEXT DEFAULT 'pending',
    verified_at         TEXT
);
CREATE TABLE IF NOT EXISTS credit_scores (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    applicant_email     TEXT NOT NULL,
    credit_score        INTEGER NOT NULL,
    risk_level          TEXT NOT NULL,
    debt_to_income_pct  REAL DEFAULT 0,
    total_existing_debt REAL DEFAULT 0,
    score_date          TEXT DEFAULT CURRENT_DATE
);
CREATE TABLE IF NOT EXISTS underwriting_decisions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id  INTEGER REFERENCES loan_applications(id),
    decision        TEXT NOT NULL,
    approved_amount REAL,
    interest_rate   REAL,
    term_months     INTEGER,
    monthly_emi     REAL,
    reason          TEXT,
    decided_at      TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS loans (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id      INTEGER REFERENCES loan_applications(id),
    applicant_email     TEXT NOT NULL,
    principal           REAL NOT NULL,
    interest_rate       REAL NOT NULL,
    term_months         INTEGER NOT NULL,
    outstanding_balance REAL NOT NULL,
    status              TEXT DEFAULT 'active',
    disbursed_at        TEXT DEFAULT CURRENT_DATE
);
CREATE TABLE IF NOT EXISTS repayment_schedule (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    loan_id        INTEGER REFERENCES loans(id),
    installment_no INTEGER NOT NULL,
    due_date       TEXT NOT NULL,
    amount_due     REAL NOT NULL,
    amount_paid    REAL DEFAULT 0,
    status         TEXT DEFAULT 'pending'
);
CREATE TABLE IF NOT EXISTS payments (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    loan_id         INTEGER REFERENCES loans(id),
    applicant_email TEXT NOT NULL,
    amount_paid     REAL NOT NULL,
    payment_date    TEXT DEFAULT CURRENT_DATE,
    method          TEXT DEFAULT 'bank_transfer',
    notes           TEXT
);
";

/// Annuity installment for a loan. A zero rate splits the principal evenly.
pub fn monthly_emi(principal: f64, annual_rate_pct: f64, months: i64) -> f64 {
    let months = months.max(1);
    let r = annual_rate_pct / 100.0 / 12.0;
    let emi = if r == 0.0 {
        principal / months as f64
    } else {
        let growth = (1.0 + r).powi(months as i32);
        principal * r * growth / (growth - 1.0)
    };
    (emi * 100.0).round() / 100.0
}

// (name, email, age, employment_type, employer, annual_income)
const APPLICANTS: &[(&str, &str, i64, &str, &str, f64)] = &[
    ("Aarav Sharma", "aarav.sharma@email.com", 32, "salaried", "Infosys Ltd", 720_000.0),
    ("Priya Mehta", "priya.mehta@email.com", 28, "salaried", "TCS", 580_000.0),
    ("Rohan Verma", "rohan.verma@email.com", 45, "self_employed", "Own Business", 1_200_000.0),
    ("Sneha Patel", "sneha.patel@email.com", 26, "salaried", "Wipro", 420_000.0),
    ("Karan Gupta", "karan.gupta@email.com", 38, "salaried", "HDFC Bank", 950_000.0),
    ("Anjali Nair", "anjali.nair@email.com", 31, "salaried", "Accenture", 660_000.0),
    ("Vikram Singh", "vikram.singh@email.com", 50, "self_employed", "Singh Traders", 1_800_000.0),
    ("Meena Joshi", "meena.joshi@email.com", 24, "salaried", "Cognizant", 380_000.0),
    ("Arjun Das", "arjun.das@email.com", 35, "salaried", "Amazon India", 1_100_000.0),
    ("Kavya Reddy", "kavya.reddy@email.com", 29, "salaried", "Flipkart", 510_000.0),
    ("Fraud User", "fraud.test@email.com", 33, "salaried", "Unknown Corp", 500_000.0),
    ("Defaulter Mike", "defaulter.mike@email.com", 40, "salaried", "XYZ Ltd", 350_000.0),
];

// (email, loan_type, amount, purpose, status); application ids follow this order
const APPLICATIONS: &[(&str, &str, f64, &str, &str)] = &[
    ("aarav.sharma@email.com", "personal", 500_000.0, "Home renovation", "approved"),
    ("priya.mehta@email.com", "education", 300_000.0, "MBA program fees", "approved"),
    ("rohan.verma@email.com", "business", 2_000_000.0, "Expand workshop", "approved"),
    ("sneha.patel@email.com", "personal", 150_000.0, "Wedding expenses", "under_review"),
    ("karan.gupta@email.com", "home", 5_000_000.0, "Purchase apartment", "approved"),
    ("anjali.nair@email.com", "personal", 250_000.0, "Medical emergency", "approved"),
    ("vikram.singh@email.com", "business", 3_500_000.0, "New machinery", "escalated"),
    ("meena.joshi@email.com", "education", 200_000.0, "Online certification", "submitted"),
    ("arjun.das@email.com", "personal", 400_000.0, "Vehicle purchase", "approved"),
    ("kavya.reddy@email.com", "personal", 180_000.0, "Laptop & equipment", "rejected"),
    ("fraud.test@email.com", "personal", 800_000.0, "Investment", "flagged"),
    ("defaulter.mike@email.com", "personal", 220_000.0, "Personal expenses", "approved"),
];

// (email, identity, doc, employment, aml, sanctions, fraud, fraud_reason, status)
type KycRow = (&'static str, bool, bool, bool, bool, bool, bool, Option<&'static str>, &'static str);
const KYC: &[KycRow] = &[
    ("aarav.sharma@email.com", true, true, true, true, true, false, None, "approved"),
    ("priya.mehta@email.com", true, true, true, true, true, false, None, "approved"),
    ("rohan.verma@email.com", true, true, true, true, true, false, None, "approved"),
    ("sneha.patel@email.com", true, true, true, true, true, false, None, "approved"),
    ("karan.gupta@email.com", true, true, true, true, true, false, None, "approved"),
    ("anjali.nair@email.com", true, true, true, true, true, false, None, "approved"),
    ("vikram.singh@email.com", true, true, true, true, true, false, None, "approved"),
    ("meena.joshi@email.com", true, false, true, true, true, false, None, "pending"),
    ("arjun.das@email.com", true, true, true, true, true, false, None, "approved"),
    ("kavya.reddy@email.com", true, true, true, false, true, false, None, "failed"),
    (
        "fraud.test@email.com",
        true,
        false,
        false,
        false,
        false,
        true,
        Some("Document metadata mismatch. AML alert."),
        "flagged",
    ),
    ("defaulter.mike@email.com", true, true, true, true, true, false, None, "approved"),
];

// (email, score, risk, dti_pct, existing_debt)
const CREDIT: &[(&str, i64, &str, f64, f64)] = &[
    ("aarav.sharma@email.com", 742, "Low", 28.5, 150_000.0),
    ("priya.mehta@email.com", 698, "Low", 22.0, 80_000.0),
    ("rohan.verma@email.com", 775, "Low", 18.0, 400_000.0),
    ("sneha.patel@email.com", 620, "Medium", 35.0, 60_000.0),
    ("karan.gupta@email.com", 801, "Low", 20.0, 800_000.0),
    ("anjali.nair@email.com", 715, "Low", 26.0, 120_000.0),
    ("vikram.singh@email.com", 680, "Medium", 42.0, 900_000.0),
    ("meena.joshi@email.com", 580, "Medium", 38.0, 40_000.0),
    ("arjun.das@email.com", 758, "Low", 24.0, 200_000.0),
    ("kavya.reddy@email.com", 540, "High", 55.0, 180_000.0),
    ("fraud.test@email.com", 310, "High", 78.0, 500_000.0),
    ("defaulter.mike@email.com", 595, "High", 62.0, 210_000.0),
];

// (application_id, decision, amount, rate, months, emi, reason)
type DecisionRow = (
    i64,
    &'static str,
    Option<f64>,
    Option<f64>,
    Option<i64>,
    Option<f64>,
    &'static str,
);
const DECISIONS: &[DecisionRow] = &[
    (1, "approve", Some(500_000.0), Some(11.5), Some(36), Some(16_420.0), "Good credit, stable employment, low DTI."),
    (2, "approve", Some(300_000.0), Some(10.5), Some(24), Some(13_900.0), "Excellent profile, low risk."),
    (3, "approve", Some(1_800_000.0), Some(13.0), Some(60), Some(41_200.0), "Strong business income, manageable DTI."),
    (4, "approve", Some(120_000.0), Some(13.5), Some(12), Some(10_700.0), "Approved reduced amount due to medium risk."),
    (5, "approve", Some(5_000_000.0), Some(9.5), Some(180), Some(52_300.0), "Prime applicant, home loan approved."),
    (6, "approve", Some(250_000.0), Some(11.0), Some(24), Some(11_550.0), "Low risk, good income-to-debt ratio."),
    (7, "escalate", None, None, None, None, "High amount + medium risk. Needs human review."),
    (9, "approve", Some(400_000.0), Some(11.5), Some(36), Some(13_100.0), "Strong profile, vehicle loan approved."),
    (10, "reject", None, None, None, None, "High DTI (55%), high credit risk, AML flag."),
    (11, "reject", None, None, None, None, "Fraud flag raised. Application blocked."),
    (12, "approve", Some(220_000.0), Some(14.0), Some(24), Some(10_600.0), "Approved at higher rate due to high DTI."),
];

// (application_id, email, principal, rate, months, outstanding, disbursed_days_ago)
const LOANS: &[(i64, &str, f64, f64, i64, f64, i64)] = &[
    (1, "aarav.sharma@email.com", 500_000.0, 11.5, 36, 462_000.0, 14),
    (2, "priya.mehta@email.com", 300_000.0, 10.5, 24, 260_000.0, 20),
    (3, "rohan.verma@email.com", 1_800_000.0, 13.0, 60, 1_800_000.0, 5),
    (5, "karan.gupta@email.com", 5_000_000.0, 9.5, 180, 5_000_000.0, 3),
    (6, "anjali.nair@email.com", 250_000.0, 11.0, 24, 238_000.0, 10),
    (9, "arjun.das@email.com", 400_000.0, 11.5, 36, 400_000.0, 7),
    (12, "defaulter.mike@email.com", 220_000.0, 14.0, 24, 220_000.0, 30),
];

const DEFAULTER: &str = "defaulter.mike@email.com";

// (email, method, paid_days_ago)
const PAYMENTS: &[(&str, &str, i64)] = &[
    ("aarav.sharma@email.com", "bank_transfer", 13),
    ("priya.mehta@email.com", "upi", 19),
    ("anjali.nair@email.com", "net_banking", 9),
];

pub fn seed(conn: &Connection) -> Result<()> {
    for (name, email, age, employment, employer, income) in APPLICANTS {
        conn.execute(
            "INSERT INTO applicants (name, email, age, employment_type, employer, annual_income)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, email, age, employment, employer, income],
        )?;
    }

    for (idx, (email, loan_type, amount, purpose, status)) in APPLICATIONS.iter().enumerate() {
        conn.execute(
            "INSERT INTO loan_applications (applicant_email, loan_type, amount_requested, purpose, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![email, loan_type, amount, purpose, status, days_ago(30 - idx as i64 * 2)],
        )?;
    }

    for (email, identity, doc, employment, aml, sanctions, fraud, reason, status) in KYC {
        conn.execute(
            "INSERT INTO kyc_records (applicant_email, identity_verified, doc_verified, employment_verified,
                                      aml_passed, sanctions_clear, fraud_flag, fraud_reason, kyc_status, verified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![email, identity, doc, employment, aml, sanctions, fraud, reason, status, days_ago(25)],
        )?;
    }

    for (email, score, risk, dti, debt) in CREDIT {
        conn.execute(
            "INSERT INTO credit_scores (applicant_email, credit_score, risk_level, debt_to_income_pct,
                                        total_existing_debt, score_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![email, score, risk, dti, debt, date_offset(-20)],
        )?;
    }

    for (app_id, decision, amount, rate, months, emi, reason) in DECISIONS {
        conn.execute(
            "INSERT INTO underwriting_decisions (application_id, decision, approved_amount, interest_rate,
                                                 term_months, monthly_emi, reason, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![app_id, decision, amount, rate, months, emi, reason, days_ago(15)],
        )?;
    }

    let today = today();
    for (app_id, email, principal, rate, months, outstanding, ago) in LOANS {
        let disbursed = today - Duration::days(*ago);
        conn.execute(
            "INSERT INTO loans (application_id, applicant_email, principal, interest_rate, term_months,
                                outstanding_balance, status, disbursed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)",
            params![app_id, email, principal, rate, months, outstanding, format_date(disbursed)],
        )?;
        let loan_id = conn.last_insert_rowid();

        let emi = monthly_emi(*principal, *rate, *months);
        let mut stmt = conn.prepare(
            "INSERT INTO repayment_schedule (loan_id, installment_no, due_date, amount_due, amount_paid, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for n in 1..=*months {
            let due = disbursed + Duration::days(30 * n);
            let (paid, status) = if due < today { (emi, "paid") } else { (0.0, "pending") };
            stmt.execute(params![loan_id, n, format_date(due), emi, paid, status])?;
        }

        if *email == DEFAULTER {
            conn.execute(
                "UPDATE repayment_schedule SET status = 'missed', amount_paid = 0
                 WHERE loan_id = ?1 AND installment_no = 1",
                [loan_id],
            )?;
        }

        if let Some((_, method, paid_ago)) = PAYMENTS.iter().find(|(e, _, _)| e == email) {
            conn.execute(
                "INSERT INTO payments (loan_id, applicant_email, amount_paid, payment_date, method, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'Auto-debit successful')",
                params![loan_id, email, emi, date_offset(-paid_ago), method],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emi() {
        assert_eq!(monthly_emi(120_000.0, 0.0, 12), 10_000.0);
        let emi = monthly_emi(500_000.0, 11.5, 36);
        assert!((emi - 16_487.9).abs() < 1.0, "got {}", emi);
    }

    #[test]
    fn test_seed_loans_and_defaulter() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let loans: i64 = conn.query_row("SELECT COUNT(*) FROM loans", [], |r| r.get(0))?;
        assert_eq!(loans, 7);

        let missed: String = conn.query_row(
            "SELECT s.status FROM repayment_schedule s JOIN loans l ON l.id = s.loan_id
             WHERE l.applicant_email = ?1 AND s.installment_no = 1",
            [DEFAULTER],
            |r| r.get(0),
        )?;
        assert_eq!(missed, "missed");

        let installments: i64 = conn.query_row(
            "SELECT COUNT(*) FROM repayment_schedule s JOIN loans l ON l.id = s.loan_id
             WHERE l.applicant_email = 'karan.gupta@email.com'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(installments, 180);
        Ok(())
    }
}
