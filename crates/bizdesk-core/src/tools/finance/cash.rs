//! Cash position, runway and cash-flow statements

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{num, query_one, query_rows, round_to, text};
use bizdesk_store::time::{format_date, parse_date, today};

use crate::tools::fmt::{inr, rupees};
use crate::tools::params::{f64_or, req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const OPERATING_INFLOWS: &[&str] = &["saas_revenue", "product_revenue", "services_revenue"];
const OPERATING_OUTFLOWS: &[&str] = &["salaries", "marketing", "rent", "cogs"];

const DEFAULT_THRESHOLD: f64 = 5_000_000.0;

const DATE_FROM: Param = Param::opt("date_from", Kind::String, "Start date, default 2026-02-01");
const DATE_TO: Param = Param::opt("date_to", Kind::String, "End date, default 2026-02-28");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_cash_position",
        description: "Live cash balance across all cash accounts.",
        params: &[],
        handler: Handler::Sql(get_cash_position),
    },
    ToolSpec {
        name: "get_cash_runway",
        description: "Days of runway at the average burn of the last two months.",
        params: &[],
        handler: Handler::Sql(get_cash_runway),
    },
    ToolSpec {
        name: "record_cash_transaction",
        description: "Record a cash inflow or outflow against a cash account and update its balance.",
        params: &[
            Param::req("cash_account_id", Kind::Integer, "Cash account id"),
            Param::req("txn_date", Kind::String, "Date, YYYY-MM-DD"),
            Param::req("txn_type", Kind::String, "inflow or outflow"),
            Param::req("amount", Kind::Number, "Positive amount"),
            Param::req("category", Kind::String, "Category, e.g. salaries or saas_revenue"),
            Param::opt("description", Kind::String, "Narration"),
        ],
        handler: Handler::Sql(record_cash_transaction),
    },
    ToolSpec {
        name: "get_cash_flow_statement",
        description: "Operating, investing and financing cash flows for a period.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_cash_flow_statement),
    },
    ToolSpec {
        name: "get_operating_cash_flow",
        description: "Operating inflows and outflows by category for a period.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_operating_cash_flow),
    },
    ToolSpec {
        name: "get_accounts_receivable_aging",
        description: "Receivables aged into 0-30, 31-60, 61-90 and 90+ day buckets.",
        params: &[Param::opt("as_of", Kind::String, "Aging date, default today")],
        handler: Handler::Sql(get_accounts_receivable_aging),
    },
    ToolSpec {
        name: "get_accounts_payable_aging",
        description: "Supplier bills aged into 0-15 and 16-30 day due, 31-60 and 60+ day overdue buckets.",
        params: &[Param::opt("as_of", Kind::String, "Aging date, default today")],
        handler: Handler::Sql(get_accounts_payable_aging),
    },
    ToolSpec {
        name: "check_cash_threshold",
        description: "Record a cash alert when the total cash position is below a threshold.",
        params: &[
            Param::opt("threshold", Kind::Number, "Threshold amount, default 5000000"),
            Param::opt("recipients", Kind::String, "Who should be notified"),
        ],
        handler: Handler::Sql(check_cash_threshold),
    },
];

fn total_cash(conn: &Connection) -> Result<f64> {
    let total: f64 = conn.query_row("SELECT COALESCE(SUM(balance), 0) FROM cash_accounts", [], |r| r.get(0))?;
    Ok(total)
}

fn get_cash_position(conn: &Connection, _input: &Value) -> Result<Value> {
    let accounts = query_rows(
        conn,
        "SELECT id, name, account_type AS type, balance, currency, institution
         FROM cash_accounts ORDER BY balance DESC",
        [],
    )?;
    let total: f64 = accounts.iter().map(|a| num(a, "balance")).sum();
    Ok(json!({
        "total_cash": round_to(total, 2),
        "currency": "INR",
        "account_count": accounts.len(),
        "accounts": accounts,
        "message": format!("Total cash position: {} across {} accounts", inr(total), accounts.len()),
    }))
}

/// Runway figures derived from the cash position and recent burn
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Runway {
    pub total_cash: f64,
    pub monthly_burn: f64,
    pub days: i64,
}

impl Runway {
    pub fn status(&self) -> &'static str {
        match self.days {
            d if d < 30 => "CRITICAL: less than 30 days",
            d if d < 60 => "Warning: less than 60 days",
            d if d < 180 => "Healthy",
            _ => "Strong position",
        }
    }
}

pub(crate) fn runway(conn: &Connection) -> Result<Runway> {
    let total_cash = total_cash(conn)?;
    let burn: Option<f64> = conn
        .query_row(
            "SELECT AVG(monthly_out) FROM (
               SELECT substr(txn_date, 1, 7) AS month, SUM(amount) AS monthly_out
               FROM cash_transactions WHERE txn_type = 'outflow'
               GROUP BY month ORDER BY month DESC LIMIT 2
             )",
            [],
            |r| r.get(0),
        )
        .optional()?
        .flatten();

    // No outflows on record means nothing is burning
    let (monthly_burn, days) = match burn {
        Some(b) if b > 0.0 => (b, (total_cash / b * 30.0) as i64),
        _ => (0.0, 9999),
    };
    Ok(Runway {
        total_cash,
        monthly_burn,
        days,
    })
}

fn get_cash_runway(conn: &Connection, _input: &Value) -> Result<Value> {
    let r = runway(conn)?;
    Ok(json!({
        "total_cash": round_to(r.total_cash, 2),
        "monthly_burn_rate": round_to(r.monthly_burn, 2),
        "runway_days": r.days,
        "runway_months": round_to(r.days as f64 / 30.0, 1),
        "status": r.status(),
    }))
}

fn record_cash_transaction(conn: &Connection, input: &Value) -> Result<Value> {
    let account_id = req_i64(input, "cash_account_id")?;
    let txn_date = req_str(input, "txn_date")?;
    let txn_type = req_str(input, "txn_type")?.to_lowercase();
    let amount = req_f64(input, "amount")?;
    let category = req_str(input, "category")?;
    let description = str_or(input, "description", "");

    if txn_type != "inflow" && txn_type != "outflow" {
        return Ok(json!({"success": false, "message": "txn_type must be 'inflow' or 'outflow'"}));
    }
    if amount <= 0.0 {
        return Ok(json!({"success": false, "message": "Amount must be greater than zero."}));
    }
    if parse_date(&txn_date).is_none() {
        return Ok(json!({"success": false, "message": "txn_date must be YYYY-MM-DD."}));
    }

    let name: Option<String> = conn
        .query_row("SELECT name FROM cash_accounts WHERE id = ?1", params![account_id], |r| r.get(0))
        .optional()?;
    let Some(name) = name else {
        return Ok(json!({
            "success": false,
            "message": format!("Cash account #{} not found.", account_id),
        }));
    };

    let signed = if txn_type == "inflow" { amount } else { -amount };
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO cash_transactions (cash_account_id, txn_date, txn_type, amount, category, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![account_id, txn_date, txn_type, amount, category, description],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE cash_accounts SET balance = balance + ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![signed, account_id],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "transaction_id": id,
        "account": name,
        "type": txn_type,
        "amount": amount,
        "message": format!("Cash transaction #{} recorded: {} {}", id, txn_type, inr(amount)),
    }))
}

fn period(input: &Value) -> (String, String) {
    (
        str_or(input, "date_from", "2026-02-01").to_string(),
        str_or(input, "date_to", "2026-02-28").to_string(),
    )
}

fn sum_where(conn: &Connection, from: &str, to: &str, txn_type: &str, categories: &[&str]) -> Result<f64> {
    let mut total = 0.0;
    for category in categories {
        let part: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM cash_transactions
             WHERE txn_date BETWEEN ?1 AND ?2 AND txn_type = ?3 AND category = ?4",
            params![from, to, txn_type, category],
            |r| r.get(0),
        )?;
        total += part;
    }
    Ok(total)
}

fn get_cash_flow_statement(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);

    let op_in = sum_where(conn, &from, &to, "inflow", OPERATING_INFLOWS)?;
    let op_out = sum_where(conn, &from, &to, "outflow", OPERATING_OUTFLOWS)?;
    let operating = op_in - op_out;
    let investing = -sum_where(conn, &from, &to, "outflow", &["capex"])?;
    let financing =
        sum_where(conn, &from, &to, "inflow", &["loan"])? - sum_where(conn, &from, &to, "outflow", &["loan_repayment"])?;

    Ok(json!({
        "period": format!("{} to {}", from, to),
        "operating_activities": {
            "inflows": round_to(op_in, 2),
            "outflows": round_to(op_out, 2),
            "net": round_to(operating, 2),
        },
        "investing_activities": {"net": round_to(investing, 2)},
        "financing_activities": {"net": round_to(financing, 2)},
        "net_cash_change": round_to(operating + investing + financing, 2),
        "note": "Operating = collections - payroll - marketing - rent - COGS payments",
    }))
}

fn get_operating_cash_flow(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let rows = query_rows(
        conn,
        "SELECT txn_type, category, SUM(amount) AS total
         FROM cash_transactions
         WHERE txn_date BETWEEN ?1 AND ?2
         GROUP BY txn_type, category ORDER BY txn_type, total DESC",
        params![from, to],
    )?;

    let mut inflows = Map::new();
    let mut outflows = Map::new();
    for row in &rows {
        let category = text(row, "category");
        let is_operating = match text(row, "txn_type") {
            "inflow" => OPERATING_INFLOWS.contains(&category),
            _ => OPERATING_OUTFLOWS.contains(&category),
        };
        if !is_operating {
            continue;
        }
        let bucket = if text(row, "txn_type") == "inflow" {
            &mut inflows
        } else {
            &mut outflows
        };
        bucket.insert(category.to_string(), row["total"].clone());
    }

    let total_in: f64 = inflows.values().filter_map(Value::as_f64).sum();
    let total_out: f64 = outflows.values().filter_map(Value::as_f64).sum();
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "inflows": inflows,
        "outflows": outflows,
        "total_inflows": round_to(total_in, 2),
        "total_outflows": round_to(total_out, 2),
        "net_operating_cash": round_to(total_in - total_out, 2),
    }))
}

fn get_accounts_receivable_aging(conn: &Connection, input: &Value) -> Result<Value> {
    let default = format_date(today());
    let as_of = str_or(input, "as_of", &default);
    if parse_date(&as_of).is_none() {
        return Ok(json!({"success": false, "message": "as_of must be YYYY-MM-DD."}));
    }

    let row = query_one(
        conn,
        "SELECT
           COALESCE(SUM(CASE WHEN t.txn_date >= date(?1, '-30 days') THEN t.amount END), 0) AS current_0_30,
           COALESCE(SUM(CASE WHEN t.txn_date BETWEEN date(?1, '-60 days') AND date(?1, '-31 days')
                             THEN t.amount END), 0) AS days_31_60,
           COALESCE(SUM(CASE WHEN t.txn_date BETWEEN date(?1, '-90 days') AND date(?1, '-61 days')
                             THEN t.amount END), 0) AS days_61_90,
           COALESCE(SUM(CASE WHEN t.txn_date < date(?1, '-90 days') THEN t.amount END), 0) AS over_90_days
         FROM transactions t JOIN accounts a ON a.id = t.account_id
         WHERE a.category = 'receivable' AND t.txn_type = 'debit' AND t.txn_date <= ?1",
        params![as_of],
    )?
    .unwrap_or_else(|| json!({}));

    let current = num(&row, "current_0_30");
    let d60 = num(&row, "days_31_60");
    let d90 = num(&row, "days_61_90");
    let over = num(&row, "over_90_days");
    let total = current + d60 + d90 + over;
    let at_risk = d90 + over;

    let message = if total == 0.0 {
        "No receivable entries on the ledger.".to_string()
    } else {
        format!("Total AR: {} | At risk (61+ days): {}", inr(total), inr(at_risk))
    };
    Ok(json!({
        "as_of": as_of,
        "total_ar": round_to(total, 2),
        "aging_buckets": {
            "current_0_30": current,
            "days_31_60": d60,
            "days_61_90": d90,
            "over_90_days": over,
        },
        "at_risk": round_to(at_risk, 2),
        "message": message,
    }))
}

fn get_accounts_payable_aging(conn: &Connection, input: &Value) -> Result<Value> {
    let default = format_date(today());
    let as_of = str_or(input, "as_of", &default);
    if parse_date(&as_of).is_none() {
        return Ok(json!({"success": false, "message": "as_of must be YYYY-MM-DD."}));
    }

    let row = query_one(
        conn,
        "SELECT
           COALESCE(SUM(CASE WHEN t.txn_date >= date(?1, '-15 days') THEN t.amount END), 0) AS due_0_15_days,
           COALESCE(SUM(CASE WHEN t.txn_date BETWEEN date(?1, '-30 days') AND date(?1, '-16 days')
                             THEN t.amount END), 0) AS due_16_30_days,
           COALESCE(SUM(CASE WHEN t.txn_date BETWEEN date(?1, '-60 days') AND date(?1, '-31 days')
                             THEN t.amount END), 0) AS overdue_31_60,
           COALESCE(SUM(CASE WHEN t.txn_date < date(?1, '-60 days') THEN t.amount END), 0) AS overdue_60_plus
         FROM transactions t JOIN accounts a ON a.id = t.account_id
         WHERE a.category = 'payable' AND t.txn_type = 'credit' AND t.txn_date <= ?1",
        params![as_of],
    )?
    .unwrap_or_else(|| json!({}));

    let d15 = num(&row, "due_0_15_days");
    let d30 = num(&row, "due_16_30_days");
    let d60 = num(&row, "overdue_31_60");
    let over = num(&row, "overdue_60_plus");
    let total = d15 + d30 + d60 + over;
    let overdue = d60 + over;

    let message = if total == 0.0 {
        "No payable entries on the ledger.".to_string()
    } else {
        format!("Total AP: {} | Overdue (31+ days): {}", inr(total), inr(overdue))
    };
    Ok(json!({
        "as_of": as_of,
        "total_ap": round_to(total, 2),
        "aging_buckets": {
            "due_0_15_days": d15,
            "due_16_30_days": d30,
            "overdue_31_60": d60,
            "overdue_60_plus": over,
        },
        "overdue": round_to(overdue, 2),
        "message": message,
    }))
}

fn check_cash_threshold(conn: &Connection, input: &Value) -> Result<Value> {
    let threshold = f64_or(input, "threshold", DEFAULT_THRESHOLD)?;
    let recipients = str_or(input, "recipients", "finance-team");
    let r = runway(conn)?;

    if r.total_cash >= threshold {
        return Ok(json!({
            "alert_recorded": false,
            "current_cash": r.total_cash,
            "threshold": threshold,
            "message": format!(
                "Cash position {} is above threshold {}. No alert needed.",
                rupees(r.total_cash),
                rupees(threshold)
            ),
        }));
    }

    conn.execute(
        "INSERT INTO alerts (alert_type, threshold, current_value, sent_to)
         VALUES ('cash_below_threshold', ?1, ?2, ?3)",
        params![threshold, r.total_cash, recipients],
    )?;
    Ok(json!({
        "alert_recorded": true,
        "alert_id": conn.last_insert_rowid(),
        "current_cash": r.total_cash,
        "threshold": threshold,
        "runway_days": r.days,
        "message": format!(
            "Cash alert recorded for {}: {} < threshold {}",
            recipients,
            rupees(r.total_cash),
            rupees(threshold)
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
    fn test_position_and_runway() {
        let conn = seeded(AppKind::Finance);
        let position = run(&conn, "get_cash_position", json!({}));
        assert_eq!(position["total_cash"], 15_785_000.0);
        assert_eq!(position["account_count"], 3);

        let runway = run(&conn, "get_cash_runway", json!({}));
        assert_eq!(runway["monthly_burn_rate"], 12_370_000.0);
        assert_eq!(runway["runway_days"], 38);
        assert_eq!(runway["runway_months"], 1.3);
        assert_eq!(runway["status"], "Warning: less than 60 days");
    }

    #[test]
    fn test_record_updates_balance() {
        let conn = seeded(AppKind::Finance);
        let recorded = run(
            &conn,
            "record_cash_transaction",
            json!({"cash_account_id": 3, "txn_date": "2026-03-01", "txn_type": "outflow",
                   "amount": 5000, "category": "travel"}),
        );
        assert_eq!(recorded["success"], true);
        let balance: f64 = conn
            .query_row("SELECT balance FROM cash_accounts WHERE id = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(balance, 80_000.0);

        let bad = run(
            &conn,
            "record_cash_transaction",
            json!({"cash_account_id": 3, "txn_date": "2026-03-01", "txn_type": "transfer",
                   "amount": 5000, "category": "travel"}),
        );
        assert_eq!(bad["success"], false);

        let missing = run(
            &conn,
            "record_cash_transaction",
            json!({"cash_account_id": 99, "txn_date": "2026-03-01", "txn_type": "inflow",
                   "amount": 5000, "category": "loan"}),
        );
        assert_eq!(missing["message"], "Cash account #99 not found.");
    }

    #[test]
    fn test_cash_flow_statement() {
        let conn = seeded(AppKind::Finance);
        let statement = run(&conn, "get_cash_flow_statement", json!({}));
        assert_eq!(statement["operating_activities"]["inflows"], 18_000_000.0);
        assert_eq!(statement["operating_activities"]["outflows"], 12_700_000.0);
        assert_eq!(statement["net_cash_change"], 5_300_000.0);

        let operating = run(&conn, "get_operating_cash_flow", json!({}));
        assert_eq!(operating["outflows"]["salaries"], 7_500_000.0);
        // Travel is not an operating category
        assert!(operating["outflows"].get("travel").is_none());
    }

    #[test]
    fn test_receivables_and_threshold() {
        let conn = seeded(AppKind::Finance);
        let aging = run(&conn, "get_accounts_receivable_aging", json!({"as_of": "2026-02-28"}));
        assert_eq!(aging["total_ar"], 6_400_000.0);
        assert_eq!(aging["aging_buckets"]["current_0_30"], 3_200_000.0);
        assert_eq!(aging["aging_buckets"]["days_31_60"], 1_900_000.0);
        assert_eq!(aging["at_risk"], 1_300_000.0);
        let before = run(&conn, "get_accounts_receivable_aging", json!({"as_of": "2025-11-01"}));
        assert_eq!(before["total_ar"], 0.0);

        let quiet = run(&conn, "check_cash_threshold", json!({}));
        assert_eq!(quiet["alert_recorded"], false);

        let alert = run(&conn, "check_cash_threshold", json!({"threshold": 20000000, "recipients": "cfo@finapp.com"}));
        assert_eq!(alert["alert_recorded"], true);
        assert_eq!(alert["runway_days"], 38);
    }

    #[test]
    fn test_payables_aging() {
        let conn = seeded(AppKind::Finance);
        let aging = run(&conn, "get_accounts_payable_aging", json!({"as_of": "2026-02-28"}));
        assert_eq!(aging["total_ap"], 3_600_000.0);
        assert_eq!(aging["aging_buckets"]["due_0_15_days"], 1_500_000.0);
        assert_eq!(aging["aging_buckets"]["due_16_30_days"], 1_100_000.0);
        assert_eq!(aging["aging_buckets"]["overdue_31_60"], 600_000.0);
        assert_eq!(aging["aging_buckets"]["overdue_60_plus"], 400_000.0);
        assert_eq!(aging["overdue"], 1_000_000.0);

        // A month earlier only the January and December bills exist
        let jan = run(&conn, "get_accounts_payable_aging", json!({"as_of": "2026-01-31"}));
        assert_eq!(jan["total_ap"], 1_000_000.0);
        assert_eq!(jan["aging_buckets"]["due_16_30_days"], 600_000.0);
        assert_eq!(jan["aging_buckets"]["overdue_31_60"], 400_000.0);

        let bad = run(&conn, "get_accounts_payable_aging", json!({"as_of": "soon"}));
        assert_eq!(bad["success"], false);
    }
}
