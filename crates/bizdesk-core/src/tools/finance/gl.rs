//! General ledger: journal entries, balances, trial balance

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{num, query_one, query_rows, round_to, text};
use bizdesk_store::time::parse_date;

use crate::tools::fmt::inr;
use crate::tools::params::{i64_or, opt_str, req_f64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const ACCOUNT_TYPES: &[&str] = &["asset", "liability", "equity", "revenue", "expense"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "post_transaction",
        description: "Post a journal entry. txn_type: debit or credit. txn_date: YYYY-MM-DD.",
        params: &[
            Param::req("txn_date", Kind::String, "Entry date, YYYY-MM-DD"),
            Param::req("account_code", Kind::String, "Account code, e.g. 6020"),
            Param::req("description", Kind::String, "Narration"),
            Param::req("amount", Kind::Number, "Positive amount"),
            Param::req("txn_type", Kind::String, "debit or credit"),
            Param::opt("category", Kind::String, "Category tag"),
            Param::opt("department", Kind::String, "Department"),
            Param::opt("reference", Kind::String, "External reference"),
            Param::opt("posted_by", Kind::String, "Who posted the entry"),
        ],
        handler: Handler::Sql(post_transaction),
    },
    ToolSpec {
        name: "get_account_balance",
        description: "Current balance of an account by code. Assets and expenses are debit-normal.",
        params: &[Param::req("account_code", Kind::String, "Account code")],
        handler: Handler::Sql(get_account_balance),
    },
    ToolSpec {
        name: "list_transactions",
        description: "List ledger transactions with optional filters. Dates: YYYY-MM-DD.",
        params: &[
            Param::opt("date_from", Kind::String, "Start date, default 2026-01-01"),
            Param::opt("date_to", Kind::String, "End date, default 2026-12-31"),
            Param::opt("account_code", Kind::String, "Only this account"),
            Param::opt("category", Kind::String, "Only this category"),
            Param::opt("department", Kind::String, "Department name fragment"),
            Param::opt("limit", Kind::Integer, "Maximum rows, default 50"),
        ],
        handler: Handler::Sql(list_transactions),
    },
    ToolSpec {
        name: "get_chart_of_accounts",
        description: "Chart of accounts. account_type: asset/liability/equity/revenue/expense/all.",
        params: &[Param::opt("account_type", Kind::String, "Account type filter, default all")],
        handler: Handler::Sql(get_chart_of_accounts),
    },
    ToolSpec {
        name: "get_trial_balance",
        description: "Trial balance as of a date (YYYY-MM-DD).",
        params: &[Param::opt("as_of_date", Kind::String, "Cut-off date, default 2026-02-28")],
        handler: Handler::Sql(get_trial_balance),
    },
    ToolSpec {
        name: "reconcile_account",
        description: "Compare the GL balance of an account with an expected subledger balance.",
        params: &[
            Param::req("account_code", Kind::String, "Account code"),
            Param::req("expected_balance", Kind::Number, "Balance according to the subledger"),
        ],
        handler: Handler::Sql(reconcile_account),
    },
    ToolSpec {
        name: "get_department_expenses",
        description: "Expense totals for a department in a date range, broken down by category.",
        params: &[
            Param::req("department", Kind::String, "Department name"),
            Param::opt("date_from", Kind::String, "Start date, default 2026-01-01"),
            Param::opt("date_to", Kind::String, "End date, default 2026-12-31"),
        ],
        handler: Handler::Sql(get_department_expenses),
    },
    ToolSpec {
        name: "get_revenue_by_category",
        description: "Revenue by category for a period, with a TOTAL row.",
        params: &[
            Param::opt("date_from", Kind::String, "Start date, default 2026-02-01"),
            Param::opt("date_to", Kind::String, "End date, default 2026-02-28"),
        ],
        handler: Handler::Sql(get_revenue_by_category),
    },
];

fn failure(message: impl Into<String>) -> Value {
    json!({"success": false, "message": message.into()})
}

fn post_transaction(conn: &Connection, input: &Value) -> Result<Value> {
    let txn_date = req_str(input, "txn_date")?;
    let code = req_str(input, "account_code")?;
    let description = req_str(input, "description")?;
    let amount = req_f64(input, "amount")?;
    let txn_type = req_str(input, "txn_type")?.to_lowercase();

    if txn_type != "debit" && txn_type != "credit" {
        return Ok(failure("txn_type must be 'debit' or 'credit'"));
    }
    if amount <= 0.0 {
        return Ok(failure("amount must be positive"));
    }
    if parse_date(txn_date).is_none() {
        return Ok(failure(format!("Invalid txn_date '{}'. Use YYYY-MM-DD.", txn_date)));
    }

    let account: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, name FROM accounts WHERE code = ?1 AND is_active = 1",
            params![code],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((account_id, account_name)) = account else {
        return Ok(failure(format!("Account code '{}' not found.", code)));
    };

    conn.execute(
        "INSERT INTO transactions
            (txn_date, account_id, description, amount, txn_type, category, department, reference, posted_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            txn_date,
            account_id,
            description,
            amount,
            txn_type,
            str_or(input, "category", ""),
            str_or(input, "department", ""),
            str_or(input, "reference", ""),
            str_or(input, "posted_by", ""),
        ],
    )?;
    let txn_id = conn.last_insert_rowid();

    Ok(json!({
        "success": true,
        "transaction_id": txn_id,
        "account": account_name,
        "amount": amount,
        "type": txn_type,
        "message": format!("Transaction #{} posted to '{}' successfully.", txn_id, account_name),
    }))
}

/// Balance of one account, signed by its normal side
pub(crate) fn account_balance(conn: &Connection, code: &str) -> Result<Option<Value>> {
    let Some(account) = query_one(
        conn,
        "SELECT id, code, name, type, category FROM accounts WHERE code = ?1",
        params![code],
    )?
    else {
        return Ok(None);
    };

    let totals = query_one(
        conn,
        "SELECT COALESCE(SUM(CASE WHEN txn_type = 'debit' THEN amount END), 0) AS debits,
                COALESCE(SUM(CASE WHEN txn_type = 'credit' THEN amount END), 0) AS credits,
                COUNT(*) AS txn_count
         FROM transactions WHERE account_id = ?1",
        params![account["id"].as_i64()],
    )?
    .unwrap_or_else(|| json!({}));

    let debits = num(&totals, "debits");
    let credits = num(&totals, "credits");
    let balance = match text(&account, "type") {
        "asset" | "expense" => debits - credits,
        _ => credits - debits,
    };

    Ok(Some(json!({
        "found": true,
        "code": account["code"],
        "name": account["name"],
        "type": account["type"],
        "category": account["category"],
        "total_debits": debits,
        "total_credits": credits,
        "balance": round_to(balance, 2),
        "transaction_count": totals["txn_count"],
    })))
}

fn get_account_balance(conn: &Connection, input: &Value) -> Result<Value> {
    let code = req_str(input, "account_code")?;
    Ok(account_balance(conn, code)?.unwrap_or_else(|| {
        json!({"found": false, "message": format!("Account '{}' not found.", code)})
    }))
}

fn list_transactions(conn: &Connection, input: &Value) -> Result<Value> {
    let date_from = str_or(input, "date_from", "2026-01-01");
    let date_to = str_or(input, "date_to", "2026-12-31");
    let limit = i64_or(input, "limit", 50)?.clamp(1, 500);

    let mut sql = String::from(
        "SELECT t.id, t.txn_date, t.description, t.amount, t.txn_type, t.category,
                t.department, t.reference, a.code, a.name AS account_name
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE t.txn_date BETWEEN ?1 AND ?2",
    );
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(date_from.to_string()), Box::new(date_to.to_string())];

    if let Some(code) = opt_str(input, "account_code") {
        args.push(Box::new(code.to_string()));
        sql.push_str(&format!(" AND a.code = ?{}", args.len()));
    }
    if let Some(category) = opt_str(input, "category") {
        args.push(Box::new(category.to_string()));
        sql.push_str(&format!(" AND t.category = ?{}", args.len()));
    }
    if let Some(department) = opt_str(input, "department") {
        args.push(Box::new(format!("%{}%", department)));
        sql.push_str(&format!(" AND t.department LIKE ?{}", args.len()));
    }
    sql.push_str(&format!(" ORDER BY t.txn_date DESC, t.id DESC LIMIT {}", limit));

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No transactions found matching filters."}]));
    }
    Ok(Value::Array(rows))
}

fn get_chart_of_accounts(conn: &Connection, input: &Value) -> Result<Value> {
    let account_type = str_or(input, "account_type", "all").to_lowercase();
    let rows = if account_type == "all" {
        query_rows(
            conn,
            "SELECT id, code, name, type, category, department FROM accounts
             WHERE is_active = 1 ORDER BY code",
            [],
        )?
    } else {
        if !ACCOUNT_TYPES.contains(&account_type.as_str()) {
            return Ok(json!([{
                "message": format!(
                    "Unknown account type '{}'. Use one of: {}, all.",
                    account_type,
                    ACCOUNT_TYPES.join(", ")
                )
            }]));
        }
        query_rows(
            conn,
            "SELECT id, code, name, type, category, department FROM accounts
             WHERE is_active = 1 AND type = ?1 ORDER BY code",
            params![account_type],
        )?
    };
    if rows.is_empty() {
        return Ok(json!([{"message": "No accounts found."}]));
    }
    Ok(Value::Array(rows))
}

fn get_trial_balance(conn: &Connection, input: &Value) -> Result<Value> {
    let as_of = str_or(input, "as_of_date", "2026-02-28");
    let accounts = query_rows(
        conn,
        "SELECT a.code, a.name, a.type,
                COALESCE(SUM(CASE WHEN t.txn_type = 'debit' THEN t.amount END), 0) AS debits,
                COALESCE(SUM(CASE WHEN t.txn_type = 'credit' THEN t.amount END), 0) AS credits
         FROM accounts a
         LEFT JOIN transactions t ON a.id = t.account_id AND t.txn_date <= ?1
         WHERE a.is_active = 1
         GROUP BY a.id, a.code, a.name, a.type
         ORDER BY a.code",
        params![as_of],
    )?;

    let total_debits: f64 = accounts.iter().map(|a| num(a, "debits")).sum();
    let total_credits: f64 = accounts.iter().map(|a| num(a, "credits")).sum();
    Ok(json!({
        "as_of_date": as_of,
        "accounts": accounts,
        "total_debits": round_to(total_debits, 2),
        "total_credits": round_to(total_credits, 2),
        "balanced": (total_debits - total_credits).abs() < 1.0,
    }))
}

fn reconcile_account(conn: &Connection, input: &Value) -> Result<Value> {
    let code = req_str(input, "account_code")?;
    let expected = req_f64(input, "expected_balance")?;
    let Some(balance) = account_balance(conn, code)? else {
        return Ok(json!({"found": false, "message": format!("Account '{}' not found.", code)}));
    };

    let gl_balance = num(&balance, "balance");
    let discrepancy = round_to(gl_balance - expected, 2);
    let reconciled = discrepancy.abs() < 1.0;
    Ok(json!({
        "account_code": code,
        "account_name": balance["name"],
        "gl_balance": gl_balance,
        "expected_balance": expected,
        "discrepancy": discrepancy,
        "status": if reconciled { "RECONCILED" } else { "DISCREPANCY FOUND" },
        "message": if reconciled {
            "Account reconciled, no discrepancy.".to_string()
        } else {
            format!("Discrepancy of {} found. Please investigate.", inr(discrepancy.abs()))
        },
    }))
}

fn get_department_expenses(conn: &Connection, input: &Value) -> Result<Value> {
    let department = req_str(input, "department")?;
    let date_from = str_or(input, "date_from", "2026-01-01");
    let date_to = str_or(input, "date_to", "2026-12-31");

    let breakdown = query_rows(
        conn,
        "SELECT t.category, SUM(t.amount) AS total, COUNT(*) AS count
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'expense' AND t.department LIKE ?1 AND t.txn_date BETWEEN ?2 AND ?3
         GROUP BY t.category ORDER BY total DESC",
        params![format!("%{}%", department), date_from, date_to],
    )?;
    let total: f64 = breakdown.iter().map(|b| num(b, "total")).sum();

    Ok(json!({
        "department": department,
        "date_from": date_from,
        "date_to": date_to,
        "total_expenses": round_to(total, 2),
        "breakdown": breakdown,
        "message": format!("Total expenses for {}: {}", department, inr(total)),
    }))
}

fn get_revenue_by_category(conn: &Connection, input: &Value) -> Result<Value> {
    let date_from = str_or(input, "date_from", "2026-02-01");
    let date_to = str_or(input, "date_to", "2026-02-28");

    let mut rows = query_rows(
        conn,
        "SELECT t.category, SUM(t.amount) AS total, COUNT(*) AS count
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'revenue' AND t.txn_date BETWEEN ?1 AND ?2
         GROUP BY t.category ORDER BY total DESC",
        params![date_from, date_to],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No revenue transactions found."}]));
    }

    let grand_total: f64 = rows.iter().map(|r| num(r, "total")).sum();
    rows.push(json!({"category": "TOTAL", "total": round_to(grand_total, 2), "count": null}));
    Ok(Value::Array(rows))
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
    fn test_balances_follow_normal_side() {
        let conn = seeded(AppKind::Finance);
        let revenue = run(&conn, "get_account_balance", json!({"account_code": "4002"}));
        // SaaS: 8.5M + 2.2M + 10.2M + 9.8M credits
        assert_eq!(revenue["balance"], 30_700_000.0);

        let marketing = run(&conn, "get_account_balance", json!({"account_code": "6020"}));
        assert_eq!(marketing["balance"], 2_600_000.0);

        let missing = run(&conn, "get_account_balance", json!({"account_code": "9999"}));
        assert_eq!(missing["found"], false);
    }

    #[test]
    fn test_post_and_list() {
        let conn = seeded(AppKind::Finance);
        let bad = run(
            &conn,
            "post_transaction",
            json!({"txn_date": "2026-03-01", "account_code": "6020", "description": "x", "amount": 10, "txn_type": "sideways"}),
        );
        assert_eq!(bad["success"], false);

        let posted = run(
            &conn,
            "post_transaction",
            json!({"txn_date": "2026-03-01", "account_code": "6020", "description": "Meta ads", "amount": 50000,
                   "txn_type": "debit", "category": "marketing", "department": "Marketing"}),
        );
        assert_eq!(posted["success"], true);
        assert_eq!(posted["account"], "Marketing & Advertising");

        let listed = run(&conn, "list_transactions", json!({"account_code": "6020", "limit": 1}));
        assert_eq!(listed[0]["description"], "Meta ads");

        let none = run(&conn, "list_transactions", json!({"date_from": "2030-01-01", "date_to": "2030-12-31"}));
        assert!(none[0]["message"].is_string());
    }

    #[test]
    fn test_trial_balance_and_reconcile() {
        let conn = seeded(AppKind::Finance);
        let tb = run(&conn, "get_trial_balance", json!({"as_of_date": "2026-02-28"}));
        assert_eq!(tb["accounts"].as_array().unwrap().len(), 30);
        assert!(tb["total_credits"].as_f64().unwrap() > 0.0);

        let ok = run(&conn, "reconcile_account", json!({"account_code": "6020", "expected_balance": 2_600_000.5}));
        assert_eq!(ok["status"], "RECONCILED");
        let off = run(&conn, "reconcile_account", json!({"account_code": "6020", "expected_balance": 2_500_000}));
        assert_eq!(off["status"], "DISCREPANCY FOUND");
        assert_eq!(off["discrepancy"], 100_000.0);
    }

    #[test]
    fn test_chart_and_reports() {
        let conn = seeded(AppKind::Finance);
        let revenue = run(&conn, "get_chart_of_accounts", json!({"account_type": "revenue"}));
        assert_eq!(revenue.as_array().unwrap().len(), 4);

        let feb = run(&conn, "get_revenue_by_category", json!({}));
        let rows = feb.as_array().unwrap();
        let total = rows.last().unwrap();
        assert_eq!(total["category"], "TOTAL");
        assert_eq!(total["total"], 24_000_000.0);

        let admin = run(&conn, "get_department_expenses", json!({"department": "admin", "date_from": "2026-02-01", "date_to": "2026-02-28"}));
        assert_eq!(admin["total_expenses"], 1_400_000.0);
    }
}
