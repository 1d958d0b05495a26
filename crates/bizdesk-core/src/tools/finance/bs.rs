//! Balance sheet: positions, liquidity and leverage as of a date

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::round_to;
use bizdesk_store::time::parse_date;

use crate::tools::fmt::rupees;
use crate::tools::params::str_or;
use crate::tools::{Handler, Kind, Param, ToolSpec};

const AS_OF: Param = Param::opt("as_of_date", Kind::String, "Balance date, default 2026-02-28");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_balance_sheet",
        description: "Full balance sheet as of a date: assets, liabilities and equity.",
        params: &[AS_OF],
        handler: Handler::Sql(get_balance_sheet),
    },
    ToolSpec {
        name: "get_current_assets",
        description: "Cash, receivables, inventory and prepaid expenses.",
        params: &[AS_OF],
        handler: Handler::Sql(get_current_assets),
    },
    ToolSpec {
        name: "get_current_liabilities",
        description: "Payables, accrued salaries and short-term debt.",
        params: &[AS_OF],
        handler: Handler::Sql(get_current_liabilities),
    },
    ToolSpec {
        name: "get_long_term_items",
        description: "Fixed assets net of depreciation, long-term debt and retained earnings.",
        params: &[AS_OF],
        handler: Handler::Sql(get_long_term_items),
    },
    ToolSpec {
        name: "get_current_ratio",
        description: "Current assets over current liabilities, with a health status.",
        params: &[AS_OF],
        handler: Handler::Sql(get_current_ratio),
    },
    ToolSpec {
        name: "get_working_capital",
        description: "Current assets minus current liabilities.",
        params: &[AS_OF],
        handler: Handler::Sql(get_working_capital),
    },
    ToolSpec {
        name: "get_debt_to_equity",
        description: "Total liabilities over total equity, with a leverage status.",
        params: &[AS_OF],
        handler: Handler::Sql(get_debt_to_equity),
    },
    ToolSpec {
        name: "check_balance_sheet_equation",
        description: "Verify assets = liabilities + equity and report any discrepancy.",
        params: &[AS_OF],
        handler: Handler::Sql(check_balance_sheet_equation),
    },
];

/// Signed debit-minus-credit balance of one account category
fn category_balance(conn: &Connection, account_type: &str, category: &str, as_of: &str) -> Result<f64> {
    let bal: f64 = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN t.txn_type = 'debit' THEN t.amount ELSE -t.amount END), 0)
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = ?1 AND a.category = ?2 AND t.txn_date <= ?3",
        params![account_type, category, as_of],
        |r| r.get(0),
    )?;
    Ok(bal)
}

/// Balance-sheet lines as of one date. Credit-normal lines are stored positive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Position {
    pub cash: f64,
    pub receivable: f64,
    pub inventory: f64,
    pub prepaid: f64,
    pub fixed_gross: f64,
    pub depreciation: f64,
    pub payable: f64,
    pub accrued: f64,
    pub short_term_debt: f64,
    pub long_term_debt: f64,
    pub deferred_revenue: f64,
    pub capital: f64,
    pub retained: f64,
}

impl Position {
    pub fn current_assets(&self) -> f64 {
        self.cash + self.receivable + self.inventory + self.prepaid
    }

    pub fn net_fixed(&self) -> f64 {
        self.fixed_gross - self.depreciation
    }

    pub fn total_assets(&self) -> f64 {
        self.current_assets() + self.net_fixed()
    }

    pub fn current_liabilities(&self) -> f64 {
        self.payable + self.accrued + self.short_term_debt
    }

    pub fn total_liabilities(&self) -> f64 {
        self.current_liabilities() + self.long_term_debt + self.deferred_revenue
    }

    pub fn total_equity(&self) -> f64 {
        self.capital + self.retained
    }

    pub fn current_ratio(&self) -> f64 {
        ratio(self.current_assets(), self.current_liabilities())
    }

    pub fn debt_to_equity(&self) -> f64 {
        ratio(self.total_liabilities(), self.total_equity())
    }
}

/// Two-decimal ratio, zero when the denominator is
pub(crate) fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { round_to(num / den, 2) }
}

pub(crate) fn position(conn: &Connection, as_of: &str) -> Result<Position> {
    let asset = |c: &str| category_balance(conn, "asset", c, as_of);
    let credit = |t: &str, c: &str| category_balance(conn, t, c, as_of).map(f64::abs);
    Ok(Position {
        cash: asset("cash")?,
        receivable: asset("receivable")?,
        inventory: asset("inventory")?,
        prepaid: asset("prepaid")?,
        fixed_gross: asset("fixed_asset")?,
        depreciation: asset("depreciation")?.abs(),
        payable: credit("liability", "payable")?,
        accrued: credit("liability", "accrued")?,
        short_term_debt: credit("liability", "short_term_debt")?,
        long_term_debt: credit("liability", "long_term_debt")?,
        deferred_revenue: credit("liability", "deferred_revenue")?,
        capital: credit("equity", "capital")?,
        retained: credit("equity", "retained")?,
    })
}

pub(crate) fn current_ratio_status(ratio: f64) -> &'static str {
    if ratio > 2.0 {
        "Healthy (>2.0)"
    } else if ratio >= 1.5 {
        "Acceptable (1.5-2.0)"
    } else {
        "Low, watch carefully (<1.5)"
    }
}

pub(crate) fn leverage_status(de: f64) -> &'static str {
    if de < 0.5 {
        "Conservative (<0.5)"
    } else if de <= 1.0 {
        "Moderate (0.5-1.0)"
    } else {
        "High leverage (>1.0)"
    }
}

/// `as_of_date`, or None when it is not a date
fn as_of(input: &Value) -> Option<String> {
    let as_of = str_or(input, "as_of_date", "2026-02-28");
    parse_date(as_of).map(|_| as_of.to_string())
}

fn bad_date() -> Value {
    json!({"success": false, "message": "as_of_date must be YYYY-MM-DD."})
}

fn get_balance_sheet(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    let liab_eq = p.total_liabilities() + p.total_equity();
    let balanced = (p.total_assets() - liab_eq).abs() < 1000.0;
    Ok(json!({
        "as_of_date": date,
        "assets": {
            "current_assets": {
                "cash": round_to(p.cash, 2),
                "accounts_receivable": round_to(p.receivable, 2),
                "inventory": round_to(p.inventory, 2),
                "prepaid": round_to(p.prepaid, 2),
                "total": round_to(p.current_assets(), 2),
            },
            "fixed_assets": {
                "gross": round_to(p.fixed_gross, 2),
                "accumulated_depreciation": round_to(p.depreciation, 2),
                "net": round_to(p.net_fixed(), 2),
            },
            "total_assets": round_to(p.total_assets(), 2),
        },
        "liabilities": {
            "current_liabilities": {
                "accounts_payable": round_to(p.payable, 2),
                "accrued_salaries": round_to(p.accrued, 2),
                "short_term_debt": round_to(p.short_term_debt, 2),
                "total": round_to(p.current_liabilities(), 2),
            },
            "long_term": {
                "long_term_debt": round_to(p.long_term_debt, 2),
                "deferred_revenue": round_to(p.deferred_revenue, 2),
            },
            "total_liabilities": round_to(p.total_liabilities(), 2),
        },
        "equity": {
            "share_capital": round_to(p.capital, 2),
            "retained_earnings": round_to(p.retained, 2),
            "total_equity": round_to(p.total_equity(), 2),
        },
        "total_liabilities_and_equity": round_to(liab_eq, 2),
        "balanced": balanced,
        "accounting_check": if balanced { "A = L + E (balanced)" } else { "Balance sheet does not balance" },
    }))
}

fn get_current_assets(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    Ok(json!({
        "as_of_date": date,
        "cash": round_to(p.cash, 2),
        "accounts_receivable": round_to(p.receivable, 2),
        "inventory": round_to(p.inventory, 2),
        "prepaid": round_to(p.prepaid, 2),
        "total_current_assets": round_to(p.current_assets(), 2),
    }))
}

fn get_current_liabilities(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    Ok(json!({
        "as_of_date": date,
        "accounts_payable": round_to(p.payable, 2),
        "accrued_salaries": round_to(p.accrued, 2),
        "short_term_debt": round_to(p.short_term_debt, 2),
        "total_current_liabilities": round_to(p.current_liabilities(), 2),
    }))
}

fn get_long_term_items(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    Ok(json!({
        "as_of_date": date,
        "gross_fixed_assets": round_to(p.fixed_gross, 2),
        "accumulated_depreciation": round_to(p.depreciation, 2),
        "net_fixed_assets": round_to(p.net_fixed(), 2),
        "long_term_debt": round_to(p.long_term_debt, 2),
        "retained_earnings": round_to(p.retained, 2),
    }))
}

fn get_current_ratio(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    let ratio = p.current_ratio();
    Ok(json!({
        "as_of_date": date,
        "current_assets": round_to(p.current_assets(), 2),
        "current_liabilities": round_to(p.current_liabilities(), 2),
        "current_ratio": ratio,
        "benchmark": 2.0,
        "status": current_ratio_status(ratio),
    }))
}

fn get_working_capital(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    let wc = p.current_assets() - p.current_liabilities();
    Ok(json!({
        "as_of_date": date,
        "current_assets": round_to(p.current_assets(), 2),
        "current_liabilities": round_to(p.current_liabilities(), 2),
        "working_capital": round_to(wc, 2),
        "status": if wc > 0.0 {
            "Positive: sufficient short-term liquidity"
        } else {
            "Negative working capital"
        },
    }))
}

fn get_debt_to_equity(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    let de = p.debt_to_equity();
    Ok(json!({
        "as_of_date": date,
        "total_liabilities": round_to(p.total_liabilities(), 2),
        "total_equity": round_to(p.total_equity(), 2),
        "debt_to_equity": de,
        "benchmark": 0.5,
        "status": leverage_status(de),
    }))
}

fn check_balance_sheet_equation(conn: &Connection, input: &Value) -> Result<Value> {
    let Some(date) = as_of(input) else {
        return Ok(bad_date());
    };
    let p = position(conn, &date)?;
    let assets = round_to(p.total_assets(), 2);
    let liab_eq = round_to(p.total_liabilities() + p.total_equity(), 2);
    let diff = round_to((assets - liab_eq).abs(), 2);
    let balanced = diff < 1.0;
    Ok(json!({
        "as_of_date": date,
        "total_assets": assets,
        "total_liabilities_plus_equity": liab_eq,
        "discrepancy": diff,
        "balanced": balanced,
        "result": if balanced {
            "Balance sheet equation holds.".to_string()
        } else {
            format!("Out of balance by {}", rupees(diff))
        },
    }))
}
