//! Profit and loss: income statement, margins, EBITDA, growth

use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{num, query_rows, round_to, text};
use bizdesk_store::time::{format_date, parse_date};

use crate::tools::params::{i64_or, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub(crate) const OPEX_CATEGORIES: &[&str] = &["salary", "overhead", "marketing", "travel", "software"];

const DATE_FROM: Param = Param::opt("date_from", Kind::String, "Start date, default 2026-02-01");
const DATE_TO: Param = Param::opt("date_to", Kind::String, "End date, default 2026-02-28");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_income_statement",
        description: "Full P&L for a period: revenue, COGS, gross profit, opex, EBITDA, net income.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_income_statement),
    },
    ToolSpec {
        name: "get_revenue_summary",
        description: "Revenue by category with each category's share of the total.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_revenue_summary),
    },
    ToolSpec {
        name: "get_cogs_breakdown",
        description: "Cost of goods sold by department for a period.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_cogs_breakdown),
    },
    ToolSpec {
        name: "get_operating_expenses",
        description: "Operating expenses by category and department for a period.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_operating_expenses),
    },
    ToolSpec {
        name: "get_gross_margin",
        description: "Gross margin % for a period against the period of equal length before it.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_gross_margin),
    },
    ToolSpec {
        name: "get_ebitda",
        description: "EBITDA with the depreciation, interest and tax addbacks.",
        params: &[DATE_FROM, DATE_TO],
        handler: Handler::Sql(get_ebitda),
    },
    ToolSpec {
        name: "get_period_comparison",
        description: "Side-by-side P&L for a current and a prior period with % changes.",
        params: &[
            Param::opt("current_from", Kind::String, "Default 2026-02-01"),
            Param::opt("current_to", Kind::String, "Default 2026-02-28"),
            Param::opt("prior_from", Kind::String, "Default 2026-01-01"),
            Param::opt("prior_to", Kind::String, "Default 2026-01-31"),
        ],
        handler: Handler::Sql(get_period_comparison),
    },
    ToolSpec {
        name: "get_revenue_growth_rate",
        description: "Month-over-month revenue growth for the last N months.",
        params: &[Param::opt("periods", Kind::Integer, "Number of months, default 3")],
        handler: Handler::Sql(get_revenue_growth_rate),
    },
];

fn period(input: &Value) -> (String, String) {
    (
        str_or(input, "date_from", "2026-02-01").to_string(),
        str_or(input, "date_to", "2026-02-28").to_string(),
    )
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { round_to(part / whole * 100.0, 2) }
}

/// Sum of ledger amounts for one account type, optionally one category
pub(crate) fn sum_type(conn: &Connection, account_type: &str, from: &str, to: &str, category: Option<&str>) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(t.amount), 0)
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = ?1 AND t.txn_date BETWEEN ?2 AND ?3
           AND (?4 IS NULL OR t.category = ?4)",
        params![account_type, from, to, category],
        |r| r.get(0),
    )?;
    Ok(total)
}

/// Headline P&L lines for one period
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Profit {
    pub revenue: f64,
    pub cogs: f64,
    pub opex: f64,
    pub depreciation: f64,
    pub interest: f64,
    pub taxes: f64,
}

impl Profit {
    pub fn gross(&self) -> f64 {
        self.revenue - self.cogs
    }

    pub fn ebitda(&self) -> f64 {
        self.gross() - self.opex
    }

    pub fn ebit(&self) -> f64 {
        self.ebitda() - self.depreciation
    }

    pub fn net_income(&self) -> f64 {
        self.ebit() - self.interest
    }
}

pub(crate) fn profit(conn: &Connection, from: &str, to: &str) -> Result<Profit> {
    let mut opex = 0.0;
    for category in OPEX_CATEGORIES {
        opex += sum_type(conn, "expense", from, to, Some(category))?;
    }
    Ok(Profit {
        revenue: sum_type(conn, "revenue", from, to, None)?,
        cogs: sum_type(conn, "expense", from, to, Some("cogs"))?,
        opex,
        depreciation: sum_type(conn, "expense", from, to, Some("depreciation"))?,
        interest: sum_type(conn, "expense", from, to, Some("interest"))?,
        taxes: sum_type(conn, "expense", from, to, Some("tax"))?,
    })
}

fn get_income_statement(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let p = profit(conn, &from, &to)?;
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "revenue": round_to(p.revenue, 2),
        "cogs": round_to(p.cogs, 2),
        "gross_profit": round_to(p.gross(), 2),
        "gross_margin_pct": pct(p.gross(), p.revenue),
        "operating_expenses": round_to(p.opex, 2),
        "ebitda": round_to(p.ebitda(), 2),
        "ebitda_margin_pct": pct(p.ebitda(), p.revenue),
        "depreciation": round_to(p.depreciation, 2),
        "ebit": round_to(p.ebit(), 2),
        "interest_expense": round_to(p.interest, 2),
        "net_income": round_to(p.net_income(), 2),
        "net_margin_pct": pct(p.net_income(), p.revenue),
    }))
}

fn get_revenue_summary(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let rows = query_rows(
        conn,
        "SELECT t.category, SUM(t.amount) AS total
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'revenue' AND t.txn_date BETWEEN ?1 AND ?2
         GROUP BY t.category ORDER BY total DESC",
        params![from, to],
    )?;
    let grand: f64 = rows.iter().map(|r| num(r, "total")).sum();

    let mut breakdown = Map::new();
    for row in &rows {
        let amount = num(row, "total");
        let share = if grand == 0.0 { 0.0 } else { round_to(amount / grand * 100.0, 1) };
        breakdown.insert(
            text(row, "category").to_string(),
            json!({"amount": amount, "pct_of_revenue": share}),
        );
    }
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "total_revenue": round_to(grand, 2),
        "breakdown": breakdown,
    }))
}

fn get_cogs_breakdown(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let items = query_rows(
        conn,
        "SELECT t.category, t.department, SUM(t.amount) AS total, COUNT(*) AS transactions
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'expense' AND t.category = 'cogs' AND t.txn_date BETWEEN ?1 AND ?2
         GROUP BY t.category, t.department ORDER BY total DESC",
        params![from, to],
    )?;
    let total: f64 = items.iter().map(|i| num(i, "total")).sum();
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "total_cogs": round_to(total, 2),
        "breakdown": items,
    }))
}

fn get_operating_expenses(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let items = query_rows(
        conn,
        "SELECT t.category, t.department, SUM(t.amount) AS total
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'expense' AND t.category != 'cogs' AND t.txn_date BETWEEN ?1 AND ?2
         GROUP BY t.category, t.department ORDER BY total DESC",
        params![from, to],
    )?;
    let total: f64 = items.iter().map(|i| num(i, "total")).sum();
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "total_opex": round_to(total, 2),
        "breakdown": items,
    }))
}

fn get_gross_margin(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let (Some(start), Some(end)) = (parse_date(&from), parse_date(&to)) else {
        return Ok(json!({"success": false, "message": "Dates must be YYYY-MM-DD."}));
    };

    let p = profit(conn, &from, &to)?;
    let gm = pct(p.gross(), p.revenue);

    // Prior window of the same length, ending the day before `start`
    let gap = (end - start).num_days() + 1;
    let prior_to = format_date(start - Duration::days(1));
    let prior_from = format_date(start - Duration::days(gap));
    let prior = profit(conn, &prior_from, &prior_to)?;
    let prior_gm = pct(prior.gross(), prior.revenue);

    Ok(json!({
        "period": format!("{} to {}", from, to),
        "revenue": round_to(p.revenue, 2),
        "cogs": round_to(p.cogs, 2),
        "gross_profit": round_to(p.gross(), 2),
        "gross_margin_pct": gm,
        "prior_period": format!("{} to {}", prior_from, prior_to),
        "prior_period_gm_pct": prior_gm,
        "change_pp": round_to(gm - prior_gm, 2),
    }))
}

fn get_ebitda(conn: &Connection, input: &Value) -> Result<Value> {
    let (from, to) = period(input);
    let p = profit(conn, &from, &to)?;
    Ok(json!({
        "period": format!("{} to {}", from, to),
        "revenue": round_to(p.revenue, 2),
        "cogs": round_to(p.cogs, 2),
        "operating_expenses": round_to(p.opex, 2),
        "ebit": round_to(p.ebit(), 2),
        "addback_depreciation": round_to(p.depreciation, 2),
        "addback_interest": round_to(p.interest, 2),
        "addback_taxes": round_to(p.taxes, 2),
        "ebitda": round_to(p.ebitda(), 2),
        "ebitda_margin_pct": pct(p.ebitda(), p.revenue),
    }))
}

fn summary(p: &Profit) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("revenue".into(), json!(round_to(p.revenue, 2)));
    m.insert("cogs".into(), json!(round_to(p.cogs, 2)));
    m.insert("gross_profit".into(), json!(round_to(p.gross(), 2)));
    m.insert("gross_margin_pct".into(), json!(pct(p.gross(), p.revenue)));
    m.insert("opex".into(), json!(round_to(p.opex, 2)));
    m.insert("ebitda".into(), json!(round_to(p.ebitda(), 2)));
    m.insert("ebitda_margin_pct".into(), json!(pct(p.ebitda(), p.revenue)));
    m
}

fn get_period_comparison(conn: &Connection, input: &Value) -> Result<Value> {
    let current_from = str_or(input, "current_from", "2026-02-01");
    let current_to = str_or(input, "current_to", "2026-02-28");
    let prior_from = str_or(input, "prior_from", "2026-01-01");
    let prior_to = str_or(input, "prior_to", "2026-01-31");

    let current = summary(&profit(conn, current_from, current_to)?);
    let prior = summary(&profit(conn, prior_from, prior_to)?);

    let mut changes = Map::new();
    for (key, value) in &current {
        let now = value.as_f64().unwrap_or(0.0);
        let before = prior.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let change = if before == 0.0 { 0.0 } else { round_to((now - before) / before * 100.0, 1) };
        changes.insert(key.clone(), json!(change));
    }

    Ok(json!({
        "current_period": format!("{} to {}", current_from, current_to),
        "current": current,
        "prior_period": format!("{} to {}", prior_from, prior_to),
        "prior": prior,
        "changes": changes,
    }))
}

/// Monthly revenue, oldest first
pub(crate) fn monthly_revenue(conn: &Connection, months: i64) -> Result<Vec<(String, f64)>> {
    let rows = query_rows(
        conn,
        "SELECT substr(t.txn_date, 1, 7) AS month, SUM(t.amount) AS revenue
         FROM transactions t JOIN accounts a ON t.account_id = a.id
         WHERE a.type = 'revenue'
         GROUP BY month ORDER BY month DESC LIMIT ?1",
        params![months],
    )?;
    Ok(rows
        .iter()
        .rev()
        .map(|r| (text(r, "month").to_string(), num(r, "revenue")))
        .collect())
}

fn get_revenue_growth_rate(conn: &Connection, input: &Value) -> Result<Value> {
    let periods = i64_or(input, "periods", 3)?.clamp(1, 36);
    let months = monthly_revenue(conn, periods)?;
    if months.is_empty() {
        return Ok(json!([{"message": "Insufficient data for growth rate calculation."}]));
    }

    let mut out = Vec::with_capacity(months.len());
    let mut prev: Option<f64> = None;
    for (month, revenue) in months {
        let growth = match prev {
            Some(p) if p != 0.0 => json!(round_to((revenue - p) / p * 100.0, 1)),
            _ => Value::Null,
        };
        out.push(json!({"month": month, "revenue": revenue, "growth_mom_pct": growth}));
        prev = Some(revenue);
    }
    Ok(Value::Array(out))
}
