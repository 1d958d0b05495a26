//! KPI dashboard, ratio families, snapshots and benchmarks

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{Connection, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{num, query_rows, round_to};
use bizdesk_store::time::parse_date;

use super::bs::{self, Position, leverage_status, ratio};
use super::pl::{self, Profit};
use crate::tools::fmt::inr;
use crate::tools::params::{i64_or, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

/// Share of EBITDA kept after tax, used for the approximate net margin
const AFTER_TAX: f64 = 0.75;

const INDUSTRY: &str = "SaaS / Technology";

const PERIOD: Param = Param::opt("period", Kind::String, "Month as YYYY-MM, default 2026-02");
const AS_OF: Param = Param::opt("as_of_date", Kind::String, "Balance date, default 2026-02-28");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_all_kpis",
        description: "KPI dashboard for a month: profitability, liquidity and leverage. Saves a snapshot.",
        params: &[PERIOD],
        handler: Handler::Sql(get_all_kpis),
    },
    ToolSpec {
        name: "get_profitability_ratios",
        description: "Gross, EBITDA and approximate net margins for a month.",
        params: &[PERIOD],
        handler: Handler::Sql(get_profitability_ratios),
    },
    ToolSpec {
        name: "get_liquidity_ratios",
        description: "Current, quick and cash ratios as of a date.",
        params: &[AS_OF],
        handler: Handler::Sql(get_liquidity_ratios),
    },
    ToolSpec {
        name: "get_efficiency_ratios",
        description: "Asset turnover, receivables turnover, DSO and DPO, annualised from a month.",
        params: &[PERIOD],
        handler: Handler::Sql(get_efficiency_ratios),
    },
    ToolSpec {
        name: "get_leverage_ratios",
        description: "Debt-to-equity, debt-to-assets and interest coverage as of a date.",
        params: &[AS_OF],
        handler: Handler::Sql(get_leverage_ratios),
    },
    ToolSpec {
        name: "get_kpi_trend",
        description: "Saved values of one KPI across the latest N snapshots, oldest first.",
        params: &[
            Param::opt("metric_name", Kind::String, "Metric, default gross_margin_pct"),
            Param::opt("periods", Kind::Integer, "Number of snapshots, default 3"),
        ],
        handler: Handler::Sql(get_kpi_trend),
    },
    ToolSpec {
        name: "get_performance_vs_benchmark",
        description: "Company KPIs for a month against SaaS industry benchmarks.",
        params: &[PERIOD],
        handler: Handler::Sql(get_performance_vs_benchmark),
    },
    ToolSpec {
        name: "send_weekly_kpi_digest_email",
        description: "Log a KPI digest for the executive distribution list.",
        params: &[
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
            PERIOD,
        ],
        handler: Handler::Sql(send_weekly_kpi_digest_email),
    },
];

/// First and last day of a `YYYY-MM` month
pub(crate) fn month_bounds(period: &str) -> Option<(NaiveDate, NaiveDate)> {
    let first = parse_date(&format!("{}-01", period))?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
    };
    Some((first, next - Duration::days(1)))
}

fn bad_period(period: &str) -> Value {
    json!({"success": false, "message": format!("Period '{}' must be YYYY-MM.", period)})
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { round_to(part / whole * 100.0, 2) }
}

/// Month figures behind the dashboard
struct Month {
    period: String,
    profit: Profit,
    position: Position,
}

impl Month {
    fn load(conn: &Connection, period: &str) -> Result<Option<Month>> {
        let Some((first, last)) = month_bounds(period) else {
            return Ok(None);
        };
        let (from, to) = (first.to_string(), last.to_string());
        Ok(Some(Month {
            period: period.to_string(),
            profit: pl::profit(conn, &from, &to)?,
            position: bs::position(conn, &to)?,
        }))
    }

    fn gross_margin(&self) -> f64 {
        pct(self.profit.gross(), self.profit.revenue)
    }

    fn ebitda_margin(&self) -> f64 {
        pct(self.profit.ebitda(), self.profit.revenue)
    }

    fn net_margin(&self) -> f64 {
        pct(self.profit.ebitda() * AFTER_TAX, self.profit.revenue)
    }

    fn dashboard(&self) -> Value {
        let cr = self.position.current_ratio();
        let de = self.position.debt_to_equity();
        json!({
            "period": self.period,
            "profitability": {
                "revenue": round_to(self.profit.revenue, 2),
                "gross_margin_pct": self.gross_margin(),
                "ebitda_margin_pct": self.ebitda_margin(),
                "net_margin_pct": self.net_margin(),
            },
            "liquidity": {
                "current_ratio": cr,
                "status": if cr > 2.0 { "Healthy" } else if cr > 1.5 { "Watch" } else { "Low" },
            },
            "leverage": {
                "debt_to_equity": de,
                "status": leverage_status(de),
            },
        })
    }

    fn save_snapshot(&self, conn: &Connection) -> Result<()> {
        let metrics = [
            ("gross_margin_pct", self.gross_margin()),
            ("ebitda_margin_pct", self.ebitda_margin()),
            ("current_ratio", self.position.current_ratio()),
            ("debt_to_equity", self.position.debt_to_equity()),
        ];
        let tx = conn.unchecked_transaction()?;
        for (name, value) in metrics {
            tx.execute(
                "INSERT INTO kpi_snapshots (metric_name, metric_value, period) VALUES (?1, ?2, ?3)",
                params![name, value, self.period],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn get_all_kpis(conn: &Connection, input: &Value) -> Result<Value> {
    let period = str_or(input, "period", "2026-02");
    let Some(month) = Month::load(conn, period)? else {
        return Ok(bad_period(period));
    };
    month.save_snapshot(conn)?;
    Ok(month.dashboard())
}

fn get_profitability_ratios(conn: &Connection, input: &Value) -> Result<Value> {
    let period = str_or(input, "period", "2026-02");
    let Some(month) = Month::load(conn, period)? else {
        return Ok(bad_period(period));
    };
    let p = &month.profit;
    Ok(json!({
        "period": period,
        "revenue": round_to(p.revenue, 2),
        "gross_profit": round_to(p.gross(), 2),
        "gross_margin_pct": month.gross_margin(),
        "ebitda": round_to(p.ebitda(), 2),
        "ebitda_margin_pct": month.ebitda_margin(),
        "net_income_approx": round_to(p.ebitda() * AFTER_TAX, 2),
        "net_margin_pct": month.net_margin(),
    }))
}

fn get_liquidity_ratios(conn: &Connection, input: &Value) -> Result<Value> {
    let as_of = str_or(input, "as_of_date", "2026-02-28");
    if parse_date(as_of).is_none() {
        return Ok(json!({"success": false, "message": "as_of_date must be YYYY-MM-DD."}));
    }
    let p = bs::position(conn, as_of)?;
    let cl = p.current_liabilities();
    let cr = ratio(p.current_assets(), cl);
    let qr = ratio(p.current_assets() - p.inventory, cl);
    Ok(json!({
        "as_of_date": as_of,
        "current_ratio": cr,
        "quick_ratio": qr,
        "cash_ratio": ratio(p.cash, cl),
        "benchmarks": {"current_ratio": 2.0, "quick_ratio": 1.0, "cash_ratio": 0.5},
        "status": {
            "current_ratio": if cr > 2.0 { "green" } else if cr > 1.5 { "amber" } else { "red" },
            "quick_ratio": if qr > 1.0 { "green" } else { "red" },
        },
    }))
}

fn get_efficiency_ratios(conn: &Connection, input: &Value) -> Result<Value> {
    let period = str_or(input, "period", "2026-02");
    let Some(month) = Month::load(conn, period)? else {
        return Ok(bad_period(period));
    };
    let revenue = month.profit.revenue * 12.0;
    let cogs = month.profit.cogs * 12.0;
    let p = &month.position;

    let days = |balance: f64, flow: f64| if flow == 0.0 { 0.0 } else { round_to(balance / flow * 365.0, 1) };
    Ok(json!({
        "period": period,
        "asset_turnover": ratio(revenue, p.total_assets()),
        "receivables_turnover": ratio(revenue, p.receivable),
        "dso_days": days(p.receivable, revenue),
        "dpo_days": days(p.payable, cogs),
        "note": "Ratios annualised from monthly data against month-end balances",
    }))
}

fn get_leverage_ratios(conn: &Connection, input: &Value) -> Result<Value> {
    let as_of = str_or(input, "as_of_date", "2026-02-28");
    let Some(date) = parse_date(as_of) else {
        return Ok(json!({"success": false, "message": "as_of_date must be YYYY-MM-DD."}));
    };
    let p = bs::position(conn, as_of)?;
    let de = p.debt_to_equity();

    // Coverage uses the month the balance date falls in
    let month_start = date.with_day(1).unwrap_or(date);
    let profit = pl::profit(conn, &month_start.to_string(), as_of)?;
    let coverage = if profit.interest == 0.0 {
        Value::Null
    } else {
        json!(round_to(profit.ebit() / profit.interest, 2))
    };

    Ok(json!({
        "as_of_date": as_of,
        "total_liabilities": round_to(p.total_liabilities(), 2),
        "total_equity": round_to(p.total_equity(), 2),
        "total_assets": round_to(p.total_assets(), 2),
        "debt_to_equity": de,
        "debt_to_assets": ratio(p.total_liabilities(), p.total_assets()),
        "interest_coverage": coverage,
        "status": leverage_status(de),
    }))
}

fn get_kpi_trend(conn: &Connection, input: &Value) -> Result<Value> {
    let metric = str_or(input, "metric_name", "gross_margin_pct");
    let periods = i64_or(input, "periods", 3)?.clamp(1, 24);
    let rows = query_rows(
        conn,
        "SELECT period, metric_value AS value, substr(calculated_at, 1, 10) AS calculated_at
         FROM kpi_snapshots WHERE metric_name = ?1
         ORDER BY calculated_at DESC, id DESC LIMIT ?2",
        params![metric, periods],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No snapshot data found for '{}'.", metric)}]));
    }

    let mut points: Vec<Value> = rows.into_iter().rev().collect();
    if points.len() >= 2 {
        let n = points.len();
        let delta = num(&points[n - 1], "value") - num(&points[n - 2], "value");
        let trend = if delta > 0.0 {
            "Improving"
        } else if delta < 0.0 {
            "Declining"
        } else {
            "Stable"
        };
        for point in &mut points {
            point["trend"] = json!(trend);
        }
    }
    Ok(Value::Array(points))
}

/// Industry benchmark per metric, and whether lower is better
const BENCHMARKS: &[(&str, f64, bool)] = &[
    ("gross_margin_pct", 65.0, false),
    ("ebitda_margin_pct", 22.0, false),
    ("net_margin_pct", 12.0, false),
    ("current_ratio", 2.0, false),
    ("debt_to_equity", 0.5, true),
];

fn get_performance_vs_benchmark(conn: &Connection, input: &Value) -> Result<Value> {
    let period = str_or(input, "period", "2026-02");
    let Some(month) = Month::load(conn, period)? else {
        return Ok(bad_period(period));
    };
    month.save_snapshot(conn)?;

    let mut kpis = Map::new();
    for &(name, benchmark, lower_is_better) in BENCHMARKS {
        let company = match name {
            "gross_margin_pct" => month.gross_margin(),
            "ebitda_margin_pct" => month.ebitda_margin(),
            "net_margin_pct" => month.net_margin(),
            "current_ratio" => month.position.current_ratio(),
            _ => month.position.debt_to_equity(),
        };
        let verdict = match (lower_is_better, company < benchmark) {
            (true, true) => "Better than benchmark",
            (true, false) => "Worse than benchmark",
            (false, false) => "Above benchmark",
            (false, true) => "Below benchmark",
        };
        kpis.insert(
            name.to_string(),
            json!({
                "benchmark": benchmark,
                "company": company,
                "vs_benchmark": verdict,
                "difference": round_to(company - benchmark, 2),
            }),
        );
    }
    Ok(json!({"period": period, "industry": INDUSTRY, "kpis": kpis}))
}

fn send_weekly_kpi_digest_email(conn: &Connection, input: &Value) -> Result<Value> {
    let recipients = req_str(input, "recipients")?;
    let period = str_or(input, "period", "2026-02");
    let Some(month) = Month::load(conn, period)? else {
        return Ok(bad_period(period));
    };
    month.save_snapshot(conn)?;

    let digest = json!({
        "Revenue": inr(month.profit.revenue),
        "Gross Margin %": format!("{}%", month.gross_margin()),
        "EBITDA Margin %": format!("{}%", month.ebitda_margin()),
        "Net Margin %": format!("{}%", month.net_margin()),
        "Current Ratio": month.position.current_ratio().to_string(),
        "Debt-to-Equity": month.position.debt_to_equity().to_string(),
    });
    conn.execute(
        "INSERT INTO report_log (report_type, generated_by, recipients, period, status)
         VALUES ('weekly_kpi_digest', 'kpi_agent', ?1, ?2, 'logged')",
        params![recipients, period],
    )?;
    Ok(json!({
        "digest_logged": true,
        "log_id": conn.last_insert_rowid(),
        "period": period,
        "recipients": recipients,
        "kpis": digest,
        "message": format!("KPI digest for {} logged for {}.", period, recipients),
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
    fn test_month_bounds() {
        let (first, last) = month_bounds("2026-02").unwrap();
        assert_eq!(first.to_string(), "2026-02-01");
        assert_eq!(last.to_string(), "2026-02-28");
        assert_eq!(month_bounds("2025-12").unwrap().1.to_string(), "2025-12-31");
        assert!(month_bounds("Feb").is_none());
    }

    #[test]
    fn test_dashboard_saves_snapshot() {
        let conn = seeded(AppKind::Finance);
        let kpis = run(&conn, "get_all_kpis", json!({}));
        assert_eq!(kpis["profitability"]["revenue"], 24_000_000.0);
        assert_eq!(kpis["profitability"]["gross_margin_pct"], 79.17);
        assert_eq!(kpis["profitability"]["ebitda_margin_pct"], 37.29);
        assert_eq!(kpis["profitability"]["net_margin_pct"], 27.97);
        assert_eq!(kpis["liquidity"]["current_ratio"], 3.48);
        assert_eq!(kpis["leverage"]["debt_to_equity"], 0.8);

        // The fresh snapshot is now the newest gross-margin point
        let trend = run(&conn, "get_kpi_trend", json!({"periods": 2}));
        let points = trend.as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1]["value"], 79.17);
        assert_eq!(points[1]["trend"], "Improving");

        let bad = run(&conn, "get_all_kpis", json!({"period": "February"}));
        assert_eq!(bad["success"], false);
    }

    #[test]
    fn test_trend_from_seeded_snapshots() {
        let conn = seeded(AppKind::Finance);
        let trend = run(&conn, "get_kpi_trend", json!({}));
        let points = trend.as_array().unwrap();
        assert_eq!(points[0]["period"], "2025-12");
        assert_eq!(points[2]["value"], 54.2);
        assert_eq!(points[0]["trend"], "Improving");

        let none = run(&conn, "get_kpi_trend", json!({"metric_name": "churn"}));
        assert!(none[0]["message"].as_str().unwrap().contains("churn"));
    }

    #[test]
    fn test_ratio_families() {
        let conn = seeded(AppKind::Finance);
        let liquidity = run(&conn, "get_liquidity_ratios", json!({}));
        assert_eq!(liquidity["quick_ratio"], 3.1);
        assert_eq!(liquidity["cash_ratio"], 2.16);
        assert_eq!(liquidity["status"]["current_ratio"], "green");

        let efficiency = run(&conn, "get_efficiency_ratios", json!({}));
        assert_eq!(efficiency["receivables_turnover"], 45.0);
        assert_eq!(efficiency["dso_days"], 8.1);
        assert_eq!(efficiency["dpo_days"], 21.9);

        let leverage = run(&conn, "get_leverage_ratios", json!({}));
        assert_eq!(leverage["debt_to_assets"], 0.44);
        assert!(leverage["interest_coverage"].is_null());
    }

    #[test]
    fn test_benchmark_and_digest() {
        let conn = seeded(AppKind::Finance);
        let vs = run(&conn, "get_performance_vs_benchmark", json!({}));
        assert_eq!(vs["industry"], "SaaS / Technology");
        assert_eq!(vs["kpis"]["gross_margin_pct"]["vs_benchmark"], "Above benchmark");
        assert_eq!(vs["kpis"]["debt_to_equity"]["vs_benchmark"], "Worse than benchmark");
        assert_eq!(vs["kpis"]["debt_to_equity"]["difference"], 0.3);

        let digest = run(&conn, "send_weekly_kpi_digest_email", json!({"recipients": "cfo@finapp.com"}));
        assert_eq!(digest["digest_logged"], true);
        assert_eq!(digest["kpis"]["Current Ratio"], "3.48");
        let logged: i64 = conn
            .query_row("SELECT COUNT(*) FROM report_log WHERE report_type = 'weekly_kpi_digest'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(logged, 1);
    }
}
