//! Budgets and variance

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{num, query_rows, round_to, text};

use crate::tools::fmt::inr;
use crate::tools::params::{f64_or, i64_or, req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const DEPARTMENT: Param = Param::req("department", Kind::String, "Department name");
const YEAR: Param = Param::opt("fiscal_year", Kind::Integer, "Fiscal year, default 2026");
const PERIOD: Param = Param::opt("period", Kind::Integer, "Fiscal period (month number), default 2");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "set_department_budget",
        description: "Create or update the budget of a department for a fiscal period.",
        params: &[
            DEPARTMENT,
            Param::req("fiscal_year", Kind::Integer, "Fiscal year"),
            Param::req("period", Kind::Integer, "Fiscal period (month number)"),
            Param::req("amount", Kind::Number, "Budget amount"),
            Param::opt("category", Kind::String, "Budget category, default total"),
            Param::opt("created_by", Kind::String, "Who set the budget"),
        ],
        handler: Handler::Sql(set_department_budget),
    },
    ToolSpec {
        name: "get_department_budget",
        description: "Approved budget of a department for a period, by category.",
        params: &[DEPARTMENT, YEAR, PERIOD],
        handler: Handler::Sql(get_department_budget),
    },
    ToolSpec {
        name: "get_variance_report",
        description: "Actual vs budget variance for every department and category.",
        params: &[YEAR, PERIOD],
        handler: Handler::Sql(get_variance_report),
    },
    ToolSpec {
        name: "get_top_overspend_depts",
        description: "Departments most over budget, ranked by variance.",
        params: &[
            YEAR,
            PERIOD,
            Param::opt("top_n", Kind::Integer, "How many to return, default 5"),
        ],
        handler: Handler::Sql(get_top_overspend_depts),
    },
    ToolSpec {
        name: "get_budget_utilisation",
        description: "Budget utilisation percentage per department, highest first.",
        params: &[YEAR, PERIOD],
        handler: Handler::Sql(get_budget_utilisation),
    },
    ToolSpec {
        name: "get_forecast_vs_actual",
        description: "Full-year run rate (actuals x 12) against the annual budget.",
        params: &[YEAR],
        handler: Handler::Sql(get_forecast_vs_actual),
    },
    ToolSpec {
        name: "update_budget_forecast",
        description: "Replace the budget forecast of a department for a period.",
        params: &[
            DEPARTMENT,
            Param::req("fiscal_year", Kind::Integer, "Fiscal year"),
            Param::req("period", Kind::Integer, "Fiscal period"),
            Param::req("new_forecast", Kind::Number, "New forecast amount"),
            Param::opt("updated_by", Kind::String, "Who changed it"),
        ],
        handler: Handler::Sql(update_budget_forecast),
    },
    ToolSpec {
        name: "check_variance_alerts",
        description: "Record an alert for every department whose overspend exceeds a threshold percentage.",
        params: &[
            Param::opt("threshold_pct", Kind::Number, "Variance threshold in percent, default 10"),
            Param::opt("recipients", Kind::String, "Who should be notified"),
        ],
        handler: Handler::Sql(check_variance_alerts),
    },
];

fn period_args(input: &Value) -> Result<(i64, i64)> {
    Ok((i64_or(input, "fiscal_year", 2026)?, i64_or(input, "period", 2)?))
}

fn set_department_budget(conn: &Connection, input: &Value) -> Result<Value> {
    let department = req_str(input, "department")?;
    let year = req_i64(input, "fiscal_year")?;
    let period = req_i64(input, "period")?;
    let amount = req_f64(input, "amount")?;
    let category = str_or(input, "category", "total");
    let created_by = str_or(input, "created_by", "");

    if !(1..=12).contains(&period) {
        return Ok(json!({"success": false, "message": "period must be between 1 and 12."}));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM budgets
             WHERE department = ?1 AND fiscal_year = ?2 AND period = ?3 AND category = ?4",
            params![department, year, period, category],
            |r| r.get(0),
        )
        .optional()?;

    let action = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE budgets SET amount = ?1, created_by = ?2 WHERE id = ?3",
                params![amount, created_by, id],
            )?;
            "updated"
        }
        None => {
            conn.execute(
                "INSERT INTO budgets (department, fiscal_year, period, amount, category, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![department, year, period, amount, category, created_by],
            )?;
            "created"
        }
    };

    Ok(json!({
        "success": true,
        "action": action,
        "department": department,
        "fiscal_year": year,
        "period": period,
        "amount": amount,
        "message": format!("Budget {} for {} {}-P{}: {}", action, department, year, period, inr(amount)),
    }))
}

fn get_department_budget(conn: &Connection, input: &Value) -> Result<Value> {
    let department = req_str(input, "department")?;
    let (year, period) = period_args(input)?;

    let rows = query_rows(
        conn,
        "SELECT department, category, amount, created_by FROM budgets
         WHERE department LIKE ?1 AND fiscal_year = ?2 AND period = ?3
         ORDER BY category",
        params![format!("%{}%", department), year, period],
    )?;
    if rows.is_empty() {
        return Ok(json!({
            "found": false,
            "message": format!("No budget found for {} {}-P{}.", department, year, period),
        }));
    }

    let total: f64 = rows.iter().map(|r| num(r, "amount")).sum();
    let categories: Vec<Value> = rows
        .iter()
        .map(|r| json!({"category": r["category"], "amount": r["amount"], "created_by": r["created_by"]}))
        .collect();
    Ok(json!({
        "found": true,
        "department": rows[0]["department"],
        "fiscal_year": year,
        "period": period,
        "total_budget": round_to(total, 2),
        "categories": categories,
    }))
}

/// One department/category line of the variance report
#[derive(Debug, Clone)]
pub(crate) struct VarianceLine {
    pub department: String,
    pub category: String,
    pub budget: f64,
    pub actual: f64,
}

impl VarianceLine {
    pub fn variance(&self) -> f64 {
        self.actual - self.budget
    }

    pub fn variance_pct(&self) -> f64 {
        if self.budget == 0.0 {
            0.0
        } else {
            round_to(self.variance() / self.budget * 100.0, 1)
        }
    }

    pub fn utilisation_pct(&self) -> f64 {
        if self.budget == 0.0 {
            0.0
        } else {
            round_to(self.actual / self.budget * 100.0, 1)
        }
    }

    fn status(&self) -> &'static str {
        let v = self.variance();
        if v > 0.0 {
            "OVER"
        } else if v < 0.0 {
            "UNDER"
        } else {
            "ON PLAN"
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "department": self.department,
            "category": self.category,
            "budget": self.budget,
            "actual": self.actual,
            "variance": round_to(self.variance(), 2),
            "variance_pct": self.variance_pct(),
            "status": self.status(),
        })
    }
}

pub(crate) fn variance_lines(conn: &Connection, year: i64, period: i64) -> Result<Vec<VarianceLine>> {
    let rows = query_rows(
        conn,
        "SELECT b.department, b.category,
                SUM(b.amount) AS budget,
                COALESCE(SUM(ba.actual_amount), 0) AS actual
         FROM budgets b
         LEFT JOIN budget_actuals ba ON ba.budget_id = b.id
         WHERE b.fiscal_year = ?1 AND b.period = ?2
         GROUP BY b.department, b.category
         ORDER BY b.department, b.category",
        params![year, period],
    )?;
    Ok(rows
        .iter()
        .map(|r| VarianceLine {
            department: text(r, "department").to_string(),
            category: text(r, "category").to_string(),
            budget: num(r, "budget"),
            actual: num(r, "actual"),
        })
        .collect())
}

fn get_variance_report(conn: &Connection, input: &Value) -> Result<Value> {
    let (year, period) = period_args(input)?;
    let lines = variance_lines(conn, year, period)?;
    if lines.is_empty() {
        return Ok(json!([{"message": "No budget data found for this period."}]));
    }
    Ok(lines.iter().map(VarianceLine::to_json).collect())
}

fn get_top_overspend_depts(conn: &Connection, input: &Value) -> Result<Value> {
    let (year, period) = period_args(input)?;
    let top_n = i64_or(input, "top_n", 5)?.max(1) as usize;

    let mut over: Vec<VarianceLine> = variance_lines(conn, year, period)?
        .into_iter()
        .filter(|l| l.variance() > 0.0)
        .collect();
    if over.is_empty() {
        return Ok(json!([{"message": "No departments over budget."}]));
    }
    over.sort_by(|a, b| b.variance().total_cmp(&a.variance()));
    Ok(over.iter().take(top_n).map(VarianceLine::to_json).collect())
}

fn utilisation_status(pct: f64) -> &'static str {
    if pct > 100.0 {
        "Over"
    } else if pct > 90.0 {
        "High (>90%)"
    } else if pct > 50.0 {
        "Normal"
    } else {
        "Low (<50%)"
    }
}

fn get_budget_utilisation(conn: &Connection, input: &Value) -> Result<Value> {
    let (year, period) = period_args(input)?;
    let mut lines = variance_lines(conn, year, period)?;
    if lines.is_empty() {
        return Ok(json!([{"message": "No budget data found."}]));
    }
    lines.sort_by(|a, b| b.utilisation_pct().total_cmp(&a.utilisation_pct()));

    Ok(lines
        .iter()
        .map(|l| {
            let pct = l.utilisation_pct();
            json!({
                "department": l.department,
                "category": l.category,
                "budget": l.budget,
                "actual": l.actual,
                "utilisation_pct": pct,
                "status": utilisation_status(pct),
            })
        })
        .collect())
}

fn get_forecast_vs_actual(conn: &Connection, input: &Value) -> Result<Value> {
    let year = i64_or(input, "fiscal_year", 2026)?;
    let rows = query_rows(
        conn,
        "SELECT b.department,
                SUM(b.amount) AS annual_budget,
                COALESCE(SUM(ba.actual_amount), 0) AS ytd_actual
         FROM budgets b
         LEFT JOIN budget_actuals ba ON ba.budget_id = b.id
         WHERE b.fiscal_year = ?1
         GROUP BY b.department ORDER BY ytd_actual DESC",
        params![year],
    )?;

    let departments: Vec<Value> = rows
        .iter()
        .map(|r| {
            let budget = num(r, "annual_budget");
            let actual = num(r, "ytd_actual");
            let run_rate = actual * 12.0;
            json!({
                "department": r["department"],
                "annual_budget": budget,
                "ytd_actual": actual,
                "annualised_run_rate": round_to(run_rate, 2),
                "full_year_variance": round_to(run_rate - budget, 2),
            })
        })
        .collect();

    Ok(json!({
        "fiscal_year": year,
        "note": "Annualised run rate based on 1-month actuals",
        "departments": departments,
    }))
}

fn update_budget_forecast(conn: &Connection, input: &Value) -> Result<Value> {
    let department = req_str(input, "department")?;
    let year = req_i64(input, "fiscal_year")?;
    let period = req_i64(input, "period")?;
    let forecast = req_f64(input, "new_forecast")?;
    let updated_by = str_or(input, "updated_by", "");

    let target: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, department FROM budgets
             WHERE department LIKE ?1 AND fiscal_year = ?2 AND period = ?3
             ORDER BY id LIMIT 1",
            params![format!("%{}%", department), year, period],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((id, matched)) = target else {
        return Ok(json!({
            "success": false,
            "message": format!("No budget found for {} {}-P{}.", department, year, period),
        }));
    };

    conn.execute(
        "UPDATE budgets SET amount = ?1, created_by = ?2 WHERE id = ?3",
        params![forecast, updated_by, id],
    )?;
    Ok(json!({
        "success": true,
        "department": matched,
        "updated_forecast": forecast,
        "message": format!("Forecast updated for {} {}-P{}: {}", matched, year, period, inr(forecast)),
    }))
}

fn check_variance_alerts(conn: &Connection, input: &Value) -> Result<Value> {
    let threshold = f64_or(input, "threshold_pct", 10.0)?;
    let recipients = str_or(input, "recipients", "finance-team");

    let over: Vec<VarianceLine> = variance_lines(conn, 2026, 2)?
        .into_iter()
        .filter(|l| l.variance_pct() > threshold)
        .collect();

    let tx = conn.unchecked_transaction()?;
    for line in &over {
        tx.execute(
            "INSERT INTO alerts (alert_type, threshold, current_value, sent_to)
             VALUES ('budget_variance', ?1, ?2, ?3)",
            params![threshold, line.variance_pct(), format!("{} ({})", recipients, line.department)],
        )?;
    }
    tx.commit()?;

    let departments: Vec<Value> = over
        .iter()
        .map(|l| json!({"department": l.department, "category": l.category, "variance_pct": l.variance_pct()}))
        .collect();
    Ok(json!({
        "alerts_recorded": over.len(),
        "departments": departments,
        "message": format!(
            "Variance alerts recorded for {} line(s) over {}%",
            over.len(),
            threshold
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
    fn test_variance_report() {
        let conn = seeded(AppKind::Finance);
        let report = run(&conn, "get_variance_report", json!({}));
        let lines = report.as_array().unwrap();
        assert_eq!(lines.len(), 10);

        let eng_salary = lines
            .iter()
            .find(|l| l["department"] == "Engineering" && l["category"] == "salary")
            .unwrap();
        assert_eq!(eng_salary["variance"], 200_000.0);
        assert_eq!(eng_salary["variance_pct"], 6.7);
        assert_eq!(eng_salary["status"], "OVER");

        let admin = lines
            .iter()
            .find(|l| l["department"] == "Admin" && l["category"] == "overhead")
            .unwrap();
        assert_eq!(admin["status"], "ON PLAN");
    }

    #[test]
    fn test_top_overspend_and_utilisation() {
        let conn = seeded(AppKind::Finance);
        let top = run(&conn, "get_top_overspend_depts", json!({"top_n": 2}));
        let top = top.as_array().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["department"], "Marketing");
        assert_eq!(top[0]["category"], "salary");
        assert!(top[0]["variance"].as_f64().unwrap() >= top[1]["variance"].as_f64().unwrap());

        let util = run(&conn, "get_budget_utilisation", json!({}));
        let util = util.as_array().unwrap();
        assert!(util[0]["utilisation_pct"].as_f64().unwrap() >= util[1]["utilisation_pct"].as_f64().unwrap());
        assert_eq!(util[0]["status"], "Over");
        assert_eq!(utilisation_status(95.0), "High (>90%)");
        assert_eq!(utilisation_status(40.0), "Low (<50%)");
    }

    #[test]
    fn test_set_budget_upserts() {
        let conn = seeded(AppKind::Finance);
        let created = run(
            &conn,
            "set_department_budget",
            json!({"department": "Legal", "fiscal_year": 2026, "period": 3, "amount": 250000}),
        );
        assert_eq!(created["action"], "created");
        let updated = run(
            &conn,
            "set_department_budget",
            json!({"department": "Legal", "fiscal_year": 2026, "period": 3, "amount": 300000}),
        );
        assert_eq!(updated["action"], "updated");

        let budget = run(&conn, "get_department_budget", json!({"department": "legal", "period": 3}));
        assert_eq!(budget["total_budget"], 300_000.0);

        let missing = run(&conn, "get_department_budget", json!({"department": "Legal", "period": 4}));
        assert_eq!(missing["found"], false);
    }

    #[test]
    fn test_forecast_and_alerts() {
        let conn = seeded(AppKind::Finance);
        let forecast = run(&conn, "get_forecast_vs_actual", json!({}));
        let it = forecast["departments"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["department"] == "IT")
            .unwrap()
            .clone();
        assert_eq!(it["annualised_run_rate"], 2_520_000.0);

        let updated = run(
            &conn,
            "update_budget_forecast",
            json!({"department": "IT", "fiscal_year": 2026, "period": 2, "new_forecast": 220000}),
        );
        assert_eq!(updated["success"], true);

        let alerts = run(&conn, "check_variance_alerts", json!({"threshold_pct": 15}));
        // Marketing salary +21.7%, Marketing spend +16.7%; IT no longer over
        assert_eq!(alerts["alerts_recorded"], 2);
        let stored: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts WHERE alert_type = 'budget_variance'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 2);
    }
}
