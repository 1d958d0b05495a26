//! Report summaries, delivery log and schedules
//!
//! Delivery tools never send mail: every "send" writes a `report_log` row
//! with status `logged` and returns what would have gone out.

use anyhow::{Result, anyhow};
use rusqlite::{Connection, ToSql, params};
use serde_json::{Value, json};

use bizdesk_store::rows::query_rows;

use crate::tools::fmt::{inr, title};
use crate::tools::params::{i64_or, opt_object, opt_str, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const FREQUENCIES: &[(&str, i64)] = &[("daily", 1), ("weekly", 7), ("monthly", 30)];
const SEVERITIES: &[&str] = &["info", "warning", "critical"];
const RULE: &str = "==================================================";

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "generate_report_summary",
        description: "Format report data (a JSON object) as a plain-text summary and log it.",
        params: &[
            Param::req("report_data", Kind::Object, "Report figures, object or JSON text"),
            Param::opt("report_type", Kind::String, "Heading, default Financial Report"),
            Param::opt("period", Kind::String, "Period label, default 2026-02"),
        ],
        handler: Handler::Sql(generate_report_summary),
    },
    ToolSpec {
        name: "send_financial_report_email",
        description: "Log delivery of a financial report to a recipient list.",
        params: &[
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
            Param::req("report_type", Kind::String, "Report name"),
            Param::req("period", Kind::String, "Period label"),
            Param::req("summary", Kind::String, "Report body"),
        ],
        handler: Handler::Sql(send_financial_report_email),
    },
    ToolSpec {
        name: "send_board_pack_email",
        description: "Log delivery of the monthly board pack (P&L, balance sheet, cash flow).",
        params: &[
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
            Param::req("period", Kind::String, "Period label"),
            Param::req("pl_summary", Kind::String, "P&L section"),
            Param::req("bs_summary", Kind::String, "Balance sheet section"),
            Param::req("cf_summary", Kind::String, "Cash flow section"),
        ],
        handler: Handler::Sql(send_board_pack_email),
    },
    ToolSpec {
        name: "get_report_history",
        description: "Report audit trail, newest first.",
        params: &[
            Param::opt("limit", Kind::Integer, "Maximum rows, default 20"),
            Param::opt("report_type", Kind::String, "Report type fragment"),
        ],
        handler: Handler::Sql(get_report_history),
    },
    ToolSpec {
        name: "schedule_report",
        description: "Create a recurring report schedule: daily, weekly or monthly.",
        params: &[
            Param::req("report_type", Kind::String, "Report name"),
            Param::req("frequency", Kind::String, "daily, weekly or monthly"),
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
        ],
        handler: Handler::Sql(schedule_report),
    },
    ToolSpec {
        name: "send_executive_alert_email",
        description: "Log an urgent financial alert for the executive team.",
        params: &[
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
            Param::req("title", Kind::String, "Alert title"),
            Param::req("message", Kind::String, "Alert body"),
            Param::opt("severity", Kind::String, "info, warning or critical; default warning"),
        ],
        handler: Handler::Sql(send_executive_alert_email),
    },
    ToolSpec {
        name: "get_report_recipients",
        description: "Configured report schedules and their recipients.",
        params: &[Param::opt("report_type", Kind::String, "Report type fragment")],
        handler: Handler::Sql(get_report_recipients),
    },
    ToolSpec {
        name: "log_report_delivery",
        description: "Write a delivery record to the report log.",
        params: &[
            Param::req("report_type", Kind::String, "Report name"),
            Param::req("generated_by", Kind::String, "Agent or user"),
            Param::req("recipients", Kind::String, "Comma-separated addresses"),
            Param::req("period", Kind::String, "Period label"),
            Param::opt("status", Kind::String, "Delivery status, default logged"),
        ],
        handler: Handler::Sql(log_report_delivery),
    },
];

fn log_delivery(
    conn: &Connection,
    report_type: &str,
    generated_by: &str,
    recipients: &str,
    period: &str,
    status: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO report_log (report_type, generated_by, recipients, period, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![report_type, generated_by, recipients, period, status],
    )?;
    Ok(conn.last_insert_rowid())
}

fn label(key: &str) -> String {
    key.split('_').map(title).collect::<Vec<_>>().join(" ")
}

fn scalar(key: &str, value: &Value) -> String {
    match value {
        // Fractional figures are money unless the key says otherwise
        Value::Number(n) if n.is_f64() && !key.contains("_pct") && !key.contains("ratio") => {
            inr(n.as_f64().unwrap_or_default())
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render(lines: &mut Vec<String>, value: &Value, indent: usize, key: Option<&str>) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            let indent = match key {
                Some(k) => {
                    lines.push(format!("{}{}:", pad, label(k)));
                    indent + 1
                }
                None => indent,
            };
            for (k, v) in map {
                render(lines, v, indent, Some(k));
            }
        }
        Value::Array(items) => {
            let indent = match key {
                Some(k) => {
                    lines.push(format!("{}{}:", pad, label(k)));
                    indent + 1
                }
                None => indent,
            };
            let pad = "  ".repeat(indent);
            if items.is_empty() {
                lines.push(format!("{}- (empty)", pad));
            }
            for (i, item) in items.iter().enumerate() {
                if item.is_object() || item.is_array() {
                    lines.push(format!("{}- Item {}:", pad, i + 1));
                    render(lines, item, indent + 1, None);
                } else {
                    lines.push(format!("{}- {}", pad, scalar("", item)));
                }
            }
        }
        _ => {
            let k = key.unwrap_or("value");
            lines.push(format!("{}{}: {}", pad, label(k), scalar(k, value)));
        }
    }
}

/// Plain-text summary of nested report data
fn summarise(data: &Value, report_type: &str, period: &str) -> String {
    let mut lines = vec![
        RULE.to_string(),
        format!("  {}", report_type.to_uppercase()),
        format!("  Period: {}", period),
        RULE.to_string(),
        String::new(),
    ];
    render(&mut lines, data, 0, None);
    lines.push(String::new());
    lines.push(RULE.to_string());
    lines.join("\n")
}

fn generate_report_summary(conn: &Connection, input: &Value) -> Result<Value> {
    let data = match opt_object(input, "report_data") {
        Ok(Some(map)) => Value::Object(map),
        Ok(None) => return Err(anyhow!("Missing 'report_data' parameter")),
        // Unparseable text is summarised as-is
        Err(_) => json!({"raw": opt_str(input, "report_data").unwrap_or_default()}),
    };
    let report_type = str_or(input, "report_type", "Financial Report");
    let period = str_or(input, "period", "2026-02");

    let summary = summarise(&data, report_type, period);
    log_delivery(conn, report_type, "system", "internal", period, "generated")?;
    Ok(json!({
        "success": true,
        "report_type": report_type,
        "period": period,
        "summary": summary,
    }))
}

fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn send_financial_report_email(conn: &Connection, input: &Value) -> Result<Value> {
    let recipients = req_str(input, "recipients")?;
    let report_type = req_str(input, "report_type")?;
    let period = req_str(input, "period")?;
    let summary = req_str(input, "summary")?;
    if recipients.is_empty() || summary.is_empty() {
        return Ok(json!({"success": false, "message": "recipients and summary must not be empty."}));
    }

    let log_id = log_delivery(conn, report_type, "report_agent", recipients, period, "logged")?;
    Ok(json!({
        "success": true,
        "log_id": log_id,
        "recipients": recipients,
        "subject": format!("{} - {}", report_type, period),
        "summary_preview": preview(summary, 800),
        "message": format!("{} for {} logged for {}.", report_type, period, recipients),
    }))
}

fn send_board_pack_email(conn: &Connection, input: &Value) -> Result<Value> {
    let recipients = req_str(input, "recipients")?;
    let period = req_str(input, "period")?;
    let sections = [
        ("pl", req_str(input, "pl_summary")?),
        ("bs", req_str(input, "bs_summary")?),
        ("cf", req_str(input, "cf_summary")?),
    ];
    if let Some((name, _)) = sections.iter().find(|(_, body)| body.is_empty()) {
        return Ok(json!({
            "success": false,
            "message": format!("The {} section of the board pack is empty.", name),
        }));
    }

    let log_id = log_delivery(conn, "board_pack", "report_agent", recipients, period, "logged")?;
    let previews: serde_json::Map<String, Value> =
        sections.iter().map(|(name, body)| (name.to_string(), json!(preview(body, 350)))).collect();
    Ok(json!({
        "success": true,
        "log_id": log_id,
        "recipients": recipients,
        "period": period,
        "subject": format!("Board Pack - {}", period),
        "sections": ["P&L", "Balance Sheet", "Cash Flow"],
        "summary_preview": previews,
        "message": format!("Board pack for {} logged for {}.", period, recipients),
    }))
}

fn get_report_history(conn: &Connection, input: &Value) -> Result<Value> {
    let limit = i64_or(input, "limit", 20)?.clamp(1, 200);
    let mut sql = String::from(
        "SELECT id, report_type, generated_by, recipients, substr(sent_at, 1, 19) AS sent_at, period, status
         FROM report_log",
    );
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(kind) = opt_str(input, "report_type").filter(|s| !s.is_empty()) {
        sql.push_str(" WHERE report_type LIKE ?1");
        args.push(Box::new(format!("%{}%", kind)));
    }
    sql.push_str(&format!(" ORDER BY sent_at DESC, id DESC LIMIT {}", limit));

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No report history found."}]));
    }
    Ok(Value::Array(rows))
}

fn schedule_report(conn: &Connection, input: &Value) -> Result<Value> {
    let report_type = req_str(input, "report_type")?;
    let frequency = req_str(input, "frequency")?.to_lowercase();
    let recipients = req_str(input, "recipients")?;

    let Some(&(_, days)) = FREQUENCIES.iter().find(|(f, _)| *f == frequency) else {
        return Ok(json!({"success": false, "message": "frequency must be 'daily', 'weekly', or 'monthly'"}));
    };
    conn.execute(
        "INSERT INTO report_schedules (report_type, frequency, recipients, next_run, is_active)
         VALUES (?1, ?2, ?3, datetime('now', ?4), 1)",
        params![report_type, frequency, recipients, format!("+{} days", days)],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "success": true,
        "schedule_id": id,
        "report_type": report_type,
        "frequency": frequency,
        "recipients": recipients,
        "message": format!("'{}' scheduled {} for {}", report_type, frequency, recipients),
    }))
}

fn send_executive_alert_email(conn: &Connection, input: &Value) -> Result<Value> {
    let recipients = req_str(input, "recipients")?;
    let alert_title = req_str(input, "title")?;
    let body = req_str(input, "message")?;
    let severity = str_or(input, "severity", "warning").to_lowercase();
    if !SEVERITIES.contains(&severity.as_str()) {
        return Ok(json!({"success": false, "message": "severity must be info, warning or critical."}));
    }

    let log_id = log_delivery(conn, "executive_alert", "report_agent", recipients, "now", "logged")?;
    Ok(json!({
        "success": true,
        "log_id": log_id,
        "recipients": recipients,
        "title": alert_title,
        "severity": severity,
        "subject": format!("Executive Alert: {}", alert_title),
        "message_preview": preview(body, 800),
        "message": format!("{} alert '{}' logged for {}.", title(&severity), alert_title, recipients),
    }))
}

fn get_report_recipients(conn: &Connection, input: &Value) -> Result<Value> {
    let pattern = format!("%{}%", str_or(input, "report_type", ""));
    let rows = query_rows(
        conn,
        "SELECT report_type, frequency, recipients, substr(next_run, 1, 16) AS next_run, is_active
         FROM report_schedules WHERE report_type LIKE ?1 ORDER BY id",
        params![pattern],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No report schedules configured."}]));
    }
    Ok(Value::Array(rows))
}

fn log_report_delivery(conn: &Connection, input: &Value) -> Result<Value> {
    let report_type = req_str(input, "report_type")?;
    let generated_by = req_str(input, "generated_by")?;
    let recipients = req_str(input, "recipients")?;
    let period = req_str(input, "period")?;
    let status = str_or(input, "status", "logged");

    let id = log_delivery(conn, report_type, generated_by, recipients, period, status)?;
    Ok(json!({
        "success": true,
        "log_id": id,
        "report_type": report_type,
        "status": status,
        "message": format!("Report delivery logged (ID #{})", id),
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
    fn test_summary_formats_nested_data() {
        let data = json!({
            "revenue": 24000000.5,
            "gross_margin_pct": 79.17,
            "departments": [{"name": "Sales"}, "Admin"],
            "notes": [],
        });
        let text = summarise(&data, "Monthly P&L", "2026-02");
        assert!(text.contains("  MONTHLY P&L"));
        assert!(text.contains("Revenue: ₹24,000,000.50"));
        assert!(text.contains("Gross Margin Pct: 79.17"));
        assert!(text.contains("Departments:\n  - Item 1:\n    Name: Sales\n  - Admin"));
        assert!(text.contains("Notes:\n  - (empty)"));
    }

    #[test]
    fn test_generate_logs_and_accepts_text() {
        let conn = seeded(AppKind::Finance);
        let out = run(
            &conn,
            "generate_report_summary",
            json!({"report_data": "{\"ebitda\": 8950000}", "report_type": "EBITDA"}),
        );
        assert_eq!(out["success"], true);
        assert!(out["summary"].as_str().unwrap().contains("Ebitda: 8950000"));

        let raw = run(&conn, "generate_report_summary", json!({"report_data": "not json"}));
        assert!(raw["summary"].as_str().unwrap().contains("Raw: not json"));

        let history = run(&conn, "get_report_history", json!({"report_type": "ebitda"}));
        assert_eq!(history[0]["status"], "generated");
        assert_eq!(history[0]["recipients"], "internal");
    }

    #[test]
    fn test_deliveries_are_logged_not_sent() {
        let conn = seeded(AppKind::Finance);
        let report = run(
            &conn,
            "send_financial_report_email",
            json!({"recipients": "cfo@finapp.com", "report_type": "Monthly P&L", "period": "2026-02",
                   "summary": "Revenue up 6.7%"}),
        );
        assert_eq!(report["success"], true);
        assert_eq!(report["subject"], "Monthly P&L - 2026-02");

        let pack = run(
            &conn,
            "send_board_pack_email",
            json!({"recipients": "board@finapp.com", "period": "2026-02",
                   "pl_summary": "P&L", "bs_summary": "", "cf_summary": "CF"}),
        );
        assert_eq!(pack["success"], false);
        assert_eq!(pack["message"], "The bs section of the board pack is empty.");

        let alert = run(
            &conn,
            "send_executive_alert_email",
            json!({"recipients": "ceo@finapp.com", "title": "Runway", "message": "38 days left", "severity": "critical"}),
        );
        assert_eq!(alert["message"], "Critical alert 'Runway' logged for ceo@finapp.com.");

        let history = run(&conn, "get_report_history", json!({}));
        let rows = history.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["status"] == "logged"));
        assert_eq!(rows[0]["report_type"], "executive_alert");
    }

    #[test]
    fn test_schedules_and_recipients() {
        let conn = seeded(AppKind::Finance);
        let seeded_schedules = run(&conn, "get_report_recipients", json!({}));
        assert_eq!(seeded_schedules.as_array().unwrap().len(), 3);

        let bad = run(
            &conn,
            "schedule_report",
            json!({"report_type": "board_pack", "frequency": "hourly", "recipients": "board@finapp.com"}),
        );
        assert_eq!(bad["success"], false);

        let ok = run(
            &conn,
            "schedule_report",
            json!({"report_type": "board_pack", "frequency": "Monthly", "recipients": "board@finapp.com"}),
        );
        assert_eq!(ok["success"], true);
        let board = run(&conn, "get_report_recipients", json!({"report_type": "board"}));
        assert_eq!(board[0]["frequency"], "monthly");

        let logged = run(
            &conn,
            "log_report_delivery",
            json!({"report_type": "board_pack", "generated_by": "cfo", "recipients": "board", "period": "2026-02"}),
        );
        assert_eq!(logged["status"], "logged");
    }
}
