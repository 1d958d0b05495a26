//! Hiring analytics reports

use anyhow::Result;
use rusqlite::Connection;
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, round_to};

use super::offer::acceptance_rate;
use crate::tools::{Handler, ToolSpec};

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_pipeline_summary",
        description: "Hiring funnel counts per candidate status with conversion rates.",
        params: &[],
        handler: Handler::Sql(get_pipeline_summary),
    },
    ToolSpec {
        name: "get_time_to_hire_report",
        description: "Average days candidates spend before reaching each pipeline stage.",
        params: &[],
        handler: Handler::Sql(get_time_to_hire_report),
    },
    ToolSpec {
        name: "get_source_effectiveness",
        description: "Applications, progression and hires per candidate source.",
        params: &[],
        handler: Handler::Sql(get_source_effectiveness),
    },
    ToolSpec {
        name: "get_open_positions_report",
        description: "Open roles with age in days and applicant progress.",
        params: &[],
        handler: Handler::Sql(get_open_positions_report),
    },
    ToolSpec {
        name: "get_department_hiring_stats",
        description: "Jobs, applicants, hires and average candidate score per department.",
        params: &[],
        handler: Handler::Sql(get_department_hiring_stats),
    },
    ToolSpec {
        name: "get_interviewer_stats",
        description: "Completed interviews, feedback and recommendation rate per interviewer.",
        params: &[],
        handler: Handler::Sql(get_interviewer_stats),
    },
    ToolSpec {
        name: "get_diversity_funnel",
        description: "Candidate count and average score at each pipeline stage, plus source mix.",
        params: &[],
        handler: Handler::Sql(get_diversity_funnel),
    },
    ToolSpec {
        name: "get_rejection_reasons",
        description: "Most common screening rejection notes and offer decline reasons.",
        params: &[],
        handler: Handler::Sql(get_rejection_reasons),
    },
    ToolSpec {
        name: "get_offer_acceptance_rate",
        description: "Offer acceptance rate, response time and accepted vs declined salary.",
        params: &[],
        handler: Handler::Sql(get_offer_acceptance_rate),
    },
];

fn pct(part: i64, total: i64) -> f64 {
    round_to(part as f64 / total.max(1) as f64 * 100.0, 1)
}

fn get_pipeline_summary(conn: &Connection, _input: &Value) -> Result<Value> {
    let row = query_one(
        conn,
        "SELECT
           COUNT(*) AS total_applications,
           SUM(CASE WHEN status = 'applied' THEN 1 ELSE 0 END) AS applied,
           SUM(CASE WHEN status = 'screening' THEN 1 ELSE 0 END) AS screening,
           SUM(CASE WHEN status = 'shortlisted' THEN 1 ELSE 0 END) AS shortlisted,
           SUM(CASE WHEN status = 'interview' THEN 1 ELSE 0 END) AS interview,
           SUM(CASE WHEN status = 'offer' THEN 1 ELSE 0 END) AS offer,
           SUM(CASE WHEN status = 'hired' THEN 1 ELSE 0 END) AS hired,
           SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END) AS rejected,
           (SELECT COUNT(*) FROM jobs WHERE status = 'open') AS open_jobs,
           (SELECT COUNT(*) FROM jobs) AS total_jobs
         FROM candidates",
        [],
    )?
    .unwrap_or_else(|| json!({}));

    let total = int(&row, "total_applications");
    let mut summary = json!({});
    for key in [
        "total_applications",
        "applied",
        "screening",
        "shortlisted",
        "interview",
        "offer",
        "hired",
        "rejected",
        "open_jobs",
        "total_jobs",
    ] {
        summary[key] = json!(int(&row, key));
    }
    summary["shortlist_rate_pct"] = json!(pct(int(&row, "shortlisted"), total));
    summary["interview_rate_pct"] = json!(pct(int(&row, "interview"), total));
    summary["offer_rate_pct"] = json!(pct(int(&row, "offer"), total));
    summary["hire_rate_pct"] = json!(pct(int(&row, "hired"), total));
    Ok(summary)
}

fn get_time_to_hire_report(conn: &Connection, _input: &Value) -> Result<Value> {
    let row = query_one(
        conn,
        "SELECT
           AVG(CASE WHEN status = 'hired' THEN d END) AS avg_days_total,
           AVG(CASE WHEN status = 'shortlisted' THEN d END) AS avg_days_to_shortlist,
           AVG(CASE WHEN status = 'interview' THEN d END) AS avg_days_to_interview,
           AVG(CASE WHEN status = 'offer' THEN d END) AS avg_days_to_offer,
           MIN(CASE WHEN status = 'hired' THEN d END) AS min_days_hired,
           MAX(CASE WHEN status = 'hired' THEN d END) AS max_days_hired
         FROM (SELECT status, julianday(updated_at) - julianday(created_at) AS d FROM candidates)",
        [],
    )?
    .unwrap_or_else(|| json!({}));

    let mut report = json!({});
    for key in [
        "avg_days_total",
        "avg_days_to_shortlist",
        "avg_days_to_interview",
        "avg_days_to_offer",
        "min_days_hired",
        "max_days_hired",
    ] {
        report[key] = json!(round_to(num(&row, key), 1));
    }
    Ok(report)
}

fn get_source_effectiveness(conn: &Connection, _input: &Value) -> Result<Value> {
    let mut rows = query_rows(
        conn,
        "SELECT source,
                COUNT(*) AS total_applications,
                SUM(CASE WHEN status = 'hired' THEN 1 ELSE 0 END) AS hired,
                SUM(CASE WHEN status IN ('shortlisted', 'interview', 'offer', 'hired') THEN 1 ELSE 0 END) AS progressed,
                AVG(score) AS avg_score
         FROM candidates
         GROUP BY source ORDER BY hired DESC, total_applications DESC, source",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No source data available."}]));
    }
    for row in rows.iter_mut() {
        let total = int(row, "total_applications");
        row["avg_score"] = json!(round_to(num(row, "avg_score"), 1));
        row["hire_rate_pct"] = json!(pct(int(row, "hired"), total));
        row["progression_rate_pct"] = json!(pct(int(row, "progressed"), total));
    }
    Ok(Value::Array(rows))
}

fn get_open_positions_report(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT j.id, j.title, j.department, j.location, j.status,
                substr(j.deadline, 1, 10) AS deadline, j.salary_min, j.salary_max,
                CAST(ROUND(julianday('now') - julianday(j.created_at)) AS INTEGER) AS age_days,
                COUNT(c.id) AS total_applicants,
                SUM(CASE WHEN c.status = 'shortlisted' THEN 1 ELSE 0 END) AS shortlisted,
                SUM(CASE WHEN c.status = 'interview' THEN 1 ELSE 0 END) AS in_interview,
                SUM(CASE WHEN c.status = 'hired' THEN 1 ELSE 0 END) AS hired
         FROM jobs j LEFT JOIN candidates c ON c.job_id = j.id
         WHERE j.status = 'open'
         GROUP BY j.id ORDER BY age_days DESC, j.id",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No open positions currently."}]));
    }
    Ok(Value::Array(rows))
}

fn get_department_hiring_stats(conn: &Connection, _input: &Value) -> Result<Value> {
    let mut rows = query_rows(
        conn,
        "SELECT j.department,
                COUNT(DISTINCT j.id) AS total_jobs,
                COUNT(DISTINCT CASE WHEN j.status = 'open' THEN j.id END) AS open_jobs,
                COUNT(c.id) AS total_applicants,
                SUM(CASE WHEN c.status = 'hired' THEN 1 ELSE 0 END) AS hired,
                AVG(CASE WHEN c.score > 0 THEN c.score END) AS avg_candidate_score
         FROM jobs j LEFT JOIN candidates c ON c.job_id = j.id
         GROUP BY j.department ORDER BY total_applicants DESC, j.department",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No department data available."}]));
    }
    for row in rows.iter_mut() {
        row["avg_candidate_score"] = json!(round_to(num(row, "avg_candidate_score"), 1));
        row["hired"] = json!(int(row, "hired"));
    }
    Ok(Value::Array(rows))
}

fn get_interviewer_stats(conn: &Connection, _input: &Value) -> Result<Value> {
    let mut rows = query_rows(
        conn,
        "SELECT i.interviewer_name, i.interviewer_email,
                COUNT(DISTINCT i.id) AS interviews_conducted,
                COUNT(f.id) AS feedback_submitted,
                AVG(f.rating) AS avg_rating,
                AVG(f.technical_score) AS avg_technical_score,
                SUM(CASE WHEN f.recommendation IN ('yes', 'strong_yes') THEN 1 ELSE 0 END) AS recommended
         FROM interviews i LEFT JOIN interview_feedback f ON f.interview_id = i.id
         WHERE i.status = 'completed'
         GROUP BY i.interviewer_name, i.interviewer_email
         ORDER BY interviews_conducted DESC, i.interviewer_name",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No interviewer data available."}]));
    }
    for row in rows.iter_mut() {
        row["avg_rating"] = json!(round_to(num(row, "avg_rating"), 2));
        row["avg_technical_score"] = json!(round_to(num(row, "avg_technical_score"), 2));
        row["recommendation_rate_pct"] =
            json!(pct(int(row, "recommended"), int(row, "feedback_submitted")));
    }
    Ok(Value::Array(rows))
}

fn get_diversity_funnel(conn: &Connection, _input: &Value) -> Result<Value> {
    let mut funnel = query_rows(
        conn,
        "SELECT status, COUNT(*) AS count, AVG(score) AS avg_score
         FROM candidates GROUP BY status
         ORDER BY CASE status
           WHEN 'applied' THEN 1 WHEN 'screening' THEN 2 WHEN 'shortlisted' THEN 3
           WHEN 'interview' THEN 4 WHEN 'offer' THEN 5 WHEN 'hired' THEN 6
           WHEN 'rejected' THEN 7 END",
        [],
    )?;
    for row in funnel.iter_mut() {
        row["avg_score"] = json!(round_to(num(row, "avg_score"), 1));
    }
    let sources = query_rows(
        conn,
        "SELECT source, COUNT(*) AS count FROM candidates GROUP BY source ORDER BY count DESC, source",
        [],
    )?;
    Ok(json!({
        "pipeline_funnel": funnel,
        "application_sources": sources,
        "note": "Demographic breakdowns need demographic fields on candidate profiles.",
    }))
}

fn get_rejection_reasons(conn: &Connection, _input: &Value) -> Result<Value> {
    let notes = query_rows(
        conn,
        "SELECT note AS reason, COUNT(*) AS occurrences FROM screening_notes
         WHERE note LIKE '%reject%' OR note LIKE '%not suitable%' OR note LIKE '%overqualified%'
            OR note LIKE '%underqualified%' OR note LIKE '%missing%'
         GROUP BY note ORDER BY occurrences DESC LIMIT 10",
        [],
    )?;
    let declines = query_rows(
        conn,
        "SELECT decline_reason AS reason, COUNT(*) AS occurrences FROM offers
         WHERE COALESCE(decline_reason, '') != ''
         GROUP BY decline_reason ORDER BY occurrences DESC LIMIT 5",
        [],
    )?;

    let or_message = |items: Vec<Value>, message: &str| {
        if items.is_empty() {
            json!([{"message": message}])
        } else {
            Value::Array(items)
        }
    };
    Ok(json!([
        {
            "category": "Screening Rejections",
            "items": or_message(notes, "No screening rejection notes found."),
        },
        {
            "category": "Offer Declines",
            "items": or_message(declines, "No offer decline reasons recorded."),
        },
    ]))
}

fn get_offer_acceptance_rate(conn: &Connection, _input: &Value) -> Result<Value> {
    let row = query_one(
        conn,
        "SELECT
           COUNT(*) AS total_offers,
           SUM(CASE WHEN status = 'sent' THEN 1 ELSE 0 END) AS pending,
           SUM(CASE WHEN status = 'accepted' THEN 1 ELSE 0 END) AS accepted,
           SUM(CASE WHEN status = 'declined' THEN 1 ELSE 0 END) AS declined,
           SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END) AS expired,
           AVG(CASE WHEN response_at IS NOT NULL AND sent_at IS NOT NULL
                    THEN julianday(response_at) - julianday(sent_at) END) AS avg_response_days,
           AVG(CASE WHEN status = 'accepted' THEN salary END) AS avg_accepted_salary,
           AVG(CASE WHEN status = 'declined' THEN salary END) AS avg_declined_salary
         FROM offers",
        [],
    )?
    .unwrap_or_else(|| json!({}));

    let accepted = int(&row, "accepted");
    let declined = int(&row, "declined");
    let accepted_salary = num(&row, "avg_accepted_salary");
    let declined_salary = num(&row, "avg_declined_salary");
    let insight = if declined_salary > accepted_salary {
        "Declined offers average a higher salary than accepted ones; compensation may be uncompetitive."
    } else {
        "Compensation appears competitive relative to declined offers."
    };
    Ok(json!({
        "total_offers": int(&row, "total_offers"),
        "pending_response": int(&row, "pending"),
        "accepted": accepted,
        "declined": declined,
        "expired": int(&row, "expired"),
        "acceptance_rate_pct": acceptance_rate(accepted, declined),
        "avg_days_to_response": round_to(num(&row, "avg_response_days"), 1),
        "avg_accepted_salary": accepted_salary.round(),
        "avg_declined_salary": declined_salary.round(),
        "insight": insight,
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
    fn test_pipeline_summary() {
        let conn = seeded(AppKind::Hr);
        let out = run(&conn, "get_pipeline_summary", json!({}));
        assert_eq!(out["total_applications"], 15);
        assert_eq!(out["screening"], 4);
        assert_eq!(out["interview"], 4);
        assert_eq!(out["open_jobs"], 5);
        assert_eq!(out["total_jobs"], 7);
        assert_eq!(out["shortlist_rate_pct"], 20.0);
        assert_eq!(out["interview_rate_pct"], 26.7);
        assert_eq!(out["hire_rate_pct"], 0.0);
    }

    #[test]
    fn test_source_and_department_breakdowns() {
        let conn = seeded(AppKind::Hr);
        let sources = run(&conn, "get_source_effectiveness", json!({}));
        assert_eq!(sources[0]["source"], "LinkedIn");
        assert_eq!(sources[0]["total_applications"], 4);
        assert_eq!(sources[0]["progression_rate_pct"], 100.0);

        let depts = run(&conn, "get_department_hiring_stats", json!({}));
        assert_eq!(depts[0]["department"], "Engineering");
        assert_eq!(depts[0]["total_applicants"], 7);
        assert_eq!(depts[0]["total_jobs"], 3);
        assert_eq!(depts[0]["open_jobs"], 2);
        assert_eq!(depts[0]["avg_candidate_score"], 70.7);

        let open = run(&conn, "get_open_positions_report", json!({}));
        assert_eq!(open.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_interviewer_stats() {
        let conn = seeded(AppKind::Hr);
        let out = run(&conn, "get_interviewer_stats", json!({}));
        assert_eq!(out[0]["interviewer_name"], "Anjali Singh");
        assert_eq!(out[0]["interviews_conducted"], 2);
        assert_eq!(out[0]["avg_rating"], 3.5);
        assert_eq!(out[0]["recommendation_rate_pct"], 50.0);
        assert_eq!(out[1]["recommendation_rate_pct"], 100.0);
    }

    #[test]
    fn test_funnel_and_reasons() {
        let conn = seeded(AppKind::Hr);
        let funnel = run(&conn, "get_diversity_funnel", json!({}));
        assert_eq!(funnel["pipeline_funnel"][0]["status"], "applied");
        assert_eq!(funnel["pipeline_funnel"][0]["count"], 2);

        let reasons = run(&conn, "get_rejection_reasons", json!({}));
        assert_eq!(reasons[0]["items"][0]["message"], "No screening rejection notes found.");

        conn.execute(
            "UPDATE offers SET status = 'declined', decline_reason = 'Counter offer', response_at = '2026-02-22 09:00:00' WHERE id = 1",
            [],
        )
        .unwrap();
        let reasons = run(&conn, "get_rejection_reasons", json!({}));
        assert_eq!(reasons[1]["items"][0]["reason"], "Counter offer");

        let rate = run(&conn, "get_offer_acceptance_rate", json!({}));
        assert_eq!(rate["declined"], 1);
        assert_eq!(rate["acceptance_rate_pct"], 0.0);
        assert_eq!(rate["avg_days_to_response"], 2.0);
        assert_eq!(rate["avg_declined_salary"], 2800000.0);
    }
}
