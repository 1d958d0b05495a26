//! Interview scheduling and feedback

use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{query_one, query_rows, text};
use bizdesk_store::time::{format_ts, now, parse_ts};

use crate::tools::params::{i64_or, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const INTERVIEW_ID: Param = Param::req("interview_id", Kind::Integer, "Interview id");

const INTERVIEW_TYPES: &[&str] = &["technical", "hr", "culture_fit", "final", "panel"];
const RECOMMENDATIONS: &[&str] = &["strong_yes", "yes", "maybe", "no", "strong_no"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "schedule_interview",
        description: "Schedule an interview. scheduled_at: YYYY-MM-DD HH:MM. interview_type: technical, hr, culture_fit, final or panel.",
        params: &[
            Param::req("candidate_id", Kind::Integer, "Candidate id"),
            Param::req("job_id", Kind::Integer, "Job the candidate applied for"),
            Param::req("interviewer_email", Kind::String, "Interviewer email"),
            Param::req("interviewer_name", Kind::String, "Interviewer name"),
            Param::req("scheduled_at", Kind::String, "Start time, YYYY-MM-DD HH:MM"),
            Param::opt("duration_mins", Kind::Integer, "Length in minutes, default 60"),
            Param::opt("interview_type", Kind::String, "Interview type, default technical"),
            Param::opt("round_num", Kind::Integer, "Round number, default 1"),
            Param::opt("meeting_link", Kind::String, "Video call link"),
        ],
        handler: Handler::Sql(schedule_interview),
    },
    ToolSpec {
        name: "get_interview_details",
        description: "Interview details with candidate and job.",
        params: &[INTERVIEW_ID],
        handler: Handler::Sql(get_interview_details),
    },
    ToolSpec {
        name: "list_interviews_for_job",
        description: "Interviews for a job, optionally filtered by status.",
        params: &[
            Param::req("job_id", Kind::Integer, "Job posting id"),
            Param::opt("status", Kind::String, "scheduled, completed, cancelled, rescheduled, no_show or all"),
        ],
        handler: Handler::Sql(list_interviews_for_job),
    },
    ToolSpec {
        name: "list_upcoming_interviews",
        description: "Scheduled interviews in the next N days.",
        params: &[Param::opt("days_ahead", Kind::Integer, "Look-ahead window, default 7")],
        handler: Handler::Sql(list_upcoming_interviews),
    },
    ToolSpec {
        name: "reschedule_interview",
        description: "Move an interview to a new date and time.",
        params: &[
            INTERVIEW_ID,
            Param::req("new_scheduled_at", Kind::String, "New start time, YYYY-MM-DD HH:MM"),
            Param::opt("reason", Kind::String, "Why it moved"),
        ],
        handler: Handler::Sql(reschedule_interview),
    },
    ToolSpec {
        name: "cancel_interview",
        description: "Cancel an interview.",
        params: &[
            INTERVIEW_ID,
            Param::opt("reason", Kind::String, "Reason, default Position on hold"),
        ],
        handler: Handler::Sql(cancel_interview),
    },
    ToolSpec {
        name: "submit_interview_feedback",
        description: "Record interview feedback. rating 1-5; technical_score, culture_fit, communication 1-10; recommendation strong_yes/yes/maybe/no/strong_no.",
        params: &[
            INTERVIEW_ID,
            Param::req("candidate_id", Kind::Integer, "Candidate id"),
            Param::req("rating", Kind::Integer, "Overall rating 1-5"),
            Param::req("technical_score", Kind::Integer, "Technical score 1-10"),
            Param::req("culture_fit", Kind::Integer, "Culture fit 1-10"),
            Param::req("communication", Kind::Integer, "Communication 1-10"),
            Param::req("recommendation", Kind::String, "Hiring recommendation"),
            Param::opt("notes", Kind::String, "Free-form notes"),
            Param::opt("submitted_by", Kind::String, "Interviewer email"),
        ],
        handler: Handler::Sql(submit_interview_feedback),
    },
    ToolSpec {
        name: "get_interview_feedback",
        description: "All feedback for a candidate across interview rounds.",
        params: &[Param::req("candidate_id", Kind::Integer, "Candidate id")],
        handler: Handler::Sql(get_interview_feedback),
    },
];

/// Normalise a user supplied time to the stored timestamp shape
fn normalise_time(raw: &str) -> Option<String> {
    parse_ts(raw).map(format_ts)
}

fn schedule_interview(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let job_id = req_i64(input, "job_id")?;
    let interviewer_email = req_str(input, "interviewer_email")?;
    let interviewer_name = req_str(input, "interviewer_name")?;
    let raw_time = req_str(input, "scheduled_at")?;
    let duration = i64_or(input, "duration_mins", 60)?;
    let kind = str_or(input, "interview_type", "technical").to_lowercase();
    let round = i64_or(input, "round_num", 1)?;

    let Some(scheduled_at) = normalise_time(raw_time) else {
        return Ok(json!({"success": false, "message": "scheduled_at must be YYYY-MM-DD HH:MM."}));
    };
    if !INTERVIEW_TYPES.contains(&kind.as_str()) {
        return Ok(json!({
            "success": false,
            "message": format!("Invalid interview_type. Valid: {}", INTERVIEW_TYPES.join(", ")),
        }));
    }

    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM candidates WHERE id = ?1 AND job_id = ?2",
            params![candidate_id, job_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(name) = name else {
        return Ok(json!({
            "success": false,
            "message": format!("Candidate #{} not found for job #{}.", candidate_id, job_id),
        }));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO interviews (candidate_id, job_id, interviewer_email, interviewer_name,
                                 scheduled_at, duration_mins, type, round, status, meeting_link)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'scheduled', ?9)",
        params![
            candidate_id,
            job_id,
            interviewer_email,
            interviewer_name,
            scheduled_at,
            duration,
            kind,
            round,
            str_or(input, "meeting_link", ""),
        ],
    )?;
    let interview_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE candidates SET status = 'interview', updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![candidate_id],
    )?;
    tx.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, 'interview_invitation', ?2, 'We would like to invite you...', ?3)",
        params![
            candidate_id,
            format!("Interview Scheduled - Round {}", round),
            interviewer_email
        ],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "interview_id": interview_id,
        "candidate": name,
        "scheduled_at": &scheduled_at[..16],
        "type": kind,
        "round": round,
        "message": format!("Interview #{} scheduled. Invitation logged for candidate and interviewer.", interview_id),
    }))
}

fn get_interview_details(conn: &Connection, input: &Value) -> Result<Value> {
    let interview_id = req_i64(input, "interview_id")?;
    let row = query_one(
        conn,
        "SELECT i.id, i.candidate_id, i.job_id, i.interviewer_email, i.interviewer_name,
                substr(i.scheduled_at, 1, 16) AS scheduled_at, i.duration_mins, i.type, i.round,
                i.status, i.meeting_link, i.notes,
                c.name AS candidate_name, c.email AS candidate_email, j.title AS job_title
         FROM interviews i
         JOIN candidates c ON c.id = i.candidate_id
         JOIN jobs j ON j.id = i.job_id
         WHERE i.id = ?1",
        params![interview_id],
    )?;
    Ok(match row {
        Some(mut row) => {
            row["found"] = json!(true);
            row
        }
        None => json!({"found": false, "message": format!("Interview #{} not found.", interview_id)}),
    })
}

fn list_interviews_for_job(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let status = str_or(input, "status", "all").to_lowercase();

    let mut sql = String::from(
        "SELECT i.id, i.type, i.round, i.status, substr(i.scheduled_at, 1, 16) AS scheduled_at,
                i.duration_mins, i.interviewer_name, i.meeting_link,
                c.name AS candidate_name, c.email AS candidate_email
         FROM interviews i JOIN candidates c ON c.id = i.candidate_id
         WHERE i.job_id = ?1",
    );
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(job_id)];
    if status != "all" {
        args.push(Box::new(status));
        sql.push_str(" AND i.status = ?2");
    }
    sql.push_str(" ORDER BY i.scheduled_at");

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No interviews found for job #{}.", job_id)}]));
    }
    Ok(Value::Array(rows))
}

fn list_upcoming_interviews(conn: &Connection, input: &Value) -> Result<Value> {
    let days = i64_or(input, "days_ahead", 7)?.max(0);
    let start = now();
    let rows = query_rows(
        conn,
        "SELECT i.id, i.type, i.round, i.status, substr(i.scheduled_at, 1, 16) AS scheduled_at,
                i.duration_mins, i.interviewer_name, i.interviewer_email, i.meeting_link,
                c.name AS candidate_name, j.title AS job_title
         FROM interviews i
         JOIN candidates c ON c.id = i.candidate_id
         JOIN jobs j ON j.id = i.job_id
         WHERE i.scheduled_at BETWEEN ?1 AND ?2 AND i.status = 'scheduled'
         ORDER BY i.scheduled_at",
        params![format_ts(start), format_ts(start + Duration::days(days))],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No interviews scheduled in the next {} days.", days)}]));
    }
    Ok(Value::Array(rows))
}

fn reschedule_interview(conn: &Connection, input: &Value) -> Result<Value> {
    let interview_id = req_i64(input, "interview_id")?;
    let raw_time = req_str(input, "new_scheduled_at")?;
    let reason = str_or(input, "reason", "");

    let Some(scheduled_at) = normalise_time(raw_time) else {
        return Ok(json!({"success": false, "message": "new_scheduled_at must be YYYY-MM-DD HH:MM."}));
    };
    let status: Option<String> = conn
        .query_row("SELECT status FROM interviews WHERE id = ?1", params![interview_id], |r| r.get(0))
        .optional()?;
    match status.as_deref() {
        None => {
            return Ok(json!({
                "success": false,
                "message": format!("Interview #{} not found.", interview_id),
            }));
        }
        Some(closed @ ("cancelled" | "completed")) => {
            return Ok(json!({
                "success": false,
                "message": format!("Interview #{} is {} and cannot be rescheduled.", interview_id, closed),
            }));
        }
        Some(_) => {}
    }

    let notes = if reason.is_empty() {
        None
    } else {
        Some(format!("Rescheduled: {}", reason))
    };
    conn.execute(
        "UPDATE interviews SET scheduled_at = ?1, status = 'rescheduled', notes = COALESCE(?2, notes)
         WHERE id = ?3",
        params![scheduled_at, notes, interview_id],
    )?;
    Ok(json!({
        "success": true,
        "interview_id": interview_id,
        "new_scheduled_at": &scheduled_at[..16],
        "message": format!("Interview #{} rescheduled. Updated invite logged.", interview_id),
    }))
}

fn cancel_interview(conn: &Connection, input: &Value) -> Result<Value> {
    let interview_id = req_i64(input, "interview_id")?;
    let reason = str_or(input, "reason", "Position on hold");

    let row = query_one(
        conn,
        "SELECT c.name AS candidate_name FROM interviews i
         JOIN candidates c ON c.id = i.candidate_id WHERE i.id = ?1",
        params![interview_id],
    )?;
    let Some(row) = row else {
        return Ok(json!({"success": false, "message": format!("Interview #{} not found.", interview_id)}));
    };
    conn.execute(
        "UPDATE interviews SET status = 'cancelled', notes = ?1 WHERE id = ?2",
        params![format!("Cancelled: {}", reason), interview_id],
    )?;
    Ok(json!({
        "success": true,
        "interview_id": interview_id,
        "message": format!(
            "Interview #{} for {} cancelled. Reason: {}",
            interview_id,
            text(&row, "candidate_name"),
            reason
        ),
    }))
}

fn check_range(name: &str, value: i64, lo: i64, hi: i64) -> Option<String> {
    if (lo..=hi).contains(&value) {
        None
    } else {
        Some(format!("{} must be between {} and {}. You gave {}.", name, lo, hi, value))
    }
}

fn submit_interview_feedback(conn: &Connection, input: &Value) -> Result<Value> {
    let interview_id = req_i64(input, "interview_id")?;
    let candidate_id = req_i64(input, "candidate_id")?;
    let rating = req_i64(input, "rating")?;
    let technical = req_i64(input, "technical_score")?;
    let culture = req_i64(input, "culture_fit")?;
    let communication = req_i64(input, "communication")?;
    let recommendation = req_str(input, "recommendation")?.to_lowercase();

    if !RECOMMENDATIONS.contains(&recommendation.as_str()) {
        return Ok(json!({
            "success": false,
            "message": format!("Invalid recommendation. Valid: {}", RECOMMENDATIONS.join(", ")),
        }));
    }
    let range_errors = [
        check_range("rating", rating, 1, 5),
        check_range("technical_score", technical, 1, 10),
        check_range("culture_fit", culture, 1, 10),
        check_range("communication", communication, 1, 10),
    ];
    if let Some(message) = range_errors.into_iter().flatten().next() {
        return Ok(json!({"success": false, "message": message}));
    }

    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM interviews WHERE id = ?1 AND candidate_id = ?2",
            params![interview_id, candidate_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(json!({
            "success": false,
            "message": format!("Interview #{} was not found for candidate #{}.", interview_id, candidate_id),
        }));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO interview_feedback
           (interview_id, candidate_id, rating, technical_score, culture_fit,
            communication, notes, recommendation, submitted_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            interview_id,
            candidate_id,
            rating,
            technical,
            culture,
            communication,
            str_or(input, "notes", ""),
            recommendation,
            str_or(input, "submitted_by", ""),
        ],
    )?;
    let feedback_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE interviews SET status = 'completed' WHERE id = ?1",
        params![interview_id],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "feedback_id": feedback_id,
        "interview_id": interview_id,
        "recommendation": recommendation,
        "rating": rating,
        "message": format!("Feedback submitted for interview #{}. Recommendation: {}", interview_id, recommendation),
    }))
}

fn get_interview_feedback(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let rows = query_rows(
        conn,
        "SELECT f.id, f.interview_id, f.rating, f.technical_score, f.culture_fit, f.communication,
                f.notes, f.recommendation, f.submitted_by, substr(f.created_at, 1, 16) AS created_at,
                i.type AS interview_type, i.round, substr(i.scheduled_at, 1, 16) AS scheduled_at
         FROM interview_feedback f
         JOIN interviews i ON i.id = f.interview_id
         WHERE f.candidate_id = ?1 ORDER BY i.round, f.id",
        params![candidate_id],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No feedback found for candidate #{}.", candidate_id)}]));
    }
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
    fn test_schedule_moves_candidate() {
        let conn = seeded(AppKind::Hr);
        let scheduled = run(
            &conn,
            "schedule_interview",
            json!({"candidate_id": 10, "job_id": 3, "interviewer_email": "v.nair@hrapp.com",
                   "interviewer_name": "Vikram Nair", "scheduled_at": "2026-03-09 10:30",
                   "interview_type": "panel", "round_num": 2}),
        );
        assert_eq!(scheduled["success"], true);
        assert_eq!(scheduled["scheduled_at"], "2026-03-09 10:30");

        let status: String = conn
            .query_row("SELECT status FROM candidates WHERE id = 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "interview");

        let wrong_job = run(
            &conn,
            "schedule_interview",
            json!({"candidate_id": 10, "job_id": 1, "interviewer_email": "a@hrapp.com",
                   "interviewer_name": "A", "scheduled_at": "2026-03-09 10:30"}),
        );
        assert_eq!(wrong_job["message"], "Candidate #10 not found for job #1.");

        let bad_time = run(
            &conn,
            "schedule_interview",
            json!({"candidate_id": 10, "job_id": 3, "interviewer_email": "a@hrapp.com",
                   "interviewer_name": "A", "scheduled_at": "next monday"}),
        );
        assert_eq!(bad_time["success"], false);
    }

    #[test]
    fn test_upcoming_window() {
        let conn = seeded(AppKind::Hr);
        let soon = format_ts(now() + Duration::days(2));
        conn.execute(
            "INSERT INTO interviews (candidate_id, job_id, interviewer_email, interviewer_name, scheduled_at, status)
             VALUES (13, 4, 'hiring.manager@hrapp.com', 'Anjali Singh', ?1, 'scheduled')",
            params![soon],
        )
        .unwrap();

        let upcoming = run(&conn, "list_upcoming_interviews", json!({"days_ahead": 7}));
        let upcoming = upcoming.as_array().unwrap();
        assert!(upcoming.iter().any(|i| i["candidate_name"] == "Suresh Kumar"));

        let none = run(&conn, "list_upcoming_interviews", json!({"days_ahead": 1}));
        assert!(!none.as_array().unwrap().iter().any(|i| i["candidate_name"] == "Suresh Kumar"));
    }

    #[test]
    fn test_feedback_validation_and_completion() {
        let conn = seeded(AppKind::Hr);
        let out_of_range = run(
            &conn,
            "submit_interview_feedback",
            json!({"interview_id": 3, "candidate_id": 9, "rating": 6, "technical_score": 8,
                   "culture_fit": 8, "communication": 8, "recommendation": "yes"}),
        );
        assert_eq!(out_of_range["message"], "rating must be between 1 and 5. You gave 6.");

        let mismatch = run(
            &conn,
            "submit_interview_feedback",
            json!({"interview_id": 3, "candidate_id": 1, "rating": 4, "technical_score": 8,
                   "culture_fit": 8, "communication": 8, "recommendation": "yes"}),
        );
        assert_eq!(mismatch["success"], false);

        let ok = run(
            &conn,
            "submit_interview_feedback",
            json!({"interview_id": 3, "candidate_id": 9, "rating": 4, "technical_score": 9,
                   "culture_fit": 8, "communication": 7, "recommendation": "strong_yes"}),
        );
        assert_eq!(ok["success"], true);

        let details = run(&conn, "get_interview_details", json!({"interview_id": 3}));
        assert_eq!(details["status"], "completed");
        let feedback = run(&conn, "get_interview_feedback", json!({"candidate_id": 9}));
        assert_eq!(feedback[0]["recommendation"], "strong_yes");
    }

    #[test]
    fn test_reschedule_and_cancel() {
        let conn = seeded(AppKind::Hr);
        let moved = run(
            &conn,
            "reschedule_interview",
            json!({"interview_id": 4, "new_scheduled_at": "2026-03-10 15:00", "reason": "Interviewer travel"}),
        );
        assert_eq!(moved["new_scheduled_at"], "2026-03-10 15:00");

        let done = run(
            &conn,
            "reschedule_interview",
            json!({"interview_id": 1, "new_scheduled_at": "2026-03-10 15:00"}),
        );
        assert_eq!(done["success"], false);

        let cancelled = run(&conn, "cancel_interview", json!({"interview_id": 4}));
        assert_eq!(
            cancelled["message"],
            "Interview #4 for Tanvi Joshi cancelled. Reason: Position on hold"
        );
        let listed = run(&conn, "list_interviews_for_job", json!({"job_id": 4, "status": "cancelled"}));
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
