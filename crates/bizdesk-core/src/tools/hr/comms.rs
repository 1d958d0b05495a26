//! Candidate communications
//!
//! Nothing here leaves the process: each message is recorded in the
//! `communications` table with status `logged`, which is what the
//! history tool and the analytics reports read back.

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, text};

use crate::tools::fmt::{rupees, title};
use crate::tools::params::{req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const CANDIDATE_ID: Param = Param::req("candidate_id", Kind::Integer, "Candidate id");
const SENT_BY: Param = Param::opt("sent_by", Kind::String, "Sender recorded on the log entry");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "send_application_confirmation_email",
        description: "Log an application receipt confirmation for a candidate.",
        params: &[CANDIDATE_ID, SENT_BY],
        handler: Handler::Sql(send_application_confirmation_email),
    },
    ToolSpec {
        name: "send_candidate_status_update",
        description: "Log a status update notification for a candidate.",
        params: &[
            CANDIDATE_ID,
            Param::req("new_status", Kind::String, "Status being communicated"),
            Param::opt("custom_message", Kind::String, "Extra text for the candidate"),
            SENT_BY,
        ],
        handler: Handler::Sql(send_candidate_status_update),
    },
    ToolSpec {
        name: "send_interview_invite",
        description: "Log an interview invitation for an existing interview record.",
        params: &[
            CANDIDATE_ID,
            Param::req("interview_id", Kind::Integer, "Interview id"),
            SENT_BY,
        ],
        handler: Handler::Sql(send_interview_invite),
    },
    ToolSpec {
        name: "send_rejection",
        description: "Log a professional rejection message for a candidate.",
        params: &[
            CANDIDATE_ID,
            Param::opt("feedback", Kind::String, "Optional feedback for the candidate"),
            SENT_BY,
        ],
        handler: Handler::Sql(send_rejection),
    },
    ToolSpec {
        name: "send_offer_notification",
        description: "Log the offer letter message for an existing offer record.",
        params: &[
            CANDIDATE_ID,
            Param::req("offer_id", Kind::Integer, "Offer id"),
            SENT_BY,
        ],
        handler: Handler::Sql(send_offer_notification),
    },
    ToolSpec {
        name: "send_bulk_status_update",
        description: "Log one update message for every active (not hired, not rejected) candidate of a job.",
        params: &[
            Param::req("job_id", Kind::Integer, "Job id"),
            Param::req("subject", Kind::String, "Message subject"),
            Param::req("message", Kind::String, "Message body"),
            SENT_BY,
        ],
        handler: Handler::Sql(send_bulk_status_update),
    },
    ToolSpec {
        name: "get_communication_history",
        description: "Full communication log for a candidate, newest first.",
        params: &[CANDIDATE_ID],
        handler: Handler::Sql(get_communication_history),
    },
];

fn log_comm(
    conn: &Connection,
    candidate_id: i64,
    kind: &str,
    subject: &str,
    preview: &str,
    sent_by: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![candidate_id, kind, subject, preview, sent_by],
    )?;
    Ok(())
}

fn candidate(conn: &Connection, candidate_id: i64) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT c.name, c.email, c.job_id, j.title AS job_title
         FROM candidates c JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1",
        params![candidate_id],
    )
}

fn not_found(candidate_id: i64) -> Value {
    json!({"success": false, "message": format!("Candidate #{} not found.", candidate_id)})
}

fn send_application_confirmation_email(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let Some(row) = candidate(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };
    log_comm(
        conn,
        candidate_id,
        "application_confirmation",
        &format!("Application Received - {}", text(&row, "job_title")),
        "Thank you for applying.",
        str_or(input, "sent_by", "system"),
    )?;
    Ok(json!({
        "success": true,
        "candidate": row["name"],
        "message": format!("Application confirmation logged for {}.", text(&row, "email")),
    }))
}

fn send_candidate_status_update(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let new_status = req_str(input, "new_status")?;
    let custom = str_or(input, "custom_message", "");
    let Some(row) = candidate(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };
    log_comm(
        conn,
        candidate_id,
        "status_update",
        &format!(
            "Status Update - {}",
            new_status.split('_').map(title).collect::<Vec<_>>().join(" ")
        ),
        if custom.is_empty() { new_status } else { custom },
        str_or(input, "sent_by", "system"),
    )?;
    Ok(json!({
        "success": true,
        "candidate": row["name"],
        "message": format!("Status update ({}) logged for {}.", new_status, text(&row, "email")),
    }))
}

fn send_interview_invite(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let interview_id = req_i64(input, "interview_id")?;
    let row = query_one(
        conn,
        "SELECT i.round, substr(i.scheduled_at, 1, 16) AS scheduled_at, i.meeting_link,
                c.email AS candidate_email
         FROM interviews i JOIN candidates c ON c.id = i.candidate_id
         WHERE i.id = ?1 AND i.candidate_id = ?2",
        params![interview_id, candidate_id],
    )?;
    let Some(row) = row else {
        return Ok(json!({
            "success": false,
            "message": format!(
                "Interview #{} not found for candidate #{}.",
                interview_id, candidate_id
            ),
        }));
    };
    log_comm(
        conn,
        candidate_id,
        "interview_invitation",
        &format!("Interview Invitation - Round {}", int(&row, "round")),
        &format!("Scheduled: {}", text(&row, "scheduled_at")),
        str_or(input, "sent_by", "recruiter"),
    )?;
    Ok(json!({
        "success": true,
        "scheduled_at": row["scheduled_at"],
        "meeting_link": row["meeting_link"],
        "message": format!("Interview invitation logged for {}.", text(&row, "candidate_email")),
    }))
}

fn send_rejection(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let feedback = str_or(input, "feedback", "");
    let Some(row) = candidate(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };
    log_comm(
        conn,
        candidate_id,
        "rejection",
        &format!("Application Update - {}", text(&row, "job_title")),
        &format!("Rejection sent. Feedback: {}", feedback),
        str_or(input, "sent_by", "recruiter"),
    )?;
    Ok(json!({
        "success": true,
        "candidate": row["name"],
        "message": format!("Rejection message logged for {}.", text(&row, "email")),
    }))
}

fn send_offer_notification(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let offer_id = req_i64(input, "offer_id")?;
    let row = query_one(
        conn,
        "SELECT o.salary, substr(o.start_date, 1, 10) AS start_date,
                c.name, c.email, j.title AS job_title
         FROM offers o
         JOIN candidates c ON c.id = o.candidate_id
         JOIN jobs j ON j.id = o.job_id
         WHERE o.id = ?1 AND o.candidate_id = ?2",
        params![offer_id, candidate_id],
    )?;
    let Some(row) = row else {
        return Ok(json!({
            "success": false,
            "message": format!("Offer #{} not found for candidate #{}.", offer_id, candidate_id),
        }));
    };
    log_comm(
        conn,
        candidate_id,
        "offer",
        &format!("Offer Letter - {}", text(&row, "job_title")),
        &format!("Offer extended at {} per annum.", rupees(num(&row, "salary"))),
        str_or(input, "sent_by", "hr_manager"),
    )?;
    Ok(json!({
        "success": true,
        "candidate": row["name"],
        "start_date": row["start_date"],
        "message": format!("Offer notification logged for {}.", text(&row, "email")),
    }))
}

fn send_bulk_status_update(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let subject = req_str(input, "subject")?;
    let message = req_str(input, "message")?;
    let sent_by = str_or(input, "sent_by", "hr");

    let active = query_rows(
        conn,
        "SELECT id, name, email FROM candidates
         WHERE job_id = ?1 AND status NOT IN ('hired', 'rejected') ORDER BY id",
        params![job_id],
    )?;
    if active.is_empty() {
        return Ok(json!({
            "success": false,
            "message": format!("No active candidates for job #{}.", job_id),
        }));
    }

    let preview: String = message.chars().take(100).collect();
    let tx = conn.unchecked_transaction()?;
    for c in &active {
        log_comm(&tx, int(c, "id"), "bulk_update", subject, &preview, sent_by)?;
    }
    tx.commit()?;

    let recipients: Vec<&str> = active.iter().map(|c| text(c, "email")).collect();
    Ok(json!({
        "success": true,
        "sent": active.len(),
        "recipients": recipients,
        "message": format!("Bulk update logged for {} candidates for job #{}.", active.len(), job_id),
    }))
}

fn get_communication_history(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let rows = query_rows(
        conn,
        "SELECT id, type, subject, body_preview, substr(sent_at, 1, 16) AS sent_at, sent_by, status
         FROM communications WHERE candidate_id = ?1 ORDER BY sent_at DESC, id DESC",
        params![candidate_id],
    )?;
    if rows.is_empty() {
        return Ok(json!([{
            "message": format!("No communications found for candidate #{}.", candidate_id),
        }]));
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

    fn log_count(conn: &Connection, candidate_id: i64) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM communications WHERE candidate_id = ?1",
            params![candidate_id],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_single_messages_are_logged() {
        let conn = seeded(AppKind::Hr);
        let before = log_count(&conn, 3);
        let out = run(&conn, "send_application_confirmation_email", json!({"candidate_id": 3}));
        assert_eq!(out["message"], "Application confirmation logged for rohit.jain@email.com.");
        let status = run(
            &conn,
            "send_candidate_status_update",
            json!({"candidate_id": 3, "new_status": "under_review"}),
        );
        assert_eq!(status["success"], true);
        assert_eq!(log_count(&conn, 3), before + 2);

        let history = run(&conn, "get_communication_history", json!({"candidate_id": 3}));
        assert_eq!(history[0]["subject"], "Status Update - Under Review");
        assert_eq!(history[0]["status"], "logged");

        let missing = run(&conn, "send_rejection", json!({"candidate_id": 404}));
        assert_eq!(missing["message"], "Candidate #404 not found.");
    }

    #[test]
    fn test_invite_and_offer_need_matching_records() {
        let conn = seeded(AppKind::Hr);
        let invite = run(&conn, "send_interview_invite", json!({"candidate_id": 9, "interview_id": 3}));
        assert_eq!(invite["scheduled_at"], "2026-03-05 11:00");
        let wrong = run(&conn, "send_interview_invite", json!({"candidate_id": 1, "interview_id": 3}));
        assert_eq!(wrong["message"], "Interview #3 not found for candidate #1.");

        let offer = run(&conn, "send_offer_notification", json!({"candidate_id": 6, "offer_id": 1}));
        assert_eq!(offer["success"], true);
        let preview: String = conn
            .query_row(
                "SELECT body_preview FROM communications WHERE candidate_id = 6 ORDER BY id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(preview, "Offer extended at ₹2,800,000 per annum.");
    }

    #[test]
    fn test_bulk_update_skips_closed_candidates() {
        let conn = seeded(AppKind::Hr);
        // job 1 has Karan rejected, four others active
        let out = run(
            &conn,
            "send_bulk_status_update",
            json!({"job_id": 1, "subject": "Hiring update", "message": "We are still reviewing."}),
        );
        assert_eq!(out["sent"], 4);
        assert_eq!(log_count(&conn, 5), 1);

        let none = run(
            &conn,
            "send_bulk_status_update",
            json!({"job_id": 7, "subject": "x", "message": "y"}),
        );
        assert_eq!(none["success"], false);
    }

    #[test]
    fn test_empty_history() {
        let conn = seeded(AppKind::Hr);
        let out = run(&conn, "get_communication_history", json!({"candidate_id": 15}));
        assert_eq!(out[0]["message"], "No communications found for candidate #15.");
    }
}
