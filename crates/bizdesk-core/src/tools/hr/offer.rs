//! Offer letters: drafting, approval, delivery and responses

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, num, query_one, query_rows, round_to, text};

use crate::tools::fmt::rupees;
use crate::tools::params::{req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const OFFER_ID: Param = Param::req("offer_id", Kind::Integer, "Offer id");

const OFFER_STATUSES: &[&str] = &[
    "draft",
    "pending_approval",
    "approved",
    "sent",
    "accepted",
    "declined",
    "expired",
];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "generate_offer",
        description: "Create an offer awaiting approval. salary is annual; start_date YYYY-MM-DD.",
        params: &[
            Param::req("candidate_id", Kind::Integer, "Candidate id"),
            Param::req("job_id", Kind::Integer, "Job id"),
            Param::req("salary", Kind::Number, "Annual salary"),
            Param::opt("currency", Kind::String, "Currency, default INR"),
            Param::req("start_date", Kind::String, "Joining date, YYYY-MM-DD"),
            Param::opt("benefits", Kind::String, "Benefits summary"),
            Param::opt("equity", Kind::String, "Equity terms"),
            Param::opt("created_by", Kind::String, "Creator email"),
        ],
        handler: Handler::Sql(generate_offer),
    },
    ToolSpec {
        name: "get_offer_details",
        description: "Offer letter details including approval status.",
        params: &[OFFER_ID],
        handler: Handler::Sql(get_offer_details),
    },
    ToolSpec {
        name: "list_offers_by_status",
        description: "Offers filtered by status: draft, pending_approval, approved, sent, accepted, declined, expired or all.",
        params: &[Param::opt("status", Kind::String, "Status filter, default all")],
        handler: Handler::Sql(list_offers_by_status),
    },
    ToolSpec {
        name: "approve_offer",
        description: "Approve an offer that is pending approval.",
        params: &[OFFER_ID, Param::req("approved_by", Kind::String, "Approver email")],
        handler: Handler::Sql(approve_offer),
    },
    ToolSpec {
        name: "send_offer_to_candidate",
        description: "Send an approved offer to the candidate.",
        params: &[OFFER_ID, Param::opt("sent_by", Kind::String, "Sender email")],
        handler: Handler::Sql(send_offer_to_candidate),
    },
    ToolSpec {
        name: "record_offer_response",
        description: "Record the candidate's response: accepted or declined.",
        params: &[
            OFFER_ID,
            Param::req("response", Kind::String, "accepted or declined"),
            Param::opt("decline_reason", Kind::String, "Reason when declined"),
        ],
        handler: Handler::Sql(record_offer_response),
    },
    ToolSpec {
        name: "get_offer_analytics",
        description: "Offer counts by outcome, acceptance rate and average days to decision.",
        params: &[],
        handler: Handler::Sql(get_offer_analytics),
    },
];

fn offer_missing(offer_id: i64) -> Value {
    json!({"success": false, "message": format!("Offer #{} not found.", offer_id)})
}

fn generate_offer(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let job_id = req_i64(input, "job_id")?;
    let salary = req_f64(input, "salary")?;
    let currency = str_or(input, "currency", "INR").to_uppercase();
    let start_date = req_str(input, "start_date")?;

    if salary <= 0.0 {
        return Ok(json!({"success": false, "message": "Salary must be greater than zero."}));
    }
    let row = query_one(
        conn,
        "SELECT c.name, j.title AS job_title FROM candidates c
         JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1 AND c.job_id = ?2",
        params![candidate_id, job_id],
    )?;
    let Some(row) = row else {
        return Ok(json!({
            "success": false,
            "message": format!("Candidate #{} not found for job #{}.", candidate_id, job_id),
        }));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO offers (candidate_id, job_id, salary, currency, start_date, benefits, equity,
                             status, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending_approval', ?8)",
        params![
            candidate_id,
            job_id,
            salary,
            currency,
            start_date,
            str_or(input, "benefits", ""),
            str_or(input, "equity", ""),
            str_or(input, "created_by", ""),
        ],
    )?;
    let offer_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE candidates SET status = 'offer', updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![candidate_id],
    )?;
    tx.commit()?;

    let name = text(&row, "name");
    Ok(json!({
        "success": true,
        "offer_id": offer_id,
        "candidate": name,
        "job_title": row["job_title"],
        "salary": salary,
        "currency": currency,
        "status": "pending_approval",
        "message": format!("Offer #{} created for {}. Awaiting HR Manager approval.", offer_id, name),
    }))
}

fn offer_with_candidate(conn: &Connection, offer_id: i64) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT o.id, o.candidate_id, o.job_id, o.salary, o.currency,
                substr(o.start_date, 1, 10) AS start_date, o.benefits, o.equity, o.status,
                o.approved_by, substr(o.approved_at, 1, 16) AS approved_at,
                substr(o.sent_at, 1, 16) AS sent_at, substr(o.response_at, 1, 16) AS response_at,
                o.decline_reason, o.created_by, substr(o.created_at, 1, 16) AS created_at,
                c.name AS candidate_name, c.email AS candidate_email, j.title AS job_title
         FROM offers o
         JOIN candidates c ON c.id = o.candidate_id
         JOIN jobs j ON j.id = o.job_id
         WHERE o.id = ?1",
        params![offer_id],
    )
}

fn get_offer_details(conn: &Connection, input: &Value) -> Result<Value> {
    let offer_id = req_i64(input, "offer_id")?;
    Ok(match offer_with_candidate(conn, offer_id)? {
        Some(mut offer) => {
            offer["found"] = json!(true);
            offer
        }
        None => json!({"found": false, "message": format!("Offer #{} not found.", offer_id)}),
    })
}

fn list_offers_by_status(conn: &Connection, input: &Value) -> Result<Value> {
    let status = str_or(input, "status", "all").to_lowercase();
    let mut sql = String::from(
        "SELECT o.id, o.status, o.salary, o.currency, substr(o.start_date, 1, 10) AS start_date,
                substr(o.created_at, 1, 10) AS created_at,
                c.name AS candidate_name, j.title AS job_title
         FROM offers o
         JOIN candidates c ON c.id = o.candidate_id
         JOIN jobs j ON j.id = o.job_id",
    );
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    if status != "all" {
        if !OFFER_STATUSES.contains(&status.as_str()) {
            return Ok(json!([{
                "message": format!("Invalid status. Valid: {}, all", OFFER_STATUSES.join(", ")),
            }]));
        }
        sql.push_str(" WHERE o.status = ?1");
        args.push(Box::new(status.clone()));
    }
    sql.push_str(" ORDER BY o.created_at DESC, o.id DESC");

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No offers found with status '{}'.", status)}]));
    }
    Ok(Value::Array(rows))
}

fn offer_status(conn: &Connection, offer_id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT status FROM offers WHERE id = ?1", params![offer_id], |r| r.get(0))
        .optional()?)
}

fn approve_offer(conn: &Connection, input: &Value) -> Result<Value> {
    let offer_id = req_i64(input, "offer_id")?;
    let approved_by = req_str(input, "approved_by")?;

    let Some(status) = offer_status(conn, offer_id)? else {
        return Ok(offer_missing(offer_id));
    };
    if status != "pending_approval" {
        return Ok(json!({
            "success": false,
            "message": format!(
                "Offer #{} is '{}'. Only 'pending_approval' offers can be approved.",
                offer_id, status
            ),
        }));
    }
    conn.execute(
        "UPDATE offers SET status = 'approved', approved_by = ?1, approved_at = CURRENT_TIMESTAMP
         WHERE id = ?2",
        params![approved_by, offer_id],
    )?;
    Ok(json!({
        "success": true,
        "offer_id": offer_id,
        "approved_by": approved_by,
        "message": format!("Offer #{} approved by {}. Ready to send to candidate.", offer_id, approved_by),
    }))
}

fn send_offer_to_candidate(conn: &Connection, input: &Value) -> Result<Value> {
    let offer_id = req_i64(input, "offer_id")?;
    let sent_by = str_or(input, "sent_by", "hr_manager");

    let Some(offer) = offer_with_candidate(conn, offer_id)? else {
        return Ok(offer_missing(offer_id));
    };
    let status = text(&offer, "status");
    if status != "approved" && status != "sent" {
        return Ok(json!({
            "success": false,
            "message": format!("Offer #{} must be 'approved' before sending. Current: {}", offer_id, status),
        }));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE offers SET status = 'sent', sent_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![offer_id],
    )?;
    tx.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, 'offer', ?2, ?3, ?4)",
        params![
            int(&offer, "candidate_id"),
            format!("Offer Letter - {}", text(&offer, "job_title")),
            format!("Annual CTC {} starting {}", rupees(num(&offer, "salary")), text(&offer, "start_date")),
            sent_by,
        ],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "offer_id": offer_id,
        "candidate": offer["candidate_name"],
        "message": format!("Offer #{} sent to {}.", offer_id, text(&offer, "candidate_email")),
    }))
}

fn record_offer_response(conn: &Connection, input: &Value) -> Result<Value> {
    let offer_id = req_i64(input, "offer_id")?;
    let response = req_str(input, "response")?.to_lowercase();
    let decline_reason = str_or(input, "decline_reason", "");

    if response != "accepted" && response != "declined" {
        return Ok(json!({"success": false, "message": "Response must be 'accepted' or 'declined'."}));
    }
    let Some(offer) = offer_with_candidate(conn, offer_id)? else {
        return Ok(offer_missing(offer_id));
    };

    let candidate_status = if response == "accepted" { "hired" } else { "rejected" };
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE offers SET status = ?1, response_at = CURRENT_TIMESTAMP, decline_reason = ?2 WHERE id = ?3",
        params![response, decline_reason, offer_id],
    )?;
    tx.execute(
        "UPDATE candidates SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![candidate_status, int(&offer, "candidate_id")],
    )?;
    tx.commit()?;

    let name = text(&offer, "candidate_name");
    Ok(json!({
        "success": true,
        "offer_id": offer_id,
        "response": response,
        "candidate": name,
        "candidate_status_updated": candidate_status,
        "message": format!("{} has {} the offer for {}.", name, response, text(&offer, "job_title")),
    }))
}

/// Acceptance rate over offers that received a response
pub(crate) fn acceptance_rate(accepted: i64, declined: i64) -> f64 {
    round_to(accepted as f64 / (accepted + declined).max(1) as f64 * 100.0, 1)
}

fn get_offer_analytics(conn: &Connection, _input: &Value) -> Result<Value> {
    let row = query_one(
        conn,
        "SELECT
           SUM(CASE WHEN status = 'sent' THEN 1 ELSE 0 END) AS sent,
           SUM(CASE WHEN status = 'accepted' THEN 1 ELSE 0 END) AS accepted,
           SUM(CASE WHEN status = 'declined' THEN 1 ELSE 0 END) AS declined,
           SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END) AS expired,
           AVG(CASE WHEN response_at IS NOT NULL AND sent_at IS NOT NULL
                    THEN julianday(response_at) - julianday(sent_at) END) AS avg_days
         FROM offers",
        [],
    )?
    .unwrap_or_else(|| json!({}));
    let reasons = query_rows(
        conn,
        "SELECT decline_reason, COUNT(*) AS count FROM offers
         WHERE status = 'declined' AND COALESCE(decline_reason, '') != ''
         GROUP BY decline_reason ORDER BY count DESC LIMIT 5",
        [],
    )?;

    let accepted = int(&row, "accepted");
    let declined = int(&row, "declined");
    Ok(json!({
        "offers_pending_response": int(&row, "sent"),
        "accepted": accepted,
        "declined": declined,
        "expired": int(&row, "expired"),
        "acceptance_rate_pct": acceptance_rate(accepted, declined),
        "avg_days_to_decision": round_to(num(&row, "avg_days"), 1),
        "top_decline_reasons": reasons,
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
    fn test_offer_lifecycle() {
        let conn = seeded(AppKind::Hr);
        let offer = run(
            &conn,
            "generate_offer",
            json!({"candidate_id": 9, "job_id": 3, "salary": 2300000, "start_date": "2026-04-01"}),
        );
        assert_eq!(offer["status"], "pending_approval");
        let offer_id = offer["offer_id"].as_i64().unwrap();

        let early = run(&conn, "send_offer_to_candidate", json!({"offer_id": offer_id}));
        assert_eq!(early["success"], false);

        let approved = run(&conn, "approve_offer", json!({"offer_id": offer_id, "approved_by": "hr.manager@hrapp.com"}));
        assert_eq!(approved["success"], true);
        let twice = run(&conn, "approve_offer", json!({"offer_id": offer_id, "approved_by": "hr.manager@hrapp.com"}));
        assert_eq!(twice["success"], false);

        let sent = run(&conn, "send_offer_to_candidate", json!({"offer_id": offer_id}));
        assert_eq!(sent["message"], format!("Offer #{} sent to sid.rao@email.com.", offer_id));

        let accepted = run(&conn, "record_offer_response", json!({"offer_id": offer_id, "response": "accepted"}));
        assert_eq!(accepted["candidate_status_updated"], "hired");
        let status: String = conn
            .query_row("SELECT status FROM candidates WHERE id = 9", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "hired");
    }

    #[test]
    fn test_listing_and_analytics() {
        let conn = seeded(AppKind::Hr);
        let sent = run(&conn, "list_offers_by_status", json!({"status": "sent"}));
        assert_eq!(sent[0]["candidate_name"], "Riya Desai");

        let none = run(&conn, "list_offers_by_status", json!({"status": "expired"}));
        assert_eq!(none[0]["message"], "No offers found with status 'expired'.");

        run(&conn, "record_offer_response", json!({"offer_id": 1, "response": "declined", "decline_reason": "Counter offer"}));
        let analytics = run(&conn, "get_offer_analytics", json!({}));
        assert_eq!(analytics["declined"], 1);
        assert_eq!(analytics["acceptance_rate_pct"], 0.0);
        assert_eq!(analytics["top_decline_reasons"][0]["decline_reason"], "Counter offer");

        let bad = run(&conn, "record_offer_response", json!({"offer_id": 1, "response": "maybe"}));
        assert_eq!(bad["success"], false);
        assert_eq!(acceptance_rate(3, 1), 75.0);
    }
}
