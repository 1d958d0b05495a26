//! New hire onboarding checklists

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{flag, int, query_one, query_rows, round_to, text};
use bizdesk_store::time::parse_date;

use crate::tools::params::{req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const CANDIDATE_ID: Param = Param::req("candidate_id", Kind::Integer, "Hired candidate id");

const TASK_CATEGORIES: &[&str] = &[
    "it_setup",
    "documentation",
    "training",
    "access",
    "orientation",
    "other",
];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "create_onboarding_record",
        description: "Start onboarding for a hired candidate. start_date: YYYY-MM-DD.",
        params: &[
            CANDIDATE_ID,
            Param::req("start_date", Kind::String, "First working day, YYYY-MM-DD"),
        ],
        handler: Handler::Sql(create_onboarding_record),
    },
    ToolSpec {
        name: "get_onboarding_status",
        description: "Completion percentage and checklist tasks for a new hire.",
        params: &[CANDIDATE_ID],
        handler: Handler::Sql(get_onboarding_status),
    },
    ToolSpec {
        name: "create_checklist_item",
        description: "Add a checklist task. category: it_setup, documentation, training, access, orientation or other.",
        params: &[
            CANDIDATE_ID,
            Param::req("task_name", Kind::String, "Task description"),
            Param::req("category", Kind::String, "Task category"),
            Param::opt("assigned_to", Kind::String, "Owner email"),
            Param::opt("due_date", Kind::String, "Due date, YYYY-MM-DD"),
        ],
        handler: Handler::Sql(create_checklist_item),
    },
    ToolSpec {
        name: "complete_checklist_item",
        description: "Mark a checklist task as done and update overall progress.",
        params: &[
            Param::req("task_id", Kind::Integer, "Checklist task id"),
            Param::opt("completed_by", Kind::String, "Who completed it"),
        ],
        handler: Handler::Sql(complete_checklist_item),
    },
    ToolSpec {
        name: "send_welcome_email",
        description: "Log the day-1 welcome message for a new hire.",
        params: &[CANDIDATE_ID],
        handler: Handler::Sql(send_welcome_email),
    },
    ToolSpec {
        name: "send_checkin_email",
        description: "Log a 30, 60 or 90 day check-in message for a new hire.",
        params: &[
            CANDIDATE_ID,
            Param::req("day_milestone", Kind::Integer, "30, 60 or 90"),
        ],
        handler: Handler::Sql(send_checkin_email),
    },
    ToolSpec {
        name: "get_pending_onboardings",
        description: "New hires whose onboarding is not complete.",
        params: &[],
        handler: Handler::Sql(get_pending_onboardings),
    },
    ToolSpec {
        name: "assign_buddy",
        description: "Assign an onboarding buddy to a new hire.",
        params: &[
            CANDIDATE_ID,
            Param::req("buddy_email", Kind::String, "Buddy email"),
            Param::req("buddy_name", Kind::String, "Buddy name"),
        ],
        handler: Handler::Sql(assign_buddy),
    },
];

fn no_record(candidate_id: i64) -> Value {
    json!({
        "success": false,
        "message": format!("No onboarding record for candidate #{}.", candidate_id),
    })
}

fn onboarding_for(conn: &Connection, candidate_id: i64) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT o.id, o.candidate_id, o.job_id, substr(o.start_date, 1, 10) AS start_date,
                o.buddy_email, o.buddy_name, o.completion_pct, o.status, o.welcome_sent,
                c.name AS candidate_name, c.email AS candidate_email, j.title AS job_title
         FROM onboarding o
         JOIN candidates c ON c.id = o.candidate_id
         JOIN jobs j ON j.id = o.job_id
         WHERE o.candidate_id = ?1",
        params![candidate_id],
    )
}

/// Recompute completion for an onboarding record; returns (pct, total tasks)
fn refresh_progress(conn: &Connection, onboarding_id: i64) -> Result<(f64, i64)> {
    let (total, done): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM onboarding_tasks WHERE onboarding_id = ?1",
        params![onboarding_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let pct = if total == 0 {
        0.0
    } else {
        round_to(done as f64 / total as f64 * 100.0, 1)
    };
    conn.execute(
        "UPDATE onboarding SET completion_pct = ?1 WHERE id = ?2",
        params![pct, onboarding_id],
    )?;
    Ok((pct, total))
}

fn log_message(conn: &Connection, candidate_id: i64, kind: &str, subject: &str, preview: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, ?2, ?3, ?4, 'onboarding')",
        params![candidate_id, kind, subject, preview],
    )?;
    Ok(())
}

fn create_onboarding_record(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let start_date = req_str(input, "start_date")?;
    if parse_date(start_date).is_none() {
        return Ok(json!({"success": false, "message": "start_date must be YYYY-MM-DD."}));
    }

    let hire = query_one(
        conn,
        "SELECT c.name, c.job_id, j.title AS job_title FROM candidates c
         JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1 AND c.status = 'hired'",
        params![candidate_id],
    )?;
    let Some(hire) = hire else {
        return Ok(json!({
            "success": false,
            "message": format!(
                "Candidate #{} not found or not in 'hired' status. Only hired candidates can be onboarded.",
                candidate_id
            ),
        }));
    };
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM onboarding WHERE candidate_id = ?1",
            params![candidate_id],
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(json!({
            "success": false,
            "message": format!("Onboarding record already exists for candidate #{}.", candidate_id),
        }));
    }

    conn.execute(
        "INSERT INTO onboarding (candidate_id, job_id, start_date, status) VALUES (?1, ?2, ?3, 'pending')",
        params![candidate_id, int(&hire, "job_id"), start_date],
    )?;
    let onboarding_id = conn.last_insert_rowid();
    let name = text(&hire, "name");
    Ok(json!({
        "success": true,
        "onboarding_id": onboarding_id,
        "candidate": name,
        "job_title": hire["job_title"],
        "start_date": start_date,
        "message": format!(
            "Onboarding record created for {} (ID {}). Add checklist tasks next.",
            name, onboarding_id
        ),
    }))
}

fn get_onboarding_status(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let Some(mut record) = onboarding_for(conn, candidate_id)? else {
        return Ok(json!({
            "found": false,
            "message": format!("No onboarding record for candidate #{}.", candidate_id),
        }));
    };

    let tasks = query_rows(
        conn,
        "SELECT id, task_name, category, assigned_to, substr(due_date, 1, 10) AS due_date,
                completed, substr(completed_at, 1, 16) AS completed_at
         FROM onboarding_tasks WHERE onboarding_id = ?1 ORDER BY category, due_date, id",
        params![int(&record, "id")],
    )?;
    let completed = tasks.iter().filter(|t| flag(t, "completed")).count();
    record["found"] = json!(true);
    record["total_tasks"] = json!(tasks.len());
    record["completed_tasks"] = json!(completed);
    record["pending_tasks"] = json!(tasks.len() - completed);
    record["tasks"] = Value::Array(tasks);
    Ok(record)
}

fn create_checklist_item(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let task_name = req_str(input, "task_name")?;
    let category = req_str(input, "category")?.to_lowercase();
    let due_date = str_or(input, "due_date", "");

    if !TASK_CATEGORIES.contains(&category.as_str()) {
        return Ok(json!({
            "success": false,
            "message": format!("Invalid category. Valid: {}", TASK_CATEGORIES.join(", ")),
        }));
    }
    let onboarding_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM onboarding WHERE candidate_id = ?1",
            params![candidate_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(onboarding_id) = onboarding_id else {
        return Ok(json!({
            "success": false,
            "message": format!(
                "No onboarding record for candidate #{}. Create onboarding record first.",
                candidate_id
            ),
        }));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO onboarding_tasks (onboarding_id, task_name, category, assigned_to, due_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            onboarding_id,
            task_name,
            category,
            str_or(input, "assigned_to", ""),
            if due_date.is_empty() { None } else { Some(due_date) },
        ],
    )?;
    let task_id = tx.last_insert_rowid();
    refresh_progress(&tx, onboarding_id)?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "task_id": task_id,
        "task_name": task_name,
        "category": category,
        "due_date": due_date,
        "message": format!("Task '{}' added to onboarding checklist.", task_name),
    }))
}

fn complete_checklist_item(conn: &Connection, input: &Value) -> Result<Value> {
    let task_id = req_i64(input, "task_id")?;
    let completed_by = str_or(input, "completed_by", "system");

    let task: Option<(i64, String)> = conn
        .query_row(
            "SELECT onboarding_id, task_name FROM onboarding_tasks WHERE id = ?1",
            params![task_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((onboarding_id, task_name)) = task else {
        return Ok(json!({"success": false, "message": format!("Task #{} not found.", task_id)}));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE onboarding_tasks SET completed = 1, completed_at = CURRENT_TIMESTAMP,
                notes = COALESCE(notes, 'Completed by ' || ?1)
         WHERE id = ?2",
        params![completed_by, task_id],
    )?;
    let (pct, _) = refresh_progress(&tx, onboarding_id)?;
    let status = if pct >= 100.0 { "completed" } else { "in_progress" };
    tx.execute(
        "UPDATE onboarding SET status = ?1 WHERE id = ?2",
        params![status, onboarding_id],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "task_id": task_id,
        "task_name": task_name,
        "completion_pct": pct,
        "onboarding_status": status,
        "message": format!("Task '{}' marked complete. Overall progress: {}%", task_name, pct),
    }))
}

fn send_welcome_email(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let Some(record) = onboarding_for(conn, candidate_id)? else {
        return Ok(no_record(candidate_id));
    };

    let buddy = match text(&record, "buddy_name") {
        "" => "Your HR Partner",
        name => name,
    };
    let tx = conn.unchecked_transaction()?;
    log_message(
        &tx,
        candidate_id,
        "welcome",
        &format!("Welcome to the team - {}", text(&record, "job_title")),
        &format!("Day 1 on {}. Your buddy: {}", text(&record, "start_date"), buddy),
    )?;
    tx.execute(
        "UPDATE onboarding SET welcome_sent = 1 WHERE id = ?1",
        params![int(&record, "id")],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "candidate": record["candidate_name"],
        "message": format!("Welcome message logged for {}.", text(&record, "candidate_email")),
    }))
}

fn send_checkin_email(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let milestone = req_i64(input, "day_milestone")?;
    if ![30, 60, 90].contains(&milestone) {
        return Ok(json!({"success": false, "message": "day_milestone must be 30, 60, or 90."}));
    }
    let Some(record) = onboarding_for(conn, candidate_id)? else {
        return Ok(no_record(candidate_id));
    };

    log_message(
        conn,
        candidate_id,
        "checkin",
        &format!("{}-day check-in", milestone),
        &format!("How are your first {} days as {} going?", milestone, text(&record, "job_title")),
    )?;
    Ok(json!({
        "success": true,
        "milestone": format!("{}-day", milestone),
        "message": format!(
            "{}-day check-in message logged for {}.",
            milestone,
            text(&record, "candidate_email")
        ),
    }))
}

fn get_pending_onboardings(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT o.id, substr(o.start_date, 1, 10) AS start_date, o.completion_pct, o.status,
                o.welcome_sent, c.name AS candidate_name, c.email AS candidate_email,
                j.title AS job_title
         FROM onboarding o
         JOIN candidates c ON c.id = o.candidate_id
         JOIN jobs j ON j.id = o.job_id
         WHERE o.status != 'completed'
         ORDER BY o.start_date",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "All onboarding records are complete!"}]));
    }
    Ok(Value::Array(rows))
}

fn assign_buddy(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let buddy_email = req_str(input, "buddy_email")?;
    let buddy_name = req_str(input, "buddy_name")?;
    let Some(record) = onboarding_for(conn, candidate_id)? else {
        return Ok(no_record(candidate_id));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE onboarding SET buddy_email = ?1, buddy_name = ?2 WHERE id = ?3",
        params![buddy_email, buddy_name, int(&record, "id")],
    )?;
    log_message(
        &tx,
        candidate_id,
        "buddy_intro",
        &format!("Meet your onboarding buddy, {}", buddy_name),
        &format!("{} ({}) will help you settle in.", buddy_name, buddy_email),
    )?;
    tx.commit()?;

    let name = text(&record, "candidate_name");
    Ok(json!({
        "success": true,
        "candidate": name,
        "buddy_name": buddy_name,
        "buddy_email": buddy_email,
        "message": format!("{} assigned as buddy for {}. Introduction logged.", buddy_name, name),
    }))
}
