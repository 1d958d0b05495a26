//! Job postings

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{int, query_one, query_rows};

use crate::tools::params::{f64_or, i64_or, opt_f64, opt_str, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const JOB_ID: Param = Param::req("job_id", Kind::Integer, "Job posting id");

pub(crate) const PIPELINE_STATUSES: &[&str] = &[
    "applied",
    "screening",
    "shortlisted",
    "interview",
    "offer",
    "hired",
    "rejected",
];

const JOB_STATUSES: &[&str] = &["open", "closed", "on_hold", "draft"];

const LISTING_COLUMNS: &str = "id, title, department, status, location, salary_min, salary_max,
    substr(deadline, 1, 10) AS deadline, substr(created_at, 1, 10) AS created_at";

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "create_job_posting",
        description: "Create a new open job posting. deadline format: YYYY-MM-DD.",
        params: &[
            Param::req("title", Kind::String, "Job title"),
            Param::req("department", Kind::String, "Department"),
            Param::req("description", Kind::String, "Role description"),
            Param::req("required_skills", Kind::String, "Comma-separated skills"),
            Param::opt("experience_years", Kind::Integer, "Minimum years of experience"),
            Param::opt("salary_min", Kind::Number, "Lower salary bound"),
            Param::opt("salary_max", Kind::Number, "Upper salary bound"),
            Param::opt("location", Kind::String, "Office location or Remote"),
            Param::opt("deadline", Kind::String, "Application deadline, YYYY-MM-DD"),
            Param::opt("created_by", Kind::String, "Creator email"),
        ],
        handler: Handler::Sql(create_job_posting),
    },
    ToolSpec {
        name: "get_job_posting",
        description: "Full details of a job posting by id.",
        params: &[JOB_ID],
        handler: Handler::Sql(get_job_posting),
    },
    ToolSpec {
        name: "list_all_jobs",
        description: "List job postings. status: open/closed/on_hold/draft/all. department: name or all.",
        params: &[
            Param::opt("status", Kind::String, "Status filter, default all"),
            Param::opt("department", Kind::String, "Department filter, default all"),
        ],
        handler: Handler::Sql(list_all_jobs),
    },
    ToolSpec {
        name: "update_job_posting",
        description: "Update fields of a job posting. Only non-empty fields are changed.",
        params: &[
            JOB_ID,
            Param::opt("title", Kind::String, "New title"),
            Param::opt("department", Kind::String, "New department"),
            Param::opt("required_skills", Kind::String, "New skills list"),
            Param::opt("salary_min", Kind::Number, "New lower salary bound"),
            Param::opt("salary_max", Kind::Number, "New upper salary bound"),
            Param::opt("deadline", Kind::String, "New deadline"),
            Param::opt("status", Kind::String, "New status"),
        ],
        handler: Handler::Sql(update_job_posting),
    },
    ToolSpec {
        name: "close_job_posting",
        description: "Close a job posting and record the reason.",
        params: &[
            JOB_ID,
            Param::opt("reason", Kind::String, "Why the job is closed, default Position filled"),
        ],
        handler: Handler::Sql(close_job_posting),
    },
    ToolSpec {
        name: "get_job_applications_count",
        description: "Candidate counts per pipeline stage for a job.",
        params: &[JOB_ID],
        handler: Handler::Sql(get_job_applications_count),
    },
    ToolSpec {
        name: "search_jobs_by_skill",
        description: "Open jobs whose skills, title or description mention a keyword.",
        params: &[Param::req("skill_keyword", Kind::String, "Skill or keyword")],
        handler: Handler::Sql(search_jobs_by_skill),
    },
    ToolSpec {
        name: "get_department_jobs",
        description: "All job postings of a department.",
        params: &[Param::req("department", Kind::String, "Department name")],
        handler: Handler::Sql(get_department_jobs),
    },
];

fn create_job_posting(conn: &Connection, input: &Value) -> Result<Value> {
    let title = req_str(input, "title")?;
    let department = req_str(input, "department")?;
    let description = req_str(input, "description")?;
    let skills = req_str(input, "required_skills")?;
    let experience = i64_or(input, "experience_years", 0)?;
    let salary_min = f64_or(input, "salary_min", 0.0)?;
    let salary_max = f64_or(input, "salary_max", 0.0)?;

    if salary_max > 0.0 && salary_min > salary_max {
        return Ok(json!({"success": false, "message": "salary_min cannot exceed salary_max."}));
    }

    conn.execute(
        "INSERT INTO jobs (title, department, description, required_skills, experience_years,
                           salary_min, salary_max, location, deadline, created_by, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'open')",
        params![
            title,
            department,
            description,
            skills,
            experience,
            salary_min,
            salary_max,
            str_or(input, "location", ""),
            opt_str(input, "deadline"),
            str_or(input, "created_by", ""),
        ],
    )?;
    let job_id = conn.last_insert_rowid();
    Ok(json!({
        "success": true,
        "job_id": job_id,
        "title": title,
        "status": "open",
        "message": format!("Job posting '{}' created successfully with ID {}.", title, job_id),
    }))
}

fn get_job_posting(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let job = query_one(
        conn,
        "SELECT id, title, department, description, required_skills, experience_years,
                salary_min, salary_max, location, job_type, status,
                substr(deadline, 1, 10) AS deadline, created_by,
                substr(created_at, 1, 10) AS created_at, substr(updated_at, 1, 10) AS updated_at
         FROM jobs WHERE id = ?1",
        params![job_id],
    )?;
    Ok(match job {
        Some(mut job) => {
            job["found"] = json!(true);
            job
        }
        None => json!({"found": false, "message": format!("Job #{} not found.", job_id)}),
    })
}

fn list_all_jobs(conn: &Connection, input: &Value) -> Result<Value> {
    let status = str_or(input, "status", "all").to_lowercase();
    let department = str_or(input, "department", "all");

    let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", LISTING_COLUMNS);
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    if status != "all" {
        args.push(Box::new(status));
        sql.push_str(&format!(" AND status = ?{}", args.len()));
    }
    if !department.eq_ignore_ascii_case("all") {
        args.push(Box::new(format!("%{}%", department)));
        sql.push_str(&format!(" AND department LIKE ?{}", args.len()));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No jobs found matching filters."}]));
    }
    Ok(Value::Array(rows))
}

fn update_job_posting(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;

    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    for column in ["title", "department", "required_skills", "deadline"] {
        if let Some(value) = opt_str(input, column) {
            args.push(Box::new(value.to_string()));
            sets.push(format!("{} = ?{}", column, args.len()));
        }
    }
    for column in ["salary_min", "salary_max"] {
        if let Some(value) = opt_f64(input, column)?.filter(|v| *v != 0.0) {
            args.push(Box::new(value));
            sets.push(format!("{} = ?{}", column, args.len()));
        }
    }
    if let Some(status) = opt_str(input, "status") {
        let status = status.to_lowercase();
        if !JOB_STATUSES.contains(&status.as_str()) {
            return Ok(json!({
                "success": false,
                "message": format!("Invalid status. Choose from: {}", JOB_STATUSES.join(", ")),
            }));
        }
        args.push(Box::new(status));
        sets.push(format!("status = ?{}", args.len()));
    }

    if sets.is_empty() {
        return Ok(json!({"success": false, "message": "No fields to update."}));
    }
    sets.push("updated_at = CURRENT_TIMESTAMP".to_string());
    args.push(Box::new(job_id));
    let sql = format!("UPDATE jobs SET {} WHERE id = ?{}", sets.join(", "), args.len());

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    if conn.execute(&sql, refs.as_slice())? == 0 {
        return Ok(json!({"success": false, "message": format!("Job #{} not found.", job_id)}));
    }
    Ok(json!({
        "success": true,
        "job_id": job_id,
        "message": format!("Job #{} updated successfully.", job_id),
    }))
}

fn close_job_posting(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let reason = str_or(input, "reason", "Position filled");

    let title: Option<String> = conn
        .query_row("SELECT title FROM jobs WHERE id = ?1", params![job_id], |r| r.get(0))
        .optional()?;
    let Some(title) = title else {
        return Ok(json!({"success": false, "message": format!("Job #{} not found.", job_id)}));
    };
    conn.execute(
        "UPDATE jobs SET status = 'closed', updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![job_id],
    )?;
    Ok(json!({
        "success": true,
        "job_id": job_id,
        "title": title,
        "message": format!("Job '{}' closed. Reason: {}", title, reason),
    }))
}

fn get_job_applications_count(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let title: Option<String> = conn
        .query_row("SELECT title FROM jobs WHERE id = ?1", params![job_id], |r| r.get(0))
        .optional()?;
    let Some(title) = title else {
        return Ok(json!({"found": false, "message": format!("Job #{} not found.", job_id)}));
    };

    let counts = query_rows(
        conn,
        "SELECT status, COUNT(*) AS count FROM candidates WHERE job_id = ?1 GROUP BY status",
        params![job_id],
    )?;

    let mut out = Map::new();
    out.insert("job_id".into(), json!(job_id));
    out.insert("title".into(), json!(title));
    let mut total = 0;
    for status in PIPELINE_STATUSES {
        let n = counts
            .iter()
            .find(|c| c["status"] == *status)
            .map(|c| int(c, "count"))
            .unwrap_or(0);
        total += n;
        out.insert(status.to_string(), json!(n));
    }
    out.insert("total".into(), json!(total));
    Ok(Value::Object(out))
}

fn search_jobs_by_skill(conn: &Connection, input: &Value) -> Result<Value> {
    let keyword = req_str(input, "skill_keyword")?;
    let rows = query_rows(
        conn,
        "SELECT id, title, department, required_skills, salary_min, salary_max, location,
                substr(deadline, 1, 10) AS deadline
         FROM jobs WHERE status = 'open'
           AND (required_skills LIKE ?1 OR title LIKE ?1 OR description LIKE ?1)
         ORDER BY created_at DESC, id DESC",
        params![format!("%{}%", keyword)],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No open jobs found matching '{}'.", keyword)}]));
    }
    Ok(Value::Array(rows))
}

fn get_department_jobs(conn: &Connection, input: &Value) -> Result<Value> {
    let department = req_str(input, "department")?;
    let rows = query_rows(
        conn,
        "SELECT id, title, status, location, salary_min, salary_max,
                substr(deadline, 1, 10) AS deadline, required_skills
         FROM jobs WHERE department LIKE ?1 ORDER BY status, created_at DESC, id DESC",
        params![format!("%{}%", department)],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No jobs found for department '{}'.", department)}]));
    }
    Ok(Value::Array(rows))
}
