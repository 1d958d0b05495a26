//! Candidates, resume scoring and screening

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{int, query_one, query_rows, round_to, text};

use super::jobs::PIPELINE_STATUSES;
use crate::tools::params::{i64_or, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const CANDIDATE_ID: Param = Param::req("candidate_id", Kind::Integer, "Candidate id");

const TOP_SCHOOLS: &[&str] = &["iit", "iim", "bits", "nid", "nit"];
const DEGREES: &[&str] = &["b.tech", "m.tech", "mba", "b.des"];

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "submit_candidate",
        description: "Register a new candidate application for a job.",
        params: &[
            Param::req("name", Kind::String, "Candidate full name"),
            Param::req("email", Kind::String, "Candidate email"),
            Param::req("job_id", Kind::Integer, "Job applied for"),
            Param::opt("resume_text", Kind::String, "Resume summary"),
            Param::opt("source", Kind::String, "Where the candidate came from, default direct"),
            Param::opt("experience_years", Kind::Integer, "Years of experience"),
            Param::opt("current_role", Kind::String, "Current job title"),
            Param::opt("skills", Kind::String, "Comma-separated skills"),
            Param::opt("education", Kind::String, "Highest education"),
        ],
        handler: Handler::Sql(submit_candidate),
    },
    ToolSpec {
        name: "get_candidate_profile",
        description: "Full candidate profile with status, score and screening notes.",
        params: &[CANDIDATE_ID],
        handler: Handler::Sql(get_candidate_profile),
    },
    ToolSpec {
        name: "list_candidates_for_job",
        description: "Candidates who applied to a job, best score first. status filters the stage.",
        params: &[
            Param::req("job_id", Kind::Integer, "Job posting id"),
            Param::opt("status", Kind::String, "Pipeline stage or all"),
        ],
        handler: Handler::Sql(list_candidates_for_job),
    },
    ToolSpec {
        name: "score_resume",
        description: "Score a candidate against the job requirements (skills 50, experience 30, education 20) and save it.",
        params: &[CANDIDATE_ID],
        handler: Handler::Sql(score_resume),
    },
    ToolSpec {
        name: "update_candidate_status",
        description: "Move a candidate through the pipeline: applied, screening, shortlisted, interview, offer, hired, rejected.",
        params: &[
            CANDIDATE_ID,
            Param::req("new_status", Kind::String, "Target stage"),
            Param::opt("updated_by", Kind::String, "Who made the change"),
        ],
        handler: Handler::Sql(update_candidate_status),
    },
    ToolSpec {
        name: "shortlist_candidate",
        description: "Mark a candidate as shortlisted.",
        params: &[
            CANDIDATE_ID,
            Param::opt("shortlisted_by", Kind::String, "Recruiter email"),
        ],
        handler: Handler::Sql(shortlist_candidate),
    },
    ToolSpec {
        name: "reject_candidate",
        description: "Reject a candidate and log the rejection message.",
        params: &[
            CANDIDATE_ID,
            Param::opt("reason", Kind::String, "Reason for rejection"),
            Param::opt("rejected_by", Kind::String, "Recruiter email"),
        ],
        handler: Handler::Sql(reject_candidate),
    },
    ToolSpec {
        name: "get_top_candidates",
        description: "Top ranked active candidates for a job.",
        params: &[
            Param::req("job_id", Kind::Integer, "Job posting id"),
            Param::opt("top_n", Kind::Integer, "How many, default 5"),
        ],
        handler: Handler::Sql(get_top_candidates),
    },
    ToolSpec {
        name: "add_screening_note",
        description: "Add an internal recruiter note to a candidate.",
        params: &[
            CANDIDATE_ID,
            Param::req("note", Kind::String, "Note text"),
            Param::opt("created_by", Kind::String, "Author email"),
        ],
        handler: Handler::Sql(add_screening_note),
    },
];

/// Breakdown of a resume match against a job
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeScore {
    pub matched_skills: usize,
    pub required_skills: usize,
    pub skill_score: f64,
    pub experience_score: f64,
    pub education_score: f64,
}

impl ResumeScore {
    pub fn compute(required: &str, skills: &str, required_years: i64, years: i64, education: &str) -> Self {
        let split = |s: &str| -> Vec<String> { s.split(',').map(|p| p.trim().to_lowercase()).collect() };
        let required = split(required);
        let candidate = split(skills);

        // A skill counts when either name contains the other
        let matched = required
            .iter()
            .filter(|r| candidate.iter().any(|c| c.contains(r.as_str()) || r.contains(c.as_str())))
            .count();
        let skill_score = matched as f64 / required.len().max(1) as f64 * 50.0;
        let experience_score = (years as f64 / required_years.max(1) as f64 * 30.0).min(30.0);

        let education = education.to_lowercase();
        let education_score = if TOP_SCHOOLS.iter().any(|k| education.contains(k)) {
            20.0
        } else if DEGREES.iter().any(|k| education.contains(k)) {
            15.0
        } else {
            10.0
        };

        Self {
            matched_skills: matched,
            required_skills: required.len(),
            skill_score,
            experience_score,
            education_score,
        }
    }

    pub fn total(&self) -> f64 {
        round_to((self.skill_score + self.experience_score + self.education_score).min(100.0), 2)
    }
}

fn candidate_with_job(conn: &Connection, candidate_id: i64) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT c.name, c.email, j.title AS job_title FROM candidates c
         JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1",
        params![candidate_id],
    )
}

fn not_found(candidate_id: i64) -> Value {
    json!({"success": false, "message": format!("Candidate #{} not found.", candidate_id)})
}

fn submit_candidate(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "name")?;
    let email = req_str(input, "email")?.to_lowercase();
    let job_id = req_i64(input, "job_id")?;

    let duplicate: Option<i64> = conn
        .query_row(
            "SELECT id FROM candidates WHERE lower(email) = ?1 AND job_id = ?2",
            params![email, job_id],
            |r| r.get(0),
        )
        .optional()?;
    if duplicate.is_some() {
        return Ok(json!({
            "success": false,
            "message": format!("{} has already applied for job #{}.", email, job_id),
        }));
    }
    let title: Option<String> = conn
        .query_row("SELECT title FROM jobs WHERE id = ?1", params![job_id], |r| r.get(0))
        .optional()?;
    let Some(title) = title else {
        return Ok(json!({"success": false, "message": format!("Job #{} not found.", job_id)}));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO candidates (name, email, job_id, resume_text, source, experience_years,
                                 current_role, skills, education, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'applied')",
        params![
            name,
            email,
            job_id,
            str_or(input, "resume_text", ""),
            str_or(input, "source", "direct"),
            i64_or(input, "experience_years", 0)?,
            str_or(input, "current_role", ""),
            str_or(input, "skills", ""),
            str_or(input, "education", ""),
        ],
    )?;
    let candidate_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, 'application_confirmation', ?2, 'Application received.', 'system')",
        params![candidate_id, format!("Application Received - {}", title)],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "candidate_id": candidate_id,
        "name": name,
        "job_title": title,
        "message": format!("Candidate {} registered (ID {}). Confirmation logged.", name, candidate_id),
    }))
}

fn get_candidate_profile(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let profile = query_one(
        conn,
        "SELECT c.id, c.name, c.email, c.job_id, j.title AS job_title, c.resume_text, c.score,
                c.status, c.source, c.experience_years, c.current_role, c.skills, c.education,
                c.shortlisted, substr(c.created_at, 1, 16) AS created_at
         FROM candidates c LEFT JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1",
        params![candidate_id],
    )?;
    let Some(mut profile) = profile else {
        return Ok(json!({"found": false, "message": format!("Candidate #{} not found.", candidate_id)}));
    };

    let notes = query_rows(
        conn,
        "SELECT note, created_by, substr(created_at, 1, 16) AS created_at FROM screening_notes
         WHERE candidate_id = ?1 ORDER BY created_at DESC, id DESC",
        params![candidate_id],
    )?;
    profile["screening_notes"] = Value::Array(notes);
    profile["found"] = json!(true);
    Ok(profile)
}

fn list_candidates_for_job(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let status = str_or(input, "status", "all").to_lowercase();

    let mut sql = String::from(
        "SELECT id, name, email, status, score, source, experience_years, current_role,
                shortlisted, substr(created_at, 1, 10) AS created_at
         FROM candidates WHERE job_id = ?1",
    );
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(job_id)];
    if status != "all" {
        args.push(Box::new(status));
        sql.push_str(" AND status = ?2");
    }
    sql.push_str(" ORDER BY score DESC, created_at ASC, id ASC");

    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = query_rows(conn, &sql, refs.as_slice())?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No candidates found for job #{}.", job_id)}]));
    }
    Ok(Value::Array(rows))
}

fn score_resume(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let row = query_one(
        conn,
        "SELECT c.name, c.skills, c.experience_years, c.education,
                j.required_skills, j.experience_years AS required_years, j.title AS job_title
         FROM candidates c JOIN jobs j ON j.id = c.job_id WHERE c.id = ?1",
        params![candidate_id],
    )?;
    let Some(row) = row else {
        return Ok(json!({"found": false, "message": format!("Candidate #{} not found.", candidate_id)}));
    };

    let score = ResumeScore::compute(
        text(&row, "required_skills"),
        text(&row, "skills"),
        int(&row, "required_years"),
        int(&row, "experience_years"),
        text(&row, "education"),
    );
    let total = score.total();
    conn.execute(
        "UPDATE candidates SET score = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![total, candidate_id],
    )?;

    Ok(json!({
        "candidate_id": candidate_id,
        "name": row["name"],
        "job_title": row["job_title"],
        "final_score": total,
        "skill_score": round_to(score.skill_score, 1),
        "experience_score": round_to(score.experience_score, 1),
        "education_score": score.education_score,
        "matched_skills": score.matched_skills,
        "total_required_skills": score.required_skills,
        "message": format!("Resume scored: {}/100", total),
    }))
}

fn update_candidate_status(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let new_status = req_str(input, "new_status")?.to_lowercase();
    let updated_by = str_or(input, "updated_by", "system");

    if !PIPELINE_STATUSES.contains(&new_status.as_str()) {
        return Ok(json!({
            "success": false,
            "message": format!("Invalid status. Valid: {}", PIPELINE_STATUSES.join(", ")),
        }));
    }
    let Some(row) = candidate_with_job(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE candidates SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![new_status, candidate_id],
    )?;
    tx.execute(
        "INSERT INTO audit_log (user_email, role, action, entity_type, entity_id, details)
         VALUES (?1, 'system', 'update_status', 'candidate', ?2, ?3)",
        params![updated_by, candidate_id, format!("Status changed to {}", new_status)],
    )?;
    tx.commit()?;

    let name = text(&row, "name");
    Ok(json!({
        "success": true,
        "candidate_id": candidate_id,
        "name": name,
        "new_status": new_status,
        "message": format!("{} status updated to '{}'.", name, new_status),
    }))
}

fn shortlist_candidate(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let shortlisted_by = str_or(input, "shortlisted_by", "recruiter");
    let Some(row) = candidate_with_job(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };
    let name = text(&row, "name");

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE candidates SET shortlisted = 1, status = 'shortlisted', updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1",
        params![candidate_id],
    )?;
    tx.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, 'status_update', ?2, 'You have been shortlisted for the next stage.', ?3)",
        params![candidate_id, format!("Application Update - {}", text(&row, "job_title")), shortlisted_by],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "candidate_id": candidate_id,
        "name": name,
        "message": format!("{} shortlisted. Notification logged.", name),
    }))
}

fn reject_candidate(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let reason = str_or(input, "reason", "");
    let rejected_by = str_or(input, "rejected_by", "recruiter");
    let Some(row) = candidate_with_job(conn, candidate_id)? else {
        return Ok(not_found(candidate_id));
    };
    let name = text(&row, "name");

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE candidates SET status = 'rejected', updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![candidate_id],
    )?;
    tx.execute(
        "INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by)
         VALUES (?1, 'rejection', ?2, ?3, ?4)",
        params![
            candidate_id,
            format!("Application Update - {}", text(&row, "job_title")),
            format!("Rejection sent. Reason: {}", reason),
            rejected_by,
        ],
    )?;
    tx.commit()?;

    Ok(json!({
        "success": true,
        "candidate_id": candidate_id,
        "name": name,
        "message": format!("{} rejected. Rejection message logged.", name),
    }))
}

fn get_top_candidates(conn: &Connection, input: &Value) -> Result<Value> {
    let job_id = req_i64(input, "job_id")?;
    let top_n = i64_or(input, "top_n", 5)?.clamp(1, 100);
    let rows = query_rows(
        conn,
        "SELECT id, name, email, score, status, experience_years, current_role,
                skills, education, shortlisted
         FROM candidates WHERE job_id = ?1 AND status != 'rejected'
         ORDER BY score DESC, id ASC LIMIT ?2",
        params![job_id, top_n],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No active candidates for job #{}.", job_id)}]));
    }
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, mut r)| {
            r["rank"] = json!(i + 1);
            r
        })
        .collect())
}

fn add_screening_note(conn: &Connection, input: &Value) -> Result<Value> {
    let candidate_id = req_i64(input, "candidate_id")?;
    let note = req_str(input, "note")?;
    let created_by = str_or(input, "created_by", "recruiter");

    let name: Option<String> = conn
        .query_row("SELECT name FROM candidates WHERE id = ?1", params![candidate_id], |r| r.get(0))
        .optional()?;
    let Some(name) = name else {
        return Ok(not_found(candidate_id));
    };
    conn.execute(
        "INSERT INTO screening_notes (candidate_id, note, created_by) VALUES (?1, ?2, ?3)",
        params![candidate_id, note, created_by],
    )?;
    Ok(json!({
        "success": true,
        "note_id": conn.last_insert_rowid(),
        "candidate_id": candidate_id,
        "name": name,
        "message": "Note added successfully.",
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
    fn test_resume_score_components() {
        let score = ResumeScore::compute(
            "Python, FastAPI, PostgreSQL, Redis, Docker, Kubernetes",
            "Python, FastAPI, PostgreSQL, Docker, Kubernetes",
            4,
            5,
            "B.Tech CSE IIT Bombay",
        );
        assert_eq!(score.matched_skills, 5);
        assert_eq!(score.experience_score, 30.0);
        assert_eq!(score.education_score, 20.0);
        assert_eq!(score.total(), 91.67);

        // Substring match works both ways: "aws basics" covers "aws"
        let partial = ResumeScore::compute("AWS, Terraform", "AWS basics", 0, 0, "B.Tech ECE");
        assert_eq!(partial.matched_skills, 1);
        assert_eq!(partial.experience_score, 0.0);
        assert_eq!(partial.education_score, 15.0);

        let plain = ResumeScore::compute("Go", "Rust", 2, 1, "Diploma");
        assert_eq!(plain.total(), 25.0);
    }

    #[test]
    fn test_score_resume_persists() {
        let conn = seeded(AppKind::Hr);
        let scored = run(&conn, "score_resume", json!({"candidate_id": 1}));
        assert_eq!(scored["final_score"], 91.67);
        assert_eq!(scored["skill_score"], 41.7);

        let stored: f64 = conn
            .query_row("SELECT score FROM candidates WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 91.67);
    }

    #[test]
    fn test_submit_rejects_duplicates() {
        let conn = seeded(AppKind::Hr);
        let first = run(
            &conn,
            "submit_candidate",
            json!({"name": "Lena Roy", "email": "lena@email.com", "job_id": 3, "skills": "Python, SQL"}),
        );
        assert_eq!(first["success"], true);
        assert_eq!(first["job_title"], "Data Scientist");

        let again = run(&conn, "submit_candidate", json!({"name": "Lena Roy", "email": "LENA@email.com", "job_id": 3}));
        assert_eq!(again["success"], false);

        let no_job = run(&conn, "submit_candidate", json!({"name": "X", "email": "x@email.com", "job_id": 42}));
        assert_eq!(no_job["message"], "Job #42 not found.");
    }

    #[test]
    fn test_status_changes_and_notes() {
        let conn = seeded(AppKind::Hr);
        let bad = run(&conn, "update_candidate_status", json!({"candidate_id": 3, "new_status": "ghosted"}));
        assert_eq!(bad["success"], false);

        let moved = run(&conn, "update_candidate_status", json!({"candidate_id": 3, "new_status": "Interview"}));
        assert_eq!(moved["message"], "Rohit Jain status updated to 'interview'.");
        let audits: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_log WHERE entity_id = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(audits, 1);

        run(&conn, "reject_candidate", json!({"candidate_id": 4, "reason": "Experience gap"}));
        let top = run(&conn, "get_top_candidates", json!({"job_id": 1}));
        let top = top.as_array().unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0]["name"], "Arjun Mehta");
        assert_eq!(top[0]["rank"], 1);

        run(&conn, "add_screening_note", json!({"candidate_id": 1, "note": "Great system design depth"}));
        let profile = run(&conn, "get_candidate_profile", json!({"candidate_id": 1}));
        assert_eq!(profile["job_title"], "Senior Backend Engineer");
        assert_eq!(profile["screening_notes"][0]["note"], "Great system design depth");
    }

    #[test]
    fn test_list_for_job() {
        let conn = seeded(AppKind::Hr);
        let all = run(&conn, "list_candidates_for_job", json!({"job_id": 2}));
        assert_eq!(all.as_array().unwrap().len(), 3);
        assert_eq!(all[0]["name"], "Riya Desai");

        let screening = run(&conn, "list_candidates_for_job", json!({"job_id": 2, "status": "screening"}));
        assert_eq!(screening.as_array().unwrap().len(), 1);
    }
}
