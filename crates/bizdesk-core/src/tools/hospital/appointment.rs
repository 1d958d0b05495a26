//! Patient registration and appointment booking
//!
//! A doctor and a patient each hold at most one scheduled appointment per
//! date and time. The tools check both before writing; the partial unique
//! indexes on `appointments` back that up.

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};
use tracing::info;

use bizdesk_store::rows::{int, query_one, query_rows, text};
use bizdesk_store::time::{DATE_FORMAT, format_date, today};

use super::{DOCTOR_ID, PATIENT_EMAIL, doctor_name, error};
use crate::tools::params::{opt_i64, opt_str, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

/// Bookable start times, half-hourly from 09:00 to 16:30
const CLINIC_OPEN: u32 = 9;
const CLINIC_CLOSE: u32 = 17;

const APPOINTMENT_ID: Param = Param::req("appointment_id", Kind::Integer, "Appointment id");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "validate_patient_info",
        description: "Check a patient's name, email and age before registration.",
        params: &[
            Param::req("name", Kind::String, "Full name"),
            Param::req("email", Kind::String, "Email address"),
            Param::req("age", Kind::Integer, "Age in years"),
        ],
        handler: Handler::Pure(validate_patient_info),
    },
    ToolSpec {
        name: "register_patient",
        description: "Register a new patient. Returns already_exists for a known email.",
        params: &[
            Param::req("name", Kind::String, "Full name"),
            Param::req("email", Kind::String, "Email address"),
            Param::req("age", Kind::Integer, "Age in years (1-120)"),
        ],
        handler: Handler::Sql(register_patient),
    },
    ToolSpec {
        name: "get_doctors",
        description: "List doctors, optionally filtered by specialization.",
        params: &[Param::opt("specialization", Kind::String, "e.g. Cardiologist")],
        handler: Handler::Sql(get_doctors),
    },
    ToolSpec {
        name: "check_doctor_availability",
        description: "Booked and free half-hour slots of a doctor on a date (YYYY-MM-DD).",
        params: &[DOCTOR_ID, Param::req("date", Kind::String, "Date (YYYY-MM-DD)")],
        handler: Handler::Sql(check_doctor_availability),
    },
    ToolSpec {
        name: "book_appointment",
        description: "Book an appointment for a registered patient. Time is HH:MM on the half hour.",
        params: &[
            PATIENT_EMAIL,
            DOCTOR_ID,
            Param::req("date", Kind::String, "Date (YYYY-MM-DD)"),
            Param::req("time", Kind::String, "Time (HH:MM)"),
            Param::opt("reason", Kind::String, "Reason for the visit"),
        ],
        handler: Handler::Sql(book_appointment),
    },
    ToolSpec {
        name: "cancel_appointment",
        description: "Cancel one of the patient's own appointments.",
        params: &[APPOINTMENT_ID, PATIENT_EMAIL],
        handler: Handler::Sql(cancel_appointment),
    },
    ToolSpec {
        name: "edit_appointment",
        description: "Move one of the patient's scheduled appointments to a new date and time.",
        params: &[
            APPOINTMENT_ID,
            PATIENT_EMAIL,
            Param::req("new_date", Kind::String, "New date (YYYY-MM-DD)"),
            Param::req("new_time", Kind::String, "New time (HH:MM)"),
        ],
        handler: Handler::Sql(edit_appointment),
    },
    ToolSpec {
        name: "get_patient_appointments",
        description: "All appointments of a patient with doctor and status.",
        params: &[PATIENT_EMAIL],
        handler: Handler::Sql(get_patient_appointments),
    },
];

fn patient_errors(name: &str, email: &str, age: Option<i64>) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if name.chars().count() < 2 {
        errors.push("Name must be at least 2 characters.");
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push("Email address is not valid.");
    }
    match age {
        Some(a) if (1..=120).contains(&a) => {}
        _ => errors.push("Age must be between 1 and 120."),
    }
    errors
}

fn validate_patient_info(input: &Value) -> Result<Value> {
    let name = str_or(input, "name", "");
    let email = str_or(input, "email", "");
    let age = opt_i64(input, "age").ok().flatten();
    let errors = patient_errors(name, email, age);
    Ok(json!({"valid": errors.is_empty(), "errors": errors}))
}

fn register_patient(conn: &Connection, input: &Value) -> Result<Value> {
    let name = req_str(input, "name")?;
    let email = req_str(input, "email")?.to_lowercase();
    let age = req_i64(input, "age")?;

    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, name FROM patients WHERE email = ?1",
            params![email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((id, existing_name)) = existing {
        return Ok(json!({
            "status": "already_exists",
            "patient_id": id,
            "message": format!("Patient '{}' is already registered with {}.", existing_name, email),
        }));
    }
    let errors = patient_errors(name, &email, Some(age));
    if !errors.is_empty() {
        return Ok(error(errors.join(" ")));
    }

    conn.execute(
        "INSERT INTO patients (name, email, age) VALUES (?1, ?2, ?3)",
        params![name, email, age],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "registered",
        "patient_id": id,
        "message": format!("Patient '{}' registered. ID: {}", name, id),
    }))
}

fn get_doctors(conn: &Connection, input: &Value) -> Result<Value> {
    let rows = match opt_str(input, "specialization") {
        Some(spec) => query_rows(
            conn,
            "SELECT id, name, specialization, email FROM doctors
             WHERE specialization LIKE ?1 ORDER BY id",
            params![format!("%{}%", spec)],
        )?,
        None => query_rows(
            conn,
            "SELECT id, name, specialization, email FROM doctors ORDER BY id",
            [],
        )?,
    };
    if rows.is_empty() {
        return Ok(json!([{"message": "No doctors match that specialization."}]));
    }
    Ok(Value::Array(rows))
}

fn clinic_slots() -> Vec<String> {
    (CLINIC_OPEN..CLINIC_CLOSE)
        .flat_map(|h| [format!("{:02}:00", h), format!("{:02}:30", h)])
        .collect()
}

/// Strict `HH:MM` on a clinic slot
fn slot(time: &str) -> Option<String> {
    let parsed = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    let formatted = parsed.format("%H:%M").to_string();
    clinic_slots().contains(&formatted).then_some(formatted)
}

/// Booking date: `YYYY-MM-DD`, today or later
fn booking_date(date: &str) -> std::result::Result<NaiveDate, String> {
    let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD.", date))?;
    if parsed < today() {
        return Err(format!("{} is in the past.", format_date(parsed)));
    }
    Ok(parsed)
}

fn booked_times(conn: &Connection, doctor_id: i64, date: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT appointment_time FROM appointments
         WHERE doctor_id = ?1 AND appointment_date = ?2 AND status = 'scheduled'
         ORDER BY appointment_time",
    )?;
    let times = stmt
        .query_map(params![doctor_id, date], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(times)
}

fn check_doctor_availability(conn: &Connection, input: &Value) -> Result<Value> {
    let doctor_id = req_i64(input, "doctor_id")?;
    let date = req_str(input, "date")?;
    let Some(doctor) = doctor_name(conn, doctor_id)? else {
        return Ok(error(format!("Doctor #{} not found.", doctor_id)));
    };
    let day = match booking_date(date) {
        Ok(d) => format_date(d),
        Err(msg) => return Ok(error(msg)),
    };

    let booked = booked_times(conn, doctor_id, &day)?;
    let free: Vec<String> = clinic_slots()
        .into_iter()
        .filter(|s| !booked.contains(s))
        .collect();
    Ok(json!({
        "doctor": doctor,
        "date": day,
        "booked_slots": booked,
        "available_slots": free,
    }))
}

/// Scheduled appointment already holding a slot, other than `except`
fn slot_taken(
    conn: &Connection,
    column: &str,
    key: &dyn rusqlite::ToSql,
    date: &str,
    time: &str,
    except: i64,
) -> Result<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM appointments
         WHERE {} = ?1 AND appointment_date = ?2 AND appointment_time = ?3
           AND status = 'scheduled' AND id != ?4",
        column
    );
    let n: i64 = conn.query_row(&sql, params![key, date, time, except], |r| r.get(0))?;
    Ok(n > 0)
}

fn book_appointment(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let doctor_id = req_i64(input, "doctor_id")?;
    let date = req_str(input, "date")?;
    let time = req_str(input, "time")?;
    let reason = str_or(input, "reason", "General consultation");

    let registered: Option<i64> = conn
        .query_row("SELECT id FROM patients WHERE email = ?1", params![email], |r| r.get(0))
        .optional()?;
    if registered.is_none() {
        return Ok(error(format!(
            "Patient '{}' is not registered. Please register first.",
            email
        )));
    }
    let Some(doctor) = doctor_name(conn, doctor_id)? else {
        return Ok(error(format!("Doctor #{} not found.", doctor_id)));
    };
    let day = match booking_date(date) {
        Ok(d) => format_date(d),
        Err(msg) => return Ok(error(msg)),
    };
    let Some(time) = slot(time) else {
        return Ok(error(format!(
            "Invalid time '{}'. Use HH:MM on the half hour between 09:00 and 16:30.",
            time
        )));
    };

    if slot_taken(conn, "doctor_id", &doctor_id, &day, &time, 0)? {
        return Ok(error(format!(
            "{} is already booked on {} at {}. Check availability for a free slot.",
            doctor, day, time
        )));
    }
    if slot_taken(conn, "patient_email", &email, &day, &time, 0)? {
        return Ok(error(format!(
            "You already have an appointment on {} at {}.",
            day, time
        )));
    }

    conn.execute(
        "INSERT INTO appointments (patient_email, doctor_id, appointment_date, appointment_time, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![email, doctor_id, day, time, reason],
    )?;
    let id = conn.last_insert_rowid();
    // confirmation emails are not sent; the booking is logged
    info!("Appointment #{} booked for {} with doctor {}", id, email, doctor_id);
    Ok(json!({
        "status": "booked",
        "appointment_id": id,
        "message": format!("Appointment #{} booked with {} on {} at {}.", id, doctor, day, time),
    }))
}

/// The patient's own appointment row, or an error payload
fn own_appointment(conn: &Connection, id: i64, email: &str) -> Result<std::result::Result<Value, Value>> {
    let row = query_one(
        conn,
        "SELECT id, patient_email, doctor_id, appointment_date, appointment_time, status
         FROM appointments WHERE id = ?1",
        params![id],
    )?;
    Ok(match row {
        None => Err(error(format!("Appointment #{} not found.", id))),
        Some(r) if text(&r, "patient_email") != email => Err(error(format!(
            "Appointment #{} does not belong to {}.",
            id, email
        ))),
        Some(r) => Ok(r),
    })
}

fn cancel_appointment(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "appointment_id")?;
    let email = req_str(input, "patient_email")?.to_lowercase();
    let row = match own_appointment(conn, id, &email)? {
        Ok(r) => r,
        Err(refusal) => return Ok(refusal),
    };
    match text(&row, "status") {
        "cancelled" => return Ok(error(format!("Appointment #{} is already cancelled.", id))),
        "completed" => return Ok(error(format!("Appointment #{} has already taken place.", id))),
        _ => {}
    }

    conn.execute(
        "UPDATE appointments SET status = 'cancelled' WHERE id = ?1",
        params![id],
    )?;
    Ok(json!({
        "status": "cancelled",
        "message": format!(
            "Appointment #{} on {} at {} cancelled.",
            id,
            text(&row, "appointment_date"),
            text(&row, "appointment_time")
        ),
    }))
}

fn edit_appointment(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "appointment_id")?;
    let email = req_str(input, "patient_email")?.to_lowercase();
    let date = req_str(input, "new_date")?;
    let time = req_str(input, "new_time")?;

    let row = match own_appointment(conn, id, &email)? {
        Ok(r) => r,
        Err(refusal) => return Ok(refusal),
    };
    if text(&row, "status") != "scheduled" {
        return Ok(error(format!(
            "Appointment #{} is {} and cannot be changed.",
            id,
            text(&row, "status")
        )));
    }
    let day = match booking_date(date) {
        Ok(d) => format_date(d),
        Err(msg) => return Ok(error(msg)),
    };
    let Some(time) = slot(time) else {
        return Ok(error(format!("Invalid time '{}'. Use HH:MM on the half hour.", time)));
    };
    let doctor_id = int(&row, "doctor_id");

    if slot_taken(conn, "doctor_id", &doctor_id, &day, &time, id)? {
        return Ok(error(format!("The doctor is already booked on {} at {}.", day, time)));
    }
    if slot_taken(conn, "patient_email", &email, &day, &time, id)? {
        return Ok(error(format!("You already have an appointment on {} at {}.", day, time)));
    }

    conn.execute(
        "UPDATE appointments SET appointment_date = ?1, appointment_time = ?2 WHERE id = ?3",
        params![day, time, id],
    )?;
    Ok(json!({
        "status": "rescheduled",
        "message": format!("Appointment #{} moved to {} at {}.", id, day, time),
    }))
}

fn get_patient_appointments(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let rows = query_rows(
        conn,
        "SELECT a.id, d.name AS doctor, d.specialization, a.appointment_date,
                a.appointment_time, a.reason, a.status
         FROM appointments a JOIN doctors d ON d.id = a.doctor_id
         WHERE a.patient_email = ?1
         ORDER BY a.appointment_date DESC, a.appointment_time DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No appointments found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::seeded;
    use bizdesk_store::AppKind;
    use bizdesk_store::time::date_offset;

    fn run(conn: &Connection, name: &str, input: Value) -> Value {
        crate::tools::testing::run(TOOLS, conn, name, input)
    }

    #[test]
    fn test_patient_validation() {
        let bad = validate_patient_info(&json!({"name": "A", "email": "nope", "age": 130})).unwrap();
        assert_eq!(bad["valid"], false);
        assert_eq!(bad["errors"].as_array().unwrap().len(), 3);

        let ok = validate_patient_info(&json!({"name": "Ava", "email": "ava@mail.com", "age": "40"})).unwrap();
        assert_eq!(ok["valid"], true);

        let conn = seeded(AppKind::Hospital);
        let dup = run(
            &conn,
            "register_patient",
            json!({"name": "Emma", "email": "Emma.Wilson@mail.com", "age": 34}),
        );
        assert_eq!(dup["status"], "already_exists");

        let new = run(
            &conn,
            "register_patient",
            json!({"name": "Ava Chen", "email": "ava@mail.com", "age": 40}),
        );
        assert_eq!(new["patient_id"], 6);
    }

    #[test]
    fn test_booking_conflicts() {
        let conn = seeded(AppKind::Hospital);
        let tomorrow = date_offset(1);

        let avail = run(&conn, "check_doctor_availability", json!({"doctor_id": 2, "date": tomorrow}));
        assert_eq!(avail["booked_slots"], json!(["10:00"]));
        assert_eq!(avail["available_slots"].as_array().unwrap().len(), 15);

        let doctor_busy = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "sophia.martin@mail.com", "doctor_id": 2, "date": tomorrow, "time": "10:00"}),
        );
        assert_eq!(doctor_busy["status"], "error");

        let patient_busy = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "emma.wilson@mail.com", "doctor_id": 3, "date": tomorrow, "time": "10:00"}),
        );
        assert!(patient_busy["message"].as_str().unwrap().starts_with("You already have"));

        let past = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "sophia.martin@mail.com", "doctor_id": 3, "date": date_offset(-1), "time": "10:00"}),
        );
        assert_eq!(past["status"], "error");

        let off_slot = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "sophia.martin@mail.com", "doctor_id": 3, "date": tomorrow, "time": "10:15"}),
        );
        assert_eq!(off_slot["status"], "error");

        let unknown = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "ghost@mail.com", "doctor_id": 3, "date": tomorrow, "time": "10:00"}),
        );
        assert!(unknown["message"].as_str().unwrap().contains("not registered"));

        let booked = run(
            &conn,
            "book_appointment",
            json!({"patient_email": "sophia.martin@mail.com", "doctor_id": 3, "date": tomorrow, "time": "10:00"}),
        );
        assert_eq!(booked["status"], "booked");
        assert_eq!(booked["appointment_id"], 6);
    }

    #[test]
    fn test_cancel_and_edit() {
        let conn = seeded(AppKind::Hospital);

        let not_mine = run(
            &conn,
            "cancel_appointment",
            json!({"appointment_id": 1, "patient_email": "liam.brown@mail.com"}),
        );
        assert!(not_mine["message"].as_str().unwrap().contains("does not belong"));

        let already = run(
            &conn,
            "cancel_appointment",
            json!({"appointment_id": 5, "patient_email": "sophia.martin@mail.com"}),
        );
        assert_eq!(already["message"], "Appointment #5 is already cancelled.");

        // moving onto its own slot is not a clash
        let same = run(
            &conn,
            "edit_appointment",
            json!({"appointment_id": 2, "patient_email": "liam.brown@mail.com",
                   "new_date": date_offset(2), "new_time": "09:30"}),
        );
        assert_eq!(same["status"], "rescheduled");

        let moved = run(
            &conn,
            "edit_appointment",
            json!({"appointment_id": 2, "patient_email": "liam.brown@mail.com",
                   "new_date": date_offset(4), "new_time": "11:30"}),
        );
        assert_eq!(moved["status"], "rescheduled");

        let cancelled = run(
            &conn,
            "cancel_appointment",
            json!({"appointment_id": 2, "patient_email": "liam.brown@mail.com"}),
        );
        assert_eq!(cancelled["status"], "cancelled");

        let frozen = run(
            &conn,
            "edit_appointment",
            json!({"appointment_id": 2, "patient_email": "liam.brown@mail.com",
                   "new_date": date_offset(5), "new_time": "11:30"}),
        );
        assert_eq!(frozen["status"], "error");

        let list = run(&conn, "get_patient_appointments", json!({"patient_email": "liam.brown@mail.com"}));
        assert_eq!(list[0]["status"], "cancelled");
        assert_eq!(list[0]["doctor"], "Dr. Aisha Patel");
    }
}
