//! Bed management
//!
//! Beds move available -> occupied -> cleaning -> available. Every move is
//! written to `ward_events` in the same transaction as the bed update.

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{int, query_one, query_rows, text};
use bizdesk_store::time::now_ts;

use super::{PATIENT_EMAIL, error};
use crate::tools::params::{i64_or, opt_str, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const WARD_NAME: Param = Param::req("ward_name", Kind::String, "Ward, e.g. ICU or General Ward");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_bed_availability",
        description: "Bed counts by status, overall and per ward.",
        params: &[],
        handler: Handler::Sql(get_bed_availability),
    },
    ToolSpec {
        name: "get_ward_beds",
        description: "Every bed of a ward with status and patient.",
        params: &[WARD_NAME],
        handler: Handler::Sql(get_ward_beds),
    },
    ToolSpec {
        name: "assign_bed",
        description: "Admit a patient to the first available bed in a ward.",
        params: &[PATIENT_EMAIL, WARD_NAME],
        handler: Handler::Sql(assign_bed),
    },
    ToolSpec {
        name: "discharge_patient",
        description: "Discharge a patient. Their bed goes to cleaning.",
        params: &[PATIENT_EMAIL, Param::opt("notes", Kind::String, "Discharge notes")],
        handler: Handler::Sql(discharge_patient),
    },
    ToolSpec {
        name: "mark_bed_cleaned",
        description: "Return a bed in cleaning to service.",
        params: &[Param::req("bed_number", Kind::String, "Bed number, e.g. GW-01")],
        handler: Handler::Sql(mark_bed_cleaned),
    },
    ToolSpec {
        name: "transfer_patient",
        description: "Move an admitted patient to the first available bed in another ward.",
        params: &[PATIENT_EMAIL, Param::req("to_ward", Kind::String, "Destination ward")],
        handler: Handler::Sql(transfer_patient),
    },
    ToolSpec {
        name: "get_ward_events",
        description: "Recent admissions, discharges, transfers and cleanings.",
        params: &[Param::opt("limit", Kind::Integer, "Number of events (default 20)")],
        handler: Handler::Sql(get_ward_events),
    },
];

/// First available bed in a ward, matched case-insensitively
fn free_bed(conn: &Connection, ward: &str) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT id, ward_name, bed_number FROM beds
         WHERE lower(ward_name) = lower(?1) AND status = 'available'
         ORDER BY bed_number LIMIT 1",
        params![ward],
    )
}

fn ward_exists(conn: &Connection, ward: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM beds WHERE lower(ward_name) = lower(?1)",
        params![ward],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn current_bed(conn: &Connection, email: &str) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT id, ward_name, bed_number FROM beds WHERE patient_email = ?1 AND status = 'occupied'",
        params![email],
    )
}

fn log_event(conn: &Connection, bed_id: i64, kind: &str, email: Option<&str>, notes: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO ward_events (bed_id, event_type, patient_email, performed_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![bed_id, kind, email, now_ts(), notes],
    )?;
    Ok(())
}

fn get_bed_availability(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT ward_name, status, COUNT(*) AS beds FROM beds
         GROUP BY ward_name, status ORDER BY ward_name, status",
        [],
    )?;
    let mut by_ward: Map<String, Value> = Map::new();
    let mut totals = json!({"total": 0, "available": 0, "occupied": 0, "cleaning": 0});
    for row in &rows {
        let (ward, status, beds) = (text(row, "ward_name"), text(row, "status"), int(row, "beds"));
        let entry = by_ward
            .entry(ward.to_string())
            .or_insert_with(|| json!({"total": 0, "available": 0, "occupied": 0, "cleaning": 0}));
        for counts in [entry, &mut totals] {
            counts["total"] = json!(int(counts, "total") + beds);
            counts[status] = json!(int(counts, status) + beds);
        }
    }
    Ok(json!({"totals": totals, "by_ward": by_ward}))
}

fn get_ward_beds(conn: &Connection, input: &Value) -> Result<Value> {
    let ward = req_str(input, "ward_name")?;
    let rows = query_rows(
        conn,
        "SELECT bed_number, status, patient_email, substr(assigned_at, 1, 16) AS assigned_at
         FROM beds WHERE lower(ward_name) = lower(?1) ORDER BY bed_number",
        params![ward],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("Ward '{}' not found.", ward)}]));
    }
    Ok(Value::Array(rows))
}

fn assign_bed(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let ward = req_str(input, "ward_name")?;

    if let Some(bed) = current_bed(conn, &email)? {
        return Ok(error(format!(
            "{} is already admitted to {} ({}). Use transfer instead.",
            email,
            text(&bed, "bed_number"),
            text(&bed, "ward_name")
        )));
    }
    if !ward_exists(conn, ward)? {
        return Ok(error(format!("Ward '{}' not found.", ward)));
    }
    let Some(bed) = free_bed(conn, ward)? else {
        return Ok(error(format!("No available beds in {}.", ward)));
    };
    let (bed_id, bed_number) = (int(&bed, "id"), text(&bed, "bed_number"));

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE beds SET status = 'occupied', patient_email = ?1, assigned_at = ?2 WHERE id = ?3",
        params![email, now_ts(), bed_id],
    )?;
    log_event(&tx, bed_id, "admit", Some(email.as_str()), &format!("Admitted to {}", bed_number))?;
    tx.commit()?;

    Ok(json!({
        "status": "admitted",
        "bed_number": bed_number,
        "ward": text(&bed, "ward_name"),
        "message": format!("{} admitted to bed {} in {}.", email, bed_number, text(&bed, "ward_name")),
    }))
}

fn discharge_patient(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let notes = opt_str(input, "notes");
    let Some(bed) = current_bed(conn, &email)? else {
        return Ok(error(format!("{} is not currently admitted.", email)));
    };
    let (bed_id, bed_number) = (int(&bed, "id"), text(&bed, "bed_number"));

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE beds SET status = 'cleaning', patient_email = NULL, assigned_at = NULL WHERE id = ?1",
        params![bed_id],
    )?;
    let summary = match notes {
        Some(n) => format!("Discharged from {}. {}", bed_number, n),
        None => format!("Discharged from {}.", bed_number),
    };
    log_event(&tx, bed_id, "discharge", Some(email.as_str()), &summary)?;
    tx.commit()?;

    Ok(json!({
        "status": "discharged",
        "message": format!("{} discharged. Bed {} queued for cleaning.", email, bed_number),
    }))
}

fn mark_bed_cleaned(conn: &Connection, input: &Value) -> Result<Value> {
    let number = req_str(input, "bed_number")?.to_uppercase();
    let Some(bed) = query_one(
        conn,
        "SELECT id, status FROM beds WHERE bed_number = ?1",
        params![number],
    )?
    else {
        return Ok(error(format!("Bed {} not found.", number)));
    };
    if text(&bed, "status") != "cleaning" {
        return Ok(error(format!(
            "Bed {} is {}, not awaiting cleaning.",
            number,
            text(&bed, "status")
        )));
    }
    let bed_id = int(&bed, "id");

    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE beds SET status = 'available' WHERE id = ?1", params![bed_id])?;
    log_event(&tx, bed_id, "cleaned", None, &format!("{} cleaned and available", number))?;
    tx.commit()?;

    Ok(json!({"status": "available", "message": format!("Bed {} is ready for the next patient.", number)}))
}

fn transfer_patient(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let ward = req_str(input, "to_ward")?;

    let Some(from) = current_bed(conn, &email)? else {
        return Ok(error(format!("{} is not currently admitted.", email)));
    };
    if text(&from, "ward_name").eq_ignore_ascii_case(ward) {
        return Ok(error(format!("{} is already in {}.", email, text(&from, "ward_name"))));
    }
    if !ward_exists(conn, ward)? {
        return Ok(error(format!("Ward '{}' not found.", ward)));
    }
    let Some(to) = free_bed(conn, ward)? else {
        return Ok(error(format!("No available beds in {}.", ward)));
    };
    let (from_id, to_id) = (int(&from, "id"), int(&to, "id"));
    let note = format!(
        "Transferred {} -> {}",
        text(&from, "bed_number"),
        text(&to, "bed_number")
    );

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE beds SET status = 'cleaning', patient_email = NULL, assigned_at = NULL WHERE id = ?1",
        params![from_id],
    )?;
    tx.execute(
        "UPDATE beds SET status = 'occupied', patient_email = ?1, assigned_at = ?2 WHERE id = ?3",
        params![email, now_ts(), to_id],
    )?;
    log_event(&tx, to_id, "transfer", Some(email.as_str()), &note)?;
    tx.commit()?;

    Ok(json!({
        "status": "transferred",
        "from_bed": text(&from, "bed_number"),
        "to_bed": text(&to, "bed_number"),
        "message": format!("{}. {} queued for cleaning.", note, text(&from, "bed_number")),
    }))
}

fn get_ward_events(conn: &Connection, input: &Value) -> Result<Value> {
    let limit = i64_or(input, "limit", 20)?.clamp(1, 200);
    let rows = query_rows(
        conn,
        "SELECT e.id, b.bed_number, b.ward_name, e.event_type, e.patient_email,
                substr(e.performed_at, 1, 16) AS performed_at, e.notes
         FROM ward_events e JOIN beds b ON b.id = e.bed_id
         ORDER BY e.performed_at DESC, e.id DESC LIMIT ?1",
        params![limit],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No ward events recorded."}]));
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
    fn test_availability_counts() {
        let conn = seeded(AppKind::Hospital);
        let avail = run(&conn, "get_bed_availability", json!({}));
        assert_eq!(avail["totals"]["total"], 27);
        assert_eq!(avail["totals"]["available"], 24);
        assert_eq!(avail["totals"]["occupied"], 2);
        assert_eq!(avail["by_ward"]["General Ward"]["cleaning"], 1);
        assert_eq!(avail["by_ward"]["ICU"]["available"], 5);
    }

    #[test]
    fn test_admit_discharge_clean() {
        let conn = seeded(AppKind::Hospital);
        let twice = run(
            &conn,
            "assign_bed",
            json!({"patient_email": "liam.brown@mail.com", "ward_name": "ICU"}),
        );
        assert!(twice["message"].as_str().unwrap().contains("already admitted"));

        let nowhere = run(
            &conn,
            "assign_bed",
            json!({"patient_email": "emma.wilson@mail.com", "ward_name": "Maternity"}),
        );
        assert_eq!(nowhere["message"], "Ward 'Maternity' not found.");

        // GW-01 is still being cleaned
        let admitted = run(
            &conn,
            "assign_bed",
            json!({"patient_email": "emma.wilson@mail.com", "ward_name": "general ward"}),
        );
        assert_eq!(admitted["bed_number"], "GW-02");

        let discharged = run(&conn, "discharge_patient", json!({"patient_email": "emma.wilson@mail.com"}));
        assert_eq!(discharged["status"], "discharged");
        let not_in = run(&conn, "discharge_patient", json!({"patient_email": "emma.wilson@mail.com"}));
        assert_eq!(not_in["status"], "error");

        let occupied = run(&conn, "mark_bed_cleaned", json!({"bed_number": "CW-01"}));
        assert_eq!(occupied["status"], "error");
        let cleaned = run(&conn, "mark_bed_cleaned", json!({"bed_number": "gw-02"}));
        assert_eq!(cleaned["status"], "available");

        let events = run(&conn, "get_ward_events", json!({"limit": 3}));
        assert_eq!(events.as_array().unwrap().len(), 3);
        assert_eq!(events[0]["event_type"], "cleaned");
    }

    #[test]
    fn test_transfer() {
        let conn = seeded(AppKind::Hospital);
        let same = run(
            &conn,
            "transfer_patient",
            json!({"patient_email": "liam.brown@mail.com", "to_ward": "cardiology"}),
        );
        assert_eq!(same["status"], "error");

        let moved = run(
            &conn,
            "transfer_patient",
            json!({"patient_email": "liam.brown@mail.com", "to_ward": "ICU"}),
        );
        assert_eq!(moved["from_bed"], "CW-01");
        assert_eq!(moved["to_bed"], "ICU-01");

        let cw = run(&conn, "get_ward_beds", json!({"ward_name": "Cardiology"}));
        assert_eq!(cw[0]["status"], "cleaning");
    }
}
