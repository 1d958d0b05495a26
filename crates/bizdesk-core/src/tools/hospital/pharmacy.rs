//! Prescriptions, interaction checks and dispensing

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};

use bizdesk_store::rows::{query_one, query_rows, text};

use super::{DOCTOR_ID, PATIENT_EMAIL, doctor_name, error};
use crate::tools::params::{
    i64_or, opt_f64, opt_str, req_f64, req_i64, req_str, str_list, str_or,
};
use crate::tools::{Handler, Kind, Param, ToolSpec};

/// Known dangerous pairs, matched case-insensitively on medication names
struct Interaction {
    a: &'static str,
    b: &'static str,
    severity: &'static str,
    effect: &'static str,
}

const INTERACTIONS: &[Interaction] = &[
    Interaction {
        a: "warfarin",
        b: "aspirin",
        severity: "HIGH",
        effect: "Increased bleeding risk",
    },
    Interaction {
        a: "metformin",
        b: "alcohol",
        severity: "MODERATE",
        effect: "Risk of lactic acidosis",
    },
    Interaction {
        a: "ssri",
        b: "maoi",
        severity: "HIGH",
        effect: "Serotonin syndrome",
    },
    Interaction {
        a: "simvastatin",
        b: "amiodarone",
        severity: "HIGH",
        effect: "Myopathy and rhabdomyolysis",
    },
];

const PRESCRIPTION_ID: Param = Param::req("prescription_id", Kind::Integer, "Prescription id");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "create_prescription",
        description: "Prescribe a medication. Warns about interactions with the patient's active prescriptions.",
        params: &[
            PATIENT_EMAIL,
            DOCTOR_ID,
            Param::req("medication", Kind::String, "Medication name"),
            Param::req("dosage", Kind::String, "e.g. 500mg"),
            Param::req("frequency", Kind::String, "e.g. twice daily"),
            Param::opt("duration_days", Kind::Integer, "Course length in days (default 7)"),
            Param::opt("notes", Kind::String, "Instructions"),
        ],
        handler: Handler::Sql(create_prescription),
    },
    ToolSpec {
        name: "get_patient_prescriptions",
        description: "Prescriptions of a patient, optionally filtered by status (active, dispensed, cancelled).",
        params: &[PATIENT_EMAIL, Param::opt("status", Kind::String, "Status filter")],
        handler: Handler::Sql(get_patient_prescriptions),
    },
    ToolSpec {
        name: "check_drug_interactions",
        description: "Check a list of medications for known dangerous interactions.",
        params: &[Param::req("medications", Kind::Array, "Medication names")],
        handler: Handler::Pure(check_drug_interactions),
    },
    ToolSpec {
        name: "check_dosage_safety",
        description: "Flag a dose in mg that is unsafe for the patient's age or weight.",
        params: &[
            Param::req("medication", Kind::String, "Medication name"),
            Param::req("dose_mg", Kind::Number, "Single dose in mg"),
            Param::req("age", Kind::Integer, "Patient age"),
            Param::opt("weight_kg", Kind::Number, "Patient weight in kg"),
        ],
        handler: Handler::Pure(check_dosage_safety),
    },
    ToolSpec {
        name: "dispense_medication",
        description: "Mark an active prescription as dispensed.",
        params: &[PRESCRIPTION_ID],
        handler: Handler::Sql(dispense_medication),
    },
    ToolSpec {
        name: "cancel_prescription",
        description: "Cancel a prescription that has not been dispensed.",
        params: &[PRESCRIPTION_ID, Param::opt("reason", Kind::String, "Why it is cancelled")],
        handler: Handler::Sql(cancel_prescription),
    },
];

/// Every known interaction between any two of `medications`
fn interactions_among(medications: &[String]) -> Vec<Value> {
    let lower: Vec<String> = medications.iter().map(|m| m.to_lowercase()).collect();
    let has = |needle: &str| lower.iter().any(|m| m.contains(needle));
    INTERACTIONS
        .iter()
        .filter(|i| has(i.a) && has(i.b))
        .map(|i| {
            json!({
                "drugs": [i.a, i.b],
                "severity": i.severity,
                "effect": i.effect,
            })
        })
        .collect()
}

fn active_medications(conn: &Connection, email: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT medication FROM prescriptions WHERE patient_email = ?1 AND status = 'active'",
    )?;
    let meds = stmt
        .query_map(params![email], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(meds)
}

fn create_prescription(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let doctor_id = req_i64(input, "doctor_id")?;
    let medication = req_str(input, "medication")?;
    let dosage = req_str(input, "dosage")?;
    let frequency = req_str(input, "frequency")?;
    let days = i64_or(input, "duration_days", 7)?;
    let notes = opt_str(input, "notes");

    let Some(doctor) = doctor_name(conn, doctor_id)? else {
        return Ok(error(format!("Doctor #{} not found.", doctor_id)));
    };
    if days <= 0 {
        return Ok(error("duration_days must be positive."));
    }

    let mut regimen = active_medications(conn, &email)?;
    regimen.push(medication.to_string());
    let warnings = interactions_among(&regimen);

    conn.execute(
        "INSERT INTO prescriptions (patient_email, doctor_id, medication, dosage, frequency,
                                    duration_days, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![email, doctor_id, medication, dosage, frequency, days, notes],
    )?;
    let id = conn.last_insert_rowid();
    let mut out = json!({
        "status": "created",
        "prescription_id": id,
        "message": format!(
            "Prescription #{}: {} {} {} for {} days, by {}.",
            id, medication, dosage, frequency, days, doctor
        ),
    });
    if !warnings.is_empty() {
        out["interaction_warnings"] = Value::Array(warnings);
    }
    Ok(out)
}

fn get_patient_prescriptions(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let status = str_or(input, "status", "%").to_lowercase();
    let rows = query_rows(
        conn,
        "SELECT p.id, p.medication, p.dosage, p.frequency, p.duration_days, p.status,
                p.notes, d.name AS doctor, substr(p.created_at, 1, 10) AS prescribed_on
         FROM prescriptions p LEFT JOIN doctors d ON d.id = p.doctor_id
         WHERE p.patient_email = ?1 AND p.status LIKE ?2
         ORDER BY p.created_at DESC, p.id DESC",
        params![email, status],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No prescriptions found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn check_drug_interactions(input: &Value) -> Result<Value> {
    let meds = str_list(input, "medications");
    if meds.len() < 2 {
        return Ok(error("Provide at least two medications to compare."));
    }
    let found = interactions_among(&meds);
    Ok(json!({
        "safe": found.is_empty(),
        "interactions": found,
        "checked": meds,
    }))
}

fn check_dosage_safety(input: &Value) -> Result<Value> {
    let medication = req_str(input, "medication")?;
    let dose = req_f64(input, "dose_mg")?;
    let age = req_i64(input, "age")?;
    let weight = opt_f64(input, "weight_kg")?;

    let mut warnings = Vec::new();
    if age > 65 && dose > 500.0 {
        warnings.push("Elderly patient: doses above 500mg need review.");
    }
    if age < 12 && dose > 200.0 {
        warnings.push("Paediatric patient: doses above 200mg need review.");
    }
    if weight.is_some_and(|w| w < 50.0) && dose > 400.0 {
        warnings.push("Low body weight: doses above 400mg need review.");
    }
    Ok(json!({
        "medication": medication,
        "dose_mg": dose,
        "safe": warnings.is_empty(),
        "warnings": warnings,
    }))
}

fn dispense_medication(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "prescription_id")?;
    let Some(row) = query_one(
        conn,
        "SELECT medication, patient_email, status FROM prescriptions WHERE id = ?1",
        params![id],
    )?
    else {
        return Ok(error(format!("Prescription #{} not found.", id)));
    };
    if text(&row, "status") != "active" {
        return Ok(error(format!(
            "Prescription #{} is {} and cannot be dispensed.",
            id,
            text(&row, "status")
        )));
    }
    conn.execute(
        "UPDATE prescriptions SET status = 'dispensed' WHERE id = ?1",
        params![id],
    )?;
    Ok(json!({
        "status": "dispensed",
        "message": format!(
            "{} dispensed to {}.",
            text(&row, "medication"),
            text(&row, "patient_email")
        ),
    }))
}

fn cancel_prescription(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "prescription_id")?;
    let reason = opt_str(input, "reason");
    let Some(row) = query_one(
        conn,
        "SELECT medication, status FROM prescriptions WHERE id = ?1",
        params![id],
    )?
    else {
        return Ok(error(format!("Prescription #{} not found.", id)));
    };
    match text(&row, "status") {
        "dispensed" => return Ok(error(format!("Prescription #{} was already dispensed.", id))),
        "cancelled" => return Ok(error(format!("Prescription #{} is already cancelled.", id))),
        _ => {}
    }
    conn.execute(
        "UPDATE prescriptions SET status = 'cancelled', notes = COALESCE(?1, notes) WHERE id = ?2",
        params![reason, id],
    )?;
    Ok(json!({
        "status": "cancelled",
        "message": format!("Prescription #{} ({}) cancelled.", id, text(&row, "medication")),
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
    fn test_interaction_table() {
        let found = check_drug_interactions(&json!({"medications": ["Warfarin 5mg", "ASPIRIN"]})).unwrap();
        assert_eq!(found["safe"], false);
        assert_eq!(found["interactions"][0]["severity"], "HIGH");

        let clear = check_drug_interactions(&json!({"medications": ["paracetamol", "aspirin"]})).unwrap();
        assert_eq!(clear["safe"], true);

        let single = check_drug_interactions(&json!({"medications": ["aspirin"]})).unwrap();
        assert_eq!(single["status"], "error");
    }

    #[test]
    fn test_dosage_rules() {
        let elderly = check_dosage_safety(&json!({"medication": "x", "dose_mg": 600, "age": 70})).unwrap();
        assert_eq!(elderly["safe"], false);

        let child = check_dosage_safety(&json!({"medication": "x", "dose_mg": 250, "age": 8})).unwrap();
        assert_eq!(child["warnings"].as_array().unwrap().len(), 1);

        let light = check_dosage_safety(&json!({"medication": "x", "dose_mg": 450, "age": 30, "weight_kg": 45})).unwrap();
        assert_eq!(light["safe"], false);

        let fine = check_dosage_safety(&json!({"medication": "x", "dose_mg": 450, "age": 30, "weight_kg": 70})).unwrap();
        assert_eq!(fine["safe"], true);
    }

    #[test]
    fn test_prescribing_against_active_regimen() {
        let conn = seeded(AppKind::Hospital);
        let risky = run(
            &conn,
            "create_prescription",
            json!({"patient_email": "liam.brown@mail.com", "doctor_id": 1, "medication": "Aspirin",
                   "dosage": "75mg", "frequency": "once daily"}),
        );
        assert_eq!(risky["status"], "created");
        assert_eq!(risky["interaction_warnings"][0]["effect"], "Increased bleeding risk");

        let plain = run(
            &conn,
            "create_prescription",
            json!({"patient_email": "emma.wilson@mail.com", "doctor_id": 2, "medication": "Aspirin",
                   "dosage": "75mg", "frequency": "once daily", "duration_days": 5}),
        );
        assert!(plain.get("interaction_warnings").is_none());

        let active = run(
            &conn,
            "get_patient_prescriptions",
            json!({"patient_email": "liam.brown@mail.com", "status": "active"}),
        );
        assert_eq!(active.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_dispense_and_cancel() {
        let conn = seeded(AppKind::Hospital);
        let again = run(&conn, "dispense_medication", json!({"prescription_id": 3}));
        assert_eq!(again["status"], "error");

        let ok = run(&conn, "dispense_medication", json!({"prescription_id": 4}));
        assert_eq!(ok["message"], "Sumatriptan dispensed to noah.garcia@mail.com.");

        let late = run(&conn, "cancel_prescription", json!({"prescription_id": 4}));
        assert_eq!(late["message"], "Prescription #4 was already dispensed.");

        let cancelled = run(
            &conn,
            "cancel_prescription",
            json!({"prescription_id": 2, "reason": "Switched statin"}),
        );
        assert_eq!(cancelled["status"], "cancelled");
        let blocked = run(&conn, "dispense_medication", json!({"prescription_id": 2}));
        assert_eq!(blocked["status"], "error");
    }
}
