//! Hospital operations: patients, appointments, pharmacy, inventory, wards, billing and labs

use anyhow::Result;
use rusqlite::{Connection, params};

use crate::time::{date_offset, days_ago};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS patients (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    age        INTEGER NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS doctors (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    specialization TEXT NOT NULL,
    email          TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS appointments (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_email    TEXT NOT NULL,
    doctor_id        INTEGER NOT NULL REFERENCES doctors(id),
    appointment_date TEXT NOT NULL,
    appointment_time TEXT NOT NULL,
    reason           TEXT,
    status           TEXT DEFAULT 'scheduled',
    created_at       TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_appointments_doctor_slot
    ON appointments (doctor_id, appointment_date, appointment_time) WHERE status = 'scheduled';
CREATE UNIQUE INDEX IF NOT EXISTS uq_appointments_patient_slot
    ON appointments (patient_email, appointment_date, appointment_time) WHERE status = 'scheduled';
CREATE TABLE IF NOT EXISTS invoices (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_email     TEXT NOT NULL,
    appointment_id    INTEGER REFERENCES appointments(id),
    items             TEXT DEFAULT '[]',
    subtotal          REAL DEFAULT 0,
    insurance_covered REAL DEFAULT 0,
    total_due         REAL DEFAULT 0,
    status            TEXT DEFAULT 'pending',
    created_at        TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS inventory_items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL UNIQUE,
    category      TEXT NOT NULL,
    quantity      INTEGER DEFAULT 0,
    unit          TEXT DEFAULT 'units',
    reorder_level INTEGER DEFAULT 50,
    expiry_date   TEXT,
    supplier      TEXT,
    cost_per_unit REAL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS reorder_alerts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id             INTEGER REFERENCES inventory_items(id),
    quantity_at_trigger INTEGER,
    status              TEXT DEFAULT 'open',
    triggered_at        TEXT DEFAULT CURRENT_TIMESTAMP,
    resolved_at         TEXT
);
CREATE TABLE IF NOT EXISTS prescriptions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_email TEXT NOT NULL,
    doctor_id     INTEGER REFERENCES doctors(id),
    medication    TEXT NOT NULL,
    dosage        TEXT NOT NULL,
    frequency     TEXT NOT NULL,
    duration_days INTEGER,
    status        TEXT DEFAULT 'active',
    notes         TEXT,
    created_at    TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS lab_tests (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_email TEXT NOT NULL,
    doctor_id     INTEGER REFERENCES doctors(id),
    test_name     TEXT NOT NULL,
    ordered_at    TEXT DEFAULT CURRENT_TIMESTAMP,
    status        TEXT DEFAULT 'pending',
    result        TEXT,
    critical_flag INTEGER DEFAULT 0,
    notified_at   TEXT
);
CREATE TABLE IF NOT EXISTS beds (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    ward_name     TEXT NOT NULL,
    bed_number    TEXT NOT NULL UNIQUE,
    status        TEXT DEFAULT 'available',
    patient_email TEXT,
    assigned_at   TEXT
);
CREATE TABLE IF NOT EXISTS ward_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    bed_id        INTEGER REFERENCES beds(id),
    event_type    TEXT NOT NULL,
    patient_email TEXT,
    performed_at  TEXT DEFAULT CURRENT_TIMESTAMP,
    notes         TEXT
);
";

const DOCTORS: &[(&str, &str, &str)] = &[
    ("Dr. Aisha Patel", "Cardiologist", "aisha.patel@hospital.com"),
    ("Dr. John Smith", "General Physician", "john.smith@hospital.com"),
    ("Dr. Maria Lopez", "Dermatologist", "maria.lopez@hospital.com"),
    ("Dr. Raj Kumar", "Neurologist", "raj.kumar@hospital.com"),
];

const PATIENTS: &[(&str, &str, i64)] = &[
    ("Emma Wilson", "emma.wilson@mail.com", 34),
    ("Liam Brown", "liam.brown@mail.com", 67),
    ("Olivia Davis", "olivia.davis@mail.com", 8),
    ("Noah Garcia", "noah.garcia@mail.com", 52),
    ("Sophia Martin", "sophia.martin@mail.com", 45),
];

// (patient, doctor id, days from today, time, reason, status)
const APPOINTMENTS: &[(&str, i64, i64, &str, &str, &str)] = &[
    ("emma.wilson@mail.com", 2, 1, "10:00", "Annual check-up", "scheduled"),
    ("liam.brown@mail.com", 1, 2, "09:30", "Chest pain follow-up", "scheduled"),
    ("noah.garcia@mail.com", 4, 3, "14:00", "Recurring migraines", "scheduled"),
    ("olivia.davis@mail.com", 3, -5, "11:00", "Skin rash", "completed"),
    ("sophia.martin@mail.com", 2, -2, "16:00", "Fever", "cancelled"),
];

// (patient, appointment index, items, insurance covered, status)
const INVOICES: &[(&str, usize, &str, f64, &str)] = &[
    (
        "olivia.davis@mail.com",
        3,
        r#"[{"name":"Consultation","cost":150},{"name":"Skin biopsy","cost":220}]"#,
        200.0,
        "paid",
    ),
    (
        "liam.brown@mail.com",
        1,
        r#"[{"name":"Consultation","cost":200},{"name":"ECG","cost":100}]"#,
        0.0,
        "pending",
    ),
    (
        "sophia.martin@mail.com",
        4,
        r#"[{"name":"Late cancellation fee","cost":25}]"#,
        0.0,
        "pending",
    ),
];

// (name, category, quantity, unit, reorder level, days to expiry, supplier, cost per unit)
const INVENTORY: &[(&str, &str, i64, &str, i64, Option<i64>, &str, f64)] = &[
    ("Surgical Gloves", "PPE", 200, "boxes", 50, Some(400), "MedSupply Co", 12.50),
    ("Surgical Masks", "PPE", 500, "boxes", 100, Some(500), "MedSupply Co", 8.00),
    ("Paracetamol 500mg", "Medicine", 1000, "tablets", 200, Some(300), "PharmaOne", 0.05),
    ("IV Fluid Saline", "Fluid", 150, "bags", 30, Some(180), "PharmaOne", 4.50),
    ("Syringes 5ml", "Equipment", 800, "units", 100, None, "CareTech", 0.30),
    ("Blood Test Tubes", "Lab", 300, "units", 50, Some(90), "LabWorks", 0.80),
    ("Bandages", "Wound", 400, "rolls", 80, None, "CareTech", 2.00),
    ("Oxygen Cylinders", "Equipment", 4, "units", 5, None, "GasMed", 120.00),
    ("Hand Sanitizer", "PPE", 18, "bottles", 20, Some(25), "MedSupply Co", 5.00),
    ("Disposable Gowns", "PPE", 250, "units", 60, None, "MedSupply Co", 3.50),
];

// (patient, doctor id, medication, dosage, frequency, days, status)
const PRESCRIPTIONS: &[(&str, i64, &str, &str, &str, i64, &str)] = &[
    ("liam.brown@mail.com", 1, "Warfarin", "5mg", "once daily", 90, "active"),
    ("liam.brown@mail.com", 1, "Atorvastatin", "20mg", "once daily", 30, "active"),
    ("olivia.davis@mail.com", 3, "Hydrocortisone cream", "1%", "twice daily", 14, "dispensed"),
    ("noah.garcia@mail.com", 4, "Sumatriptan", "50mg", "as needed", 30, "active"),
];

// (patient, doctor id, test, days ago, result, critical)
const LAB_TESTS: &[(&str, i64, &str, i64, Option<&str>, bool)] = &[
    ("liam.brown@mail.com", 1, "Troponin I", 1, Some("High: 0.9 ng/mL"), true),
    ("olivia.davis@mail.com", 3, "Hemoglobin", 6, Some("Normal: 12.5 g/dL"), false),
    ("emma.wilson@mail.com", 2, "Complete Blood Count", 2, None, false),
    ("noah.garcia@mail.com", 4, "MRI Brain", 1, None, false),
];

// (ward, bed prefix, bed count)
const WARDS: &[(&str, &str, i64)] = &[
    ("General Ward", "GW", 10),
    ("ICU", "ICU", 5),
    ("Cardiology", "CW", 6),
    ("Neurology", "NW", 6),
];

// (bed, patient) for current admissions
const ADMISSIONS: &[(&str, &str)] = &[
    ("CW-01", "liam.brown@mail.com"),
    ("NW-01", "noah.garcia@mail.com"),
];

/// Invoice subtotal from a JSON item list of `{"name", "cost"}` objects
fn items_total(items: &str) -> Result<f64> {
    let parsed: Vec<serde_json::Value> = serde_json::from_str(items)?;
    Ok(parsed.iter().filter_map(|i| i["cost"].as_f64()).sum())
}

pub fn seed(conn: &Connection) -> Result<()> {
    for (name, specialization, email) in DOCTORS {
        conn.execute(
            "INSERT INTO doctors (name, specialization, email) VALUES (?1, ?2, ?3)",
            params![name, specialization, email],
        )?;
    }

    for (i, (name, email, age)) in PATIENTS.iter().enumerate() {
        conn.execute(
            "INSERT INTO patients (name, email, age, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, age, days_ago(60 - i as i64 * 10)],
        )?;
    }

    let mut appointment_ids = Vec::with_capacity(APPOINTMENTS.len());
    for (patient, doctor, offset, time, reason, status) in APPOINTMENTS {
        conn.execute(
            "INSERT INTO appointments (patient_email, doctor_id, appointment_date, appointment_time,
                                       reason, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![patient, doctor, date_offset(*offset), time, reason, status, days_ago(10)],
        )?;
        appointment_ids.push(conn.last_insert_rowid());
    }

    for (patient, appointment, items, insurance, status) in INVOICES {
        let subtotal = items_total(items)?;
        let due = (subtotal - insurance).max(0.0);
        conn.execute(
            "INSERT INTO invoices (patient_email, appointment_id, items, subtotal,
                                   insurance_covered, total_due, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                patient,
                appointment_ids[*appointment],
                items,
                subtotal,
                insurance,
                due,
                status,
                days_ago(4)
            ],
        )?;
    }

    for (name, category, qty, unit, reorder, expiry, supplier, cost) in INVENTORY {
        conn.execute(
            "INSERT INTO inventory_items (name, category, quantity, unit, reorder_level,
                                          expiry_date, supplier, cost_per_unit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                category,
                qty,
                unit,
                reorder,
                expiry.map(date_offset),
                supplier,
                cost
            ],
        )?;
    }
    conn.execute(
        "INSERT INTO reorder_alerts (item_id, quantity_at_trigger, triggered_at)
         SELECT id, quantity, ?1 FROM inventory_items WHERE name = 'Oxygen Cylinders'",
        params![days_ago(1)],
    )?;

    for (patient, doctor, medication, dosage, frequency, days, status) in PRESCRIPTIONS {
        conn.execute(
            "INSERT INTO prescriptions (patient_email, doctor_id, medication, dosage, frequency,
                                        duration_days, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![patient, doctor, medication, dosage, frequency, days, status, days_ago(7)],
        )?;
    }

    for (patient, doctor, test, ago, result, critical) in LAB_TESTS {
        let status = if result.is_some() { "completed" } else { "pending" };
        conn.execute(
            "INSERT INTO lab_tests (patient_email, doctor_id, test_name, ordered_at, status,
                                    result, critical_flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![patient, doctor, test, days_ago(*ago), status, result, critical],
        )?;
    }

    for (ward, prefix, count) in WARDS {
        for n in 1..=*count {
            conn.execute(
                "INSERT INTO beds (ward_name, bed_number, status) VALUES (?1, ?2, 'available')",
                params![ward, format!("{}-{:02}", prefix, n)],
            )?;
        }
    }
    for (bed, patient) in ADMISSIONS {
        conn.execute(
            "UPDATE beds SET status = 'occupied', patient_email = ?1, assigned_at = ?2
             WHERE bed_number = ?3",
            params![patient, days_ago(2), bed],
        )?;
        conn.execute(
            "INSERT INTO ward_events (bed_id, event_type, patient_email, performed_at, notes)
             SELECT id, 'admit', ?1, ?2, ?3 FROM beds WHERE bed_number = ?4",
            params![patient, days_ago(2), format!("Admitted to {}", bed), bed],
        )?;
    }
    conn.execute(
        "UPDATE beds SET status = 'cleaning' WHERE bed_number = 'GW-01'",
        [],
    )?;
    conn.execute(
        "INSERT INTO ward_events (bed_id, event_type, performed_at, notes)
         SELECT id, 'discharge', ?1, 'Patient discharged from GW-01. Bed queued for cleaning.'
         FROM beds WHERE bed_number = 'GW-01'",
        params![days_ago(1)],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_counts() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let count = |sql: &str| -> i64 { conn.query_row(sql, [], |r| r.get(0)).unwrap() };
        assert_eq!(count("SELECT COUNT(*) FROM doctors"), 4);
        assert_eq!(count("SELECT COUNT(*) FROM beds"), 27);
        assert_eq!(count("SELECT COUNT(*) FROM beds WHERE status = 'available'"), 24);
        assert_eq!(count("SELECT COUNT(*) FROM inventory_items WHERE quantity <= reorder_level"), 2);

        let due: f64 = conn.query_row(
            "SELECT total_due FROM invoices WHERE patient_email = 'olivia.davis@mail.com'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(due, 170.0);
        Ok(())
    }

    #[test]
    fn test_one_scheduled_booking_per_doctor_slot() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let clash = conn.execute(
            "INSERT INTO appointments (patient_email, doctor_id, appointment_date, appointment_time)
             SELECT 'sophia.martin@mail.com', doctor_id, appointment_date, appointment_time
             FROM appointments WHERE id = 1",
            [],
        );
        assert!(clash.is_err());

        // cancelled rows do not hold the slot
        conn.execute(
            "INSERT INTO appointments (patient_email, doctor_id, appointment_date, appointment_time, status)
             SELECT 'sophia.martin@mail.com', doctor_id, appointment_date, appointment_time, 'cancelled'
             FROM appointments WHERE id = 1",
            [],
        )?;
        Ok(())
    }
}
