//! Lab orders, results and critical value follow-up
//!
//! A result is critical when the test is one of the watched analytes and the
//! result text reports an out-of-range value. Critical results stay on the
//! flag list until the ordering doctor is marked notified.

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Value, json};
use tracing::warn;

use bizdesk_store::rows::{flag, query_one, query_rows, text};
use bizdesk_store::time::now_ts;

use super::{DOCTOR_ID, PATIENT_EMAIL, doctor_name, error};
use crate::tools::params::{req_i64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const CRITICAL_TESTS: &[&str] = &[
    "potassium",
    "hemoglobin",
    "glucose",
    "troponin",
    "creatinine",
    "sodium",
];

const CRITICAL_MARKERS: &[&str] = &["critical", "high", "low", "abnormal", "danger"];

const TEST_ID: Param = Param::req("test_id", Kind::Integer, "Lab test id");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "order_lab_test",
        description: "Order a lab test for a patient.",
        params: &[
            PATIENT_EMAIL,
            DOCTOR_ID,
            Param::req("test_name", Kind::String, "e.g. Potassium, Complete Blood Count"),
        ],
        handler: Handler::Sql(order_lab_test),
    },
    ToolSpec {
        name: "get_patient_lab_results",
        description: "All lab tests of a patient with status and results.",
        params: &[PATIENT_EMAIL],
        handler: Handler::Sql(get_patient_lab_results),
    },
    ToolSpec {
        name: "update_lab_result",
        description: "Record the result of a pending test. Critical values are flagged for the doctor.",
        params: &[TEST_ID, Param::req("result", Kind::String, "Result text, e.g. 'High: 6.2 mmol/L'")],
        handler: Handler::Sql(update_lab_result),
    },
    ToolSpec {
        name: "get_pending_lab_tests",
        description: "Tests awaiting results, oldest first.",
        params: &[],
        handler: Handler::Sql(get_pending_lab_tests),
    },
    ToolSpec {
        name: "get_critical_flags",
        description: "Critical results the ordering doctor has not been notified about.",
        params: &[],
        handler: Handler::Sql(get_critical_flags),
    },
    ToolSpec {
        name: "mark_doctor_notified",
        description: "Record that the doctor was told about a critical result.",
        params: &[TEST_ID],
        handler: Handler::Sql(mark_doctor_notified),
    },
];

fn is_critical(test_name: &str, result: &str) -> bool {
    let test = test_name.to_lowercase();
    let result = result.to_lowercase();
    CRITICAL_TESTS.iter().any(|t| test.contains(t))
        && CRITICAL_MARKERS.iter().any(|m| result.contains(m))
}

fn order_lab_test(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let doctor_id = req_i64(input, "doctor_id")?;
    let test_name = req_str(input, "test_name")?;

    let Some(doctor) = doctor_name(conn, doctor_id)? else {
        return Ok(error(format!("Doctor #{} not found.", doctor_id)));
    };
    let registered: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE email = ?1",
        params![email],
        |r| r.get(0),
    )?;
    if registered == 0 {
        return Ok(error(format!("Patient '{}' not found.", email)));
    }

    conn.execute(
        "INSERT INTO lab_tests (patient_email, doctor_id, test_name, ordered_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![email, doctor_id, test_name, now_ts()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({
        "status": "ordered",
        "test_id": id,
        "message": format!("{} ordered for {} by {}. Test #{}.", test_name, email, doctor, id),
    }))
}

fn get_patient_lab_results(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "patient_email")?.to_lowercase();
    let rows = query_rows(
        conn,
        "SELECT t.id, t.test_name, t.status, t.result, t.critical_flag, d.name AS doctor,
                substr(t.ordered_at, 1, 16) AS ordered_at
         FROM lab_tests t LEFT JOIN doctors d ON d.id = t.doctor_id
         WHERE t.patient_email = ?1 ORDER BY t.ordered_at DESC, t.id DESC",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No lab tests found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

fn update_lab_result(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "test_id")?;
    let result = req_str(input, "result")?;
    let Some(row) = query_one(
        conn,
        "SELECT test_name, patient_email, status FROM lab_tests WHERE id = ?1",
        params![id],
    )?
    else {
        return Ok(error(format!("Lab test #{} not found.", id)));
    };
    if text(&row, "status") == "completed" {
        return Ok(error(format!("Lab test #{} already has a result.", id)));
    }

    let critical = is_critical(text(&row, "test_name"), result);
    conn.execute(
        "UPDATE lab_tests SET status = 'completed', result = ?1, critical_flag = ?2 WHERE id = ?3",
        params![result, critical, id],
    )?;
    let test_name = text(&row, "test_name");
    let message = if critical {
        warn!(
            "Critical {} result for {}: {}",
            test_name,
            text(&row, "patient_email"),
            result
        );
        format!("CRITICAL: {} result recorded. Notify the ordering doctor now.", test_name)
    } else {
        format!("{} result recorded.", test_name)
    };
    Ok(json!({"status": "completed", "critical": critical, "message": message}))
}

fn get_pending_lab_tests(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT t.id, t.patient_email, t.test_name, d.name AS doctor,
                substr(t.ordered_at, 1, 16) AS ordered_at
         FROM lab_tests t LEFT JOIN doctors d ON d.id = t.doctor_id
         WHERE t.status = 'pending' ORDER BY t.ordered_at, t.id",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No pending lab tests."}]));
    }
    Ok(Value::Array(rows))
}

fn get_critical_flags(conn: &Connection, _input: &Value) -> Result<Value> {
    let rows = query_rows(
        conn,
        "SELECT t.id, t.patient_email, t.test_name, t.result, d.name AS doctor, d.email AS doctor_email
         FROM lab_tests t LEFT JOIN doctors d ON d.id = t.doctor_id
         WHERE t.critical_flag = 1 AND t.notified_at IS NULL
         ORDER BY t.ordered_at",
        [],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": "No unacknowledged critical results."}]));
    }
    Ok(Value::Array(rows))
}

fn mark_doctor_notified(conn: &Connection, input: &Value) -> Result<Value> {
    let id = req_i64(input, "test_id")?;
    let Some(row) = query_one(
        conn,
        "SELECT critical_flag, notified_at FROM lab_tests WHERE id = ?1",
        params![id],
    )?
    else {
        return Ok(error(format!("Lab test #{} not found.", id)));
    };
    if !flag(&row, "critical_flag") {
        return Ok(error(format!("Lab test #{} has no critical result.", id)));
    }
    if !row["notified_at"].is_null() {
        return Ok(error(format!("Doctor already notified for test #{}.", id)));
    }
    conn.execute(
        "UPDATE lab_tests SET notified_at = ?1 WHERE id = ?2",
        params![now_ts(), id],
    )?;
    Ok(json!({"status": "notified", "message": format!("Doctor notified for test #{}.", id)}))
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
    fn test_critical_rule() {
        assert!(is_critical("Serum Potassium", "HIGH: 6.8 mmol/L"));
        assert!(!is_critical("Serum Potassium", "4.1 mmol/L"));
        assert!(!is_critical("Lipid Panel", "High LDL"));
    }

    #[test]
    fn test_result_flow() {
        let conn = seeded(AppKind::Hospital);
        let ordered = run(
            &conn,
            "order_lab_test",
            json!({"patient_email": "emma.wilson@mail.com", "doctor_id": 2, "test_name": "Glucose (fasting)"}),
        );
        assert_eq!(ordered["test_id"], 5);

        let pending = run(&conn, "get_pending_lab_tests", json!({}));
        assert_eq!(pending.as_array().unwrap().len(), 3);

        let result = run(
            &conn,
            "update_lab_result",
            json!({"test_id": 5, "result": "Low: 2.9 mmol/L"}),
        );
        assert_eq!(result["critical"], true);

        let again = run(&conn, "update_lab_result", json!({"test_id": 5, "result": "4.5"}));
        assert_eq!(again["status"], "error");

        let normal = run(&conn, "update_lab_result", json!({"test_id": 3, "result": "Within range"}));
        assert_eq!(normal["critical"], false);
    }

    #[test]
    fn test_critical_flags_clear_on_notify() {
        let conn = seeded(AppKind::Hospital);
        let flags = run(&conn, "get_critical_flags", json!({}));
        assert_eq!(flags[0]["test_name"], "Troponin I");
        assert_eq!(flags[0]["doctor"], "Dr. Aisha Patel");

        let not_critical = run(&conn, "mark_doctor_notified", json!({"test_id": 2}));
        assert_eq!(not_critical["status"], "error");

        let notified = run(&conn, "mark_doctor_notified", json!({"test_id": 1}));
        assert_eq!(notified["status"], "notified");
        let twice = run(&conn, "mark_doctor_notified", json!({"test_id": 1}));
        assert_eq!(twice["status"], "error");

        let cleared = run(&conn, "get_critical_flags", json!({}));
        assert!(cleared[0]["message"].is_string());
    }
}
