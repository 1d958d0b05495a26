//! Hospital operations tool servers

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};

use super::fmt::grouped;
use super::{Kind, Param, ToolServer};

pub mod appointment;
pub mod billing;
pub mod inventory;
pub mod lab;
pub mod pharmacy;
pub mod ward;

pub static APPOINTMENT_SERVER: ToolServer = ToolServer {
    name: "AppointmentServer",
    tools: appointment::TOOLS,
};

pub static BILLING_SERVER: ToolServer = ToolServer {
    name: "BillingServer",
    tools: billing::TOOLS,
};

pub static INVENTORY_SERVER: ToolServer = ToolServer {
    name: "InventoryServer",
    tools: inventory::TOOLS,
};

pub static PHARMACY_SERVER: ToolServer = ToolServer {
    name: "PharmacyServer",
    tools: pharmacy::TOOLS,
};

pub static LAB_SERVER: ToolServer = ToolServer {
    name: "LabServer",
    tools: lab::TOOLS,
};

pub static WARD_SERVER: ToolServer = ToolServer {
    name: "WardServer",
    tools: ward::TOOLS,
};

const PATIENT_EMAIL: Param = Param::req("patient_email", Kind::String, "Patient email");

const DOCTOR_ID: Param = Param::req("doctor_id", Kind::Integer, "Doctor id");

fn error(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

/// Display name of a doctor, if the id exists
fn doctor_name(conn: &Connection, doctor_id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT name FROM doctors WHERE id = ?1",
            params![doctor_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Dollar amount with cents
fn usd(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}${}.{:02}", sign, grouped(cents / 100), cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::seeded;
    use bizdesk_store::AppKind;

    #[test]
    fn test_usd() {
        assert_eq!(usd(1234.5), "$1,234.50");
        assert_eq!(usd(0.05), "$0.05");
        assert_eq!(usd(-25.0), "-$25.00");
    }

    #[test]
    fn test_doctor_lookup() {
        let conn = seeded(AppKind::Hospital);
        assert_eq!(doctor_name(&conn, 1).unwrap().as_deref(), Some("Dr. Aisha Patel"));
        assert!(doctor_name(&conn, 99).unwrap().is_none());
    }
}
