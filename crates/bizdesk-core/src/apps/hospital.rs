//! Hospital operations desk

use bizdesk_store::AppKind;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::hospital::{
    APPOINTMENT_SERVER, BILLING_SERVER, INVENTORY_SERVER, LAB_SERVER, PHARMACY_SERVER,
    WARD_SERVER,
};

pub const DEFAULT_REPLY: &str = "I could not tell which department should handle this. \
Please rephrase in one line and mention one area: appointments, billing, inventory/supplies, \
pharmacy/prescriptions, lab tests, or wards/beds.";

const SUPERVISOR_PROMPT: &str = "\
You are the front desk supervisor of CityCare Hospital. Send each request to exactly one \
department through its transfer tool and never answer it yourself.

- appointment: booking, cancelling or rescheduling visits, patient registration, finding doctors
- billing: invoices, bills, payments, charges, insurance, revenue, outstanding balances
- inventory: stock, supplies, reorders, gloves, masks, equipment shortages
- pharmacy: prescriptions, medicines, drugs, dosage, interactions, dispensing
- lab: lab tests, blood tests, results, samples, critical values, pathology
- ward: beds, wards, admissions, discharges, transfers, occupancy, cleaning
- default_answer: the intent is unclear, mixed, or fits no single department";

const APPOINTMENT_PROMPT: &str = "\
You run appointments for CityCare Hospital.
- Validate patient details before registering someone new.
- Check the doctor's availability before booking and offer free slots on a clash.
- Patients may only cancel or change their own appointments; ask for their email.
- Confirm doctor, date and time after every booking or change.";

const BILLING_PROMPT: &str = "\
You handle billing for CityCare Hospital.
- Itemise every invoice and show subtotal, insurance and total due.
- Use calculate_charges for estimates before an invoice exists.
- Invoice status is pending, paid or cancelled.
- For revenue questions lead with outstanding amounts.";

const INVENTORY_PROMPT: &str = "\
You manage medical supplies for CityCare Hospital.
- Report stock with its unit and reorder level.
- Removing stock below zero is refused; say how much is on hand.
- Low items need an open reorder alert; resolve it once the order is placed.
- Mention items expiring within a month when asked about stock health.";

const PHARMACY_PROMPT: &str = "\
You are the CityCare Hospital pharmacist.
- Check interactions against the patient's active prescriptions before prescribing.
- Run check_dosage_safety for children, elderly and low-weight patients.
- Only active prescriptions can be dispensed; dispensed ones cannot be cancelled.
- State any HIGH severity interaction first and clearly.";

const LAB_PROMPT: &str = "\
You run the CityCare Hospital laboratory.
- Record results exactly as reported, with units.
- A critical result must be escalated: list it with get_critical_flags and mark the doctor \
notified once informed.
- Summarise pending tests oldest first.";

const WARD_PROMPT: &str = "\
You manage beds and wards for CityCare Hospital.
- Check availability before admitting; assign the first free bed in the requested ward.
- A patient holds one bed at a time; use transfer to move them.
- Discharged and vacated beds go to cleaning and return to service once cleaned.
- Quote bed numbers in every confirmation.";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Hospital,
    title: "CityCare Hospital",
    supervisor_prompt: SUPERVISOR_PROMPT,
    mode: RoutingMode::Handoff,
    keyword_first: false,
    scoring: Scoring::MostHits,
    specialists: &[
        SpecialistDef {
            id: "appointment_agent",
            label: "Appointments",
            summary: "Route to appointments: booking, cancelling, rescheduling, registration, doctors.",
            prompt: APPOINTMENT_PROMPT,
            server: &APPOINTMENT_SERVER,
            keywords: &[
                "appointment", "book", "cancel", "reschedule", "register", "doctor", "doctors",
                "availability",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "billing_agent",
            label: "Billing",
            summary: "Route to billing: invoices, payments, charges, insurance, revenue.",
            prompt: BILLING_PROMPT,
            server: &BILLING_SERVER,
            keywords: &[
                "invoice", "bill", "payment", "charges", "insurance", "revenue", "outstanding",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "inventory_agent",
            label: "Inventory",
            summary: "Route to inventory: stock levels, supplies, reorders, equipment.",
            prompt: INVENTORY_PROMPT,
            server: &INVENTORY_SERVER,
            keywords: &[
                "stock", "supplies", "inventory", "reorder", "gloves", "masks", "equipment",
                "shortage",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "pharmacy_agent",
            label: "Pharmacy",
            summary: "Route to pharmacy: prescriptions, medicines, dosage, interactions, dispensing.",
            prompt: PHARMACY_PROMPT,
            server: &PHARMACY_SERVER,
            keywords: &[
                "prescription", "prescribe", "medicine", "drug", "medication", "dosage",
                "interaction", "dispense",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "lab_agent",
            label: "Laboratory",
            summary: "Route to the lab: test orders, results, samples, critical values.",
            prompt: LAB_PROMPT,
            server: &LAB_SERVER,
            keywords: &[
                "lab test", "lab", "blood test", "result", "sample", "critical value", "pathology",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "ward_agent",
            label: "Ward Management",
            summary: "Route to wards: beds, admissions, discharges, transfers, cleaning.",
            prompt: WARD_PROMPT,
            server: &WARD_SERVER,
            keywords: &[
                "bed", "ward", "admit", "discharge", "room", "transfer", "occupancy", "cleaning",
            ],
            strong: &[],
        },
    ],
    fallback: Fallback::Static {
        id: "default_answer",
        summary: "Route to the default answer when the intent is unclear or maps to no single department.",
        reply: DEFAULT_REPLY,
    },
    fallback_handoff: true,
    supervisor_context: 8,
    specialist_context: 10,
};
