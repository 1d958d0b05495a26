//! Loan processing desk

use bizdesk_store::AppKind;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::loan::{
    APPLICATION_SERVER, CREDIT_RISK_SERVER, KYC_SERVER, REPAYMENT_SERVER, UNDERWRITING_SERVER,
};

const SUPERVISOR_PROMPT: &str = "\
You classify messages for a loan processing desk. Reply with exactly one token, the name of \
the specialist that should handle the message, and nothing else:

application_agent: registering applicants, applying for a loan, application status, loan types
kyc_agent: identity, documents, employment verification, AML, sanctions, fraud flags, KYC status
credit_risk_agent: credit score, debt-to-income, existing loans, risk level, risk summary
underwriting_agent: approving or rejecting a loan, loan terms, EMI, escalation, decisions
repayment_agent: payments, installments, missed EMIs, schedules, default risk, restructuring";

const APPLICATION_PROMPT: &str = "\
You handle loan applications: registering applicants, submitting applications, tracking \
status, explaining loan types and updating applications.
- Applicants are identified by email.
- Registration needs name, email, age, employment type, employer and annual income.
- Loan types are personal, home, education, business and vehicle.
- KYC must be approved before an application can be submitted; otherwise send the applicant \
to KYC first.";

const KYC_PROMPT: &str = "\
You run KYC and fraud checks: identity, documents, employment, AML, sanctions, fraud flags \
and final KYC approval.
- Run the checks in that order and approve last.
- Flag detected fraud at once and never approve a flagged applicant.
- When KYC cannot be approved, list exactly which checks are missing or failed.";

const CREDIT_PROMPT: &str = "\
You assess credit risk: scores, debt-to-income, existing loans, risk levels and risk \
summaries for underwriting.
- Recalculate the score before an assessment.
- Explain which factors moved the score: income, DTI, missed payments, employment.
- Use the tiers Low, Medium, High and Very High.";

const UNDERWRITING_PROMPT: &str = "\
You make the underwriting decision: approve, reject or escalate, and compute loan terms.
- A decision needs approved KYC and an existing credit score.
- For approvals, state amount, rate, tenure, EMI and total interest.
- For rejections, say why and what the applicant can improve.
- For escalations, give the specific reason a human must review it.";

const REPAYMENT_PROMPT: &str = "\
You service active loans: status, schedules, payments, missed installments, default risk and \
restructuring.
- Check the loan status before acting.
- After a payment, confirm the installment and the new outstanding balance.
- Offer restructuring when a borrower is struggling, before anything stricter.
- Assess default risk whenever a borrower mentions financial trouble.";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Loan,
    title: "Loan Desk",
    supervisor_prompt: SUPERVISOR_PROMPT,
    mode: RoutingMode::Label,
    keyword_first: false,
    scoring: Scoring::MostHits,
    specialists: &[
        SpecialistDef {
            id: "application_agent",
            label: "Application",
            summary: "Registrations, applications, status, loan types.",
            prompt: APPLICATION_PROMPT,
            server: &APPLICATION_SERVER,
            keywords: &[
                "apply", "application", "register", "loan type", "loan types", "submit",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "kyc_agent",
            label: "KYC",
            summary: "Identity, documents, AML, sanctions, fraud, KYC status.",
            prompt: KYC_PROMPT,
            server: &KYC_SERVER,
            keywords: &[
                "kyc", "identity", "document", "aml", "sanction", "fraud", "verify employment",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "credit_risk_agent",
            label: "Credit Risk",
            summary: "Credit score, DTI, risk level, risk summary.",
            prompt: CREDIT_PROMPT,
            server: &CREDIT_RISK_SERVER,
            keywords: &[
                "credit score", "credit", "debt-to-income", "dti", "existing loans", "risk level",
                "risk summary",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "underwriting_agent",
            label: "Underwriting",
            summary: "Approve or reject, loan terms, EMI, escalate.",
            prompt: UNDERWRITING_PROMPT,
            server: &UNDERWRITING_SERVER,
            keywords: &[
                "underwrit", "approve", "reject", "loan terms", "interest rate", "escalate",
                "decision",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "repayment_agent",
            label: "Repayment",
            summary: "Payments, schedule, missed EMI, default risk, restructuring.",
            prompt: REPAYMENT_PROMPT,
            server: &REPAYMENT_SERVER,
            keywords: &[
                "payment", "pay", "installment", "missed", "schedule", "restructur", "default",
                "outstanding",
            ],
            strong: &[],
        },
    ],
    fallback: Fallback::Static {
        id: "guidance",
        summary: "",
        reply: "I can help with loan applications, KYC checks, credit risk, underwriting \
                decisions or repayments. Please mention one of these with the applicant's email \
                or the loan id.",
    },
    fallback_handoff: false,
    supervisor_context: 8,
    specialist_context: 10,
};
