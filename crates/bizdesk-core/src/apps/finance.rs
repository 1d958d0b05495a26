//! Finance reporting desk
//!
//! Routing never calls the LLM: strong phrases win outright, otherwise at
//! least two soft hits are needed before a specialist is chosen.

use bizdesk_store::AppKind;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::finance::{
    BS_SERVER, BUDGET_SERVER, CASH_SERVER, GL_SERVER, KPI_SERVER, PL_SERVER, REPORT_SERVER,
};

pub const GUIDANCE_REPLY: &str = "I cannot process your request. Please rephrase your request.";

const GL_PROMPT: &str = "\
You are the general ledger specialist for FinReport. You post journal entries and report \
account balances, transactions, the chart of accounts, the trial balance, reconciliations, \
department expenses and revenue by category.
- Check the account code exists before posting.
- Show the account name next to its code.
- When a reconciliation fails, state the discrepancy amount.
- Format amounts in rupees with two decimals.";

const PL_PROMPT: &str = "\
You are the profit and loss specialist for FinReport. You produce income statements, revenue \
and COGS breakdowns, operating expense reports, gross margin and EBITDA, period comparisons \
and month-over-month revenue growth.
- Walk from revenue to net income in order.
- Quote margins as percentages with two decimals.
- When comparing periods, state both values and the change.";

const BS_PROMPT: &str = "\
You are the balance sheet specialist for FinReport. You report assets, liabilities and equity \
as of a date, current and long-term items, the current ratio, working capital and \
debt-to-equity, and check that assets equal liabilities plus equity.
- Default to 2026-02-28 when no date is given.
- Give every ratio with its status.
- If the balance sheet does not balance, show the discrepancy first.";

const BUDGET_PROMPT: &str = "\
You are the budget and variance specialist for FinReport. You set and read department \
budgets, produce variance and utilisation reports, compare forecasts with actuals and raise \
variance alerts.
- Give both the amount and the percentage of every variance.
- Rank departments by absolute overspend.
- Suggest an alert for any overrun above 10%.";

const CASH_PROMPT: &str = "\
You are the cash specialist for FinReport. You report the cash position across all accounts, \
runway, cash flow statements, operating cash flow, receivables and payables aging, and \
record cash movements.
- Always total cash across every account.
- Give runway in days and in months.
- Call out receivables more than 60 days old and overdue supplier bills.
- When cash is below the threshold, recommend an alert.";

const KPI_PROMPT: &str = "\
You are the KPI and analytics specialist for FinReport. You build the KPI dashboard, \
profitability, liquidity, efficiency and leverage ratios, KPI trends from saved snapshots and \
comparisons against SaaS industry benchmarks, and log the weekly KPI digest.
- Periods are months in YYYY-MM form.
- Say whether each KPI is above or below its benchmark.
- Point out the weakest ratio.";

const REPORT_PROMPT: &str = "\
You are the report delivery specialist for FinReport. You turn figures into report summaries, \
log report, board pack and executive alert deliveries, schedule recurring reports and show \
the report audit trail and recipients.
- Deliveries are logged, not emailed; say so.
- Confirm recipients and period before logging a delivery.
- Schedules run daily, weekly or monthly.";

const GENERAL_PROMPT: &str = "\
You answer general finance questions for FinReport when no specialist applies.
Answer in two to four short lines, direct answer first, no long explanations.
If the question is not about finance, reply exactly: \
\"I cannot process your request. Please rephrase your request.\"";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Finance,
    title: "FinReport",
    supervisor_prompt: "",
    mode: RoutingMode::Keyword,
    keyword_first: false,
    scoring: Scoring::StrongThenSoft { min_soft: 2 },
    specialists: &[
        SpecialistDef {
            id: "gl_agent",
            label: "General Ledger",
            summary: "Journal entries, balances, trial balance, reconciliation.",
            prompt: GL_PROMPT,
            server: &GL_SERVER,
            keywords: &[
                "journal", "ledger", "gl", "reconcile", "debit", "credit", "transaction", "account",
            ],
            strong: &["chart of accounts", "trial balance", "post journal", "journal entry"],
        },
        SpecialistDef {
            id: "pl_agent",
            label: "Profit & Loss",
            summary: "Income statement, margins, EBITDA, revenue growth.",
            prompt: PL_PROMPT,
            server: &PL_SERVER,
            keywords: &[
                "p&l", "ebitda", "cogs", "gross margin", "operating expense", "net income",
                "revenue growth",
            ],
            strong: &["profit and loss", "income statement"],
        },
        SpecialistDef {
            id: "bs_agent",
            label: "Balance Sheet",
            summary: "Assets, liabilities, equity, current ratio, working capital.",
            prompt: BS_PROMPT,
            server: &BS_SERVER,
            keywords: &[
                "assets", "liabilities", "equity", "current ratio", "accounts receivable",
                "accounts payable",
            ],
            strong: &["balance sheet", "debt-to-equity", "working capital"],
        },
        SpecialistDef {
            id: "cash_agent",
            label: "Cash Flow",
            summary: "Cash position, runway, cash flow, receivables and payables aging.",
            prompt: CASH_PROMPT,
            server: &CASH_SERVER,
            keywords: &[
                "runway", "burn rate", "operating cash", "ar aging", "ap aging", "liquidity",
                "cash alert", "receivable",
            ],
            strong: &["cash flow", "cash position", "cash runway"],
        },
        SpecialistDef {
            id: "budget_agent",
            label: "Budget",
            summary: "Budgets, variance, utilisation, forecasts.",
            prompt: BUDGET_PROMPT,
            server: &BUDGET_SERVER,
            keywords: &[
                "budget", "variance", "forecast", "overspend", "utilisation", "utilization",
                "over budget", "department spend",
            ],
            strong: &["budget variance", "actual vs plan", "over budget", "top 5 departments"],
        },
        SpecialistDef {
            id: "kpi_agent",
            label: "KPI & Analytics",
            summary: "KPI dashboard, ratios, trends, benchmarks.",
            prompt: KPI_PROMPT,
            server: &KPI_SERVER,
            keywords: &[
                "kpi", "roe", "roa", "benchmark", "ratio", "trend", "analytics", "leverage",
                "profitability",
            ],
            strong: &["kpi dashboard", "benchmark comparison"],
        },
        SpecialistDef {
            id: "report_agent",
            label: "Reports",
            summary: "Report summaries, delivery log, schedules, board pack.",
            prompt: REPORT_PROMPT,
            server: &REPORT_SERVER,
            keywords: &[
                "report", "send email", "distribute", "executive summary", "audit trail", "send",
                "email", "cfo", "recipients",
            ],
            strong: &[
                "board pack", "send report", "schedule report", "send to cfo", "send to all cfo",
                "email cfo",
            ],
        },
    ],
    fallback: Fallback::General {
        id: "general_agent",
        prompt: GENERAL_PROMPT,
        guidance: GUIDANCE_REPLY,
        min_chars: 6,
        max_tokens: 180,
    },
    fallback_handoff: false,
    supervisor_context: 8,
    specialist_context: 10,
};
