//! Financial reporting tool servers

use super::ToolServer;

pub mod bs;
pub mod budget;
pub mod cash;
pub mod gl;
pub mod kpi;
pub mod pl;
pub mod report;

pub static GL_SERVER: ToolServer = ToolServer {
    name: "GLServer",
    tools: gl::TOOLS,
};

pub static PL_SERVER: ToolServer = ToolServer {
    name: "PLServer",
    tools: pl::TOOLS,
};

pub static BS_SERVER: ToolServer = ToolServer {
    name: "BSServer",
    tools: bs::TOOLS,
};

pub static CASH_SERVER: ToolServer = ToolServer {
    name: "CashFlowServer",
    tools: cash::TOOLS,
};

pub static BUDGET_SERVER: ToolServer = ToolServer {
    name: "BudgetServer",
    tools: budget::TOOLS,
};

pub static KPI_SERVER: ToolServer = ToolServer {
    name: "KPIServer",
    tools: kpi::TOOLS,
};

pub static REPORT_SERVER: ToolServer = ToolServer {
    name: "ReportServer",
    tools: report::TOOLS,
};
