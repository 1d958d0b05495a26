//! Database and math tool servers

use super::ToolServer;

pub mod database;
pub mod math;

pub static DATABASE_SERVER: ToolServer = ToolServer {
    name: "DatabaseServer",
    tools: database::TOOLS,
};

pub static MATH_SERVER: ToolServer = ToolServer {
    name: "MathServer",
    tools: math::TOOLS,
};
