//! E-commerce support desk tool servers

use super::ToolServer;

pub mod complaints;
pub mod loyalty;
pub mod orders;
pub mod payments;
pub mod products;
pub mod returns;

pub static ORDER_SERVER: ToolServer = ToolServer {
    name: "OrderServer",
    tools: orders::TOOLS,
};

pub static RETURNS_SERVER: ToolServer = ToolServer {
    name: "ReturnsServer",
    tools: returns::TOOLS,
};

pub static PRODUCT_SERVER: ToolServer = ToolServer {
    name: "ProductServer",
    tools: products::TOOLS,
};

pub static PAYMENT_SERVER: ToolServer = ToolServer {
    name: "PaymentServer",
    tools: payments::TOOLS,
};

pub static COMPLAINTS_SERVER: ToolServer = ToolServer {
    name: "ComplaintsServer",
    tools: complaints::TOOLS,
};

pub static LOYALTY_SERVER: ToolServer = ToolServer {
    name: "LoyaltyServer",
    tools: loyalty::TOOLS,
};
