//! bizdesk-gateway - HTTP and WebSocket front end for one app's chat pipeline
//!
//! REST: `POST /api/chat`, `GET /api/status`, `GET /api/sessions`.
//! WebSocket `/ws`: JSON requests (`message.send`, `session.*`, `status.get`)
//! with routing and tool events streamed while a turn runs.

pub mod auth;
pub mod events;
pub mod protocol;
pub mod server;
pub mod session;

pub use server::{GatewayServer, GatewayState};
pub use session::SessionManager;
