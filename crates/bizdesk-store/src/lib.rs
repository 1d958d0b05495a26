//! bizdesk-store - SQLite persistence for the bizdesk apps
//!
//! This crate provides:
//! - [`Store`]: a shared connection with async access through `spawn_blocking`
//! - Per-app schema creation and idempotent seed data ([`AppKind`])
//! - Row-to-JSON helpers used by every tool server
//! - A validated SQL query builder for the database specialist
//! - Persistence for summarized chat threads

pub mod db;
pub mod memory;
pub mod query;
pub mod rows;
pub mod schema;
pub mod time;

pub use db::Store;
pub use memory::ThreadRecord;
pub use query::QueryError;
pub use schema::AppKind;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Store>();
        let _ = std::mem::size_of::<ThreadRecord>();
        let _ = std::mem::size_of::<AppKind>();
    }
}
