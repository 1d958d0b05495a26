//! Table definitions and seed data for each app

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod ecommerce;
pub mod finance;
pub mod fusion;
pub mod hospital;
pub mod hr;
pub mod loan;

/// Tables every database carries regardless of which apps it hosts
pub const COMMON_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS thread_memory (
    thread_id  TEXT PRIMARY KEY,
    payload    TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_thread_memory_updated ON thread_memory(updated_at);
";

/// The business apps bizdesk ships.
///
/// Each app lives in its own database file; table names overlap between apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    Ecommerce,
    Finance,
    Hr,
    Loan,
    Fusion,
    Hospital,
}

impl AppKind {
    pub const ALL: [AppKind; 6] = [
        AppKind::Ecommerce,
        AppKind::Finance,
        AppKind::Hr,
        AppKind::Loan,
        AppKind::Fusion,
        AppKind::Hospital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecommerce => "ecommerce",
            Self::Finance => "finance",
            Self::Hr => "hr",
            Self::Loan => "loan",
            Self::Fusion => "fusion",
            Self::Hospital => "hospital",
        }
    }

    pub fn schema(&self) -> &'static str {
        match self {
            Self::Ecommerce => ecommerce::SCHEMA,
            Self::Finance => finance::SCHEMA,
            Self::Hr => hr::SCHEMA,
            Self::Loan => loan::SCHEMA,
            Self::Fusion => fusion::SCHEMA,
            Self::Hospital => hospital::SCHEMA,
        }
    }

    /// Insert seed rows unless the app's anchor table already has data.
    pub fn seed(&self, conn: &Connection) -> Result<bool> {
        let (anchor, seed): (&str, fn(&Connection) -> Result<()>) = match self {
            Self::Ecommerce => ("customers", ecommerce::seed),
            Self::Finance => ("accounts", finance::seed),
            Self::Hr => ("jobs", hr::seed),
            Self::Loan => ("applicants", loan::seed),
            Self::Fusion => ("users", fusion::seed),
            Self::Hospital => ("doctors", hospital::seed),
        };

        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", anchor), [], |r| r.get(0))?;
        if count > 0 {
            return Ok(false);
        }

        let tx = conn.unchecked_transaction()?;
        seed(&tx)?;
        tx.commit()?;
        Ok(true)
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ecommerce" | "e-commerce" | "shop" => Ok(Self::Ecommerce),
            "finance" | "financial" => Ok(Self::Finance),
            "hr" | "hiring" => Ok(Self::Hr),
            "loan" | "loans" | "lending" => Ok(Self::Loan),
            "fusion" | "db-math" => Ok(Self::Fusion),
            "hospital" | "clinic" => Ok(Self::Hospital),
            other => Err(anyhow!(
                "Unknown app '{}'. Expected one of: ecommerce, finance, hr, loan, fusion, hospital",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_kind_parse_and_display() {
        assert_eq!("HR".parse::<AppKind>().unwrap(), AppKind::Hr);
        assert_eq!("lending".parse::<AppKind>().unwrap(), AppKind::Loan);
        assert_eq!("clinic".parse::<AppKind>().unwrap(), AppKind::Hospital);
        assert!("insurance".parse::<AppKind>().is_err());
        for app in AppKind::ALL {
            assert_eq!(app.to_string().parse::<AppKind>().unwrap(), app);
        }
    }

    #[test]
    fn test_every_app_seeds_once() -> Result<()> {
        for app in AppKind::ALL {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(app.schema())?;
            assert!(app.seed(&conn)?, "{} should seed", app);
            assert!(!app.seed(&conn)?, "{} should not seed twice", app);
        }
        Ok(())
    }
}
