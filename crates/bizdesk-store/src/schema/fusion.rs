//! Sandbox tables for the database specialist

use anyhow::Result;
use rusqlite::{Connection, params};

use crate::time::days_ago;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    city       TEXT,
    status     TEXT DEFAULT 'active',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS orders (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER REFERENCES users(id),
    product    TEXT NOT NULL,
    amount     REAL NOT NULL,
    status     TEXT DEFAULT 'placed',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS news (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT NOT NULL,
    category     TEXT,
    author_id    INTEGER REFERENCES users(id),
    published_at TEXT DEFAULT CURRENT_TIMESTAMP
);
";

const USERS: &[(&str, &str, &str, &str, i64)] = &[
    ("Asha Rao", "asha.rao@example.com", "Bengaluru", "active", 120),
    ("Ben Carter", "ben.carter@example.com", "London", "active", 98),
    ("Chen Wei", "chen.wei@example.com", "Singapore", "active", 75),
    ("Diego Alvarez", "diego.alvarez@example.com", "Madrid", "inactive", 60),
    ("Esha Kapoor", "esha.kapoor@example.com", "Mumbai", "active", 41),
    ("Femi Adeyemi", "femi.adeyemi@example.com", "Lagos", "active", 22),
    ("Grace Kim", "grace.kim@example.com", "Seoul", "active", 9),
    ("Hiro Tanaka", "hiro.tanaka@example.com", "Tokyo", "inactive", 3),
];

// (user_id, product, amount, status, days_ago)
const ORDERS: &[(i64, &str, f64, &str, i64)] = &[
    (1, "Mechanical Keyboard", 4599.0, "delivered", 90),
    (1, "USB-C Hub", 1899.0, "delivered", 45),
    (2, "Noise Cancelling Headphones", 12999.0, "delivered", 70),
    (3, "Standing Desk", 24999.0, "shipped", 12),
    (3, "Monitor Arm", 3499.0, "placed", 2),
    (5, "Webcam", 2999.0, "delivered", 30),
    (5, "Desk Lamp", 1299.0, "cancelled", 28),
    (6, "Laptop Stand", 1599.0, "placed", 5),
    (7, "Wireless Mouse", 899.0, "shipped", 4),
    (7, "Mouse Pad", 399.0, "placed", 1),
];

// (title, category, author_id, days_ago)
const NEWS: &[(&str, &str, i64, i64)] = &[
    ("Quarterly results beat expectations", "business", 2, 40),
    ("New data centre opens in Mumbai", "technology", 5, 33),
    ("Monsoon arrives early this year", "weather", 1, 25),
    ("Open-source database release adds JSON indexing", "technology", 3, 18),
    ("City marathon draws record turnout", "sports", 6, 11),
    ("Central bank holds rates steady", "business", 2, 6),
    ("Electric buses roll out across the city", "transport", 7, 2),
];

pub fn seed(conn: &Connection) -> Result<()> {
    for (name, email, city, status, age) in USERS {
        conn.execute(
            "INSERT INTO users (name, email, city, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, email, city, status, days_ago(*age)],
        )?;
    }
    for (user_id, product, amount, status, age) in ORDERS {
        conn.execute(
            "INSERT INTO orders (user_id, product, amount, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, product, amount, status, days_ago(*age)],
        )?;
    }
    for (title, category, author, age) in NEWS {
        conn.execute(
            "INSERT INTO news (title, category, author_id, published_at) VALUES (?1, ?2, ?3, ?4)",
            params![title, category, author, days_ago(*age)],
        )?;
    }
    Ok(())
}

/// One line per user table: `name(col type, ...)`.
pub fn describe_tables(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != 'thread_memory'
         ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut lines = Vec::with_capacity(tables.len());
    for table in tables {
        let mut info = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = info
            .query_map([], |r| {
                Ok(format!("{} {}", r.get::<_, String>(1)?, r.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        lines.push(format!("- {}({})", table, columns.join(", ")));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_tables() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let text = describe_tables(&conn)?;
        assert!(text.contains("- news(id INTEGER"));
        assert!(text.contains("- orders(id INTEGER, user_id INTEGER"));
        assert_eq!(text.lines().count(), 3);
        Ok(())
    }
}
