//! E-commerce support desk: customers, orders, returns, refunds and loyalty

use anyhow::Result;
use rusqlite::{Connection, params};

use crate::time::days_ago;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS customers (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL UNIQUE,
    address        TEXT,
    city           TEXT,
    loyalty_tier   TEXT DEFAULT 'bronze',
    loyalty_points INTEGER DEFAULT 0,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS products (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    sku           TEXT NOT NULL UNIQUE,
    category      TEXT NOT NULL,
    price         REAL NOT NULL,
    stock_qty     INTEGER DEFAULT 0,
    reorder_level INTEGER DEFAULT 10,
    description   TEXT,
    brand         TEXT
);
CREATE TABLE IF NOT EXISTS orders (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_email   TEXT NOT NULL,
    status           TEXT DEFAULT 'processing',
    total_amount     REAL NOT NULL,
    shipping_address TEXT,
    tracking_number  TEXT,
    carrier          TEXT,
    created_at       TEXT DEFAULT CURRENT_TIMESTAMP,
    shipped_at       TEXT,
    delivered_at     TEXT
);
CREATE TABLE IF NOT EXISTS order_items (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id   INTEGER REFERENCES orders(id),
    product_id INTEGER REFERENCES products(id),
    quantity   INTEGER NOT NULL,
    unit_price REAL NOT NULL,
    subtotal   REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS returns (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id       INTEGER REFERENCES orders(id),
    customer_email TEXT NOT NULL,
    product_id     INTEGER REFERENCES products(id),
    reason         TEXT NOT NULL,
    status         TEXT DEFAULT 'pending',
    fraud_flag     INTEGER DEFAULT 0,
    fraud_reason   TEXT,
    initiated_at   TEXT DEFAULT CURRENT_TIMESTAMP,
    resolved_at    TEXT
);
CREATE TABLE IF NOT EXISTS refunds (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    return_id      INTEGER REFERENCES returns(id),
    customer_email TEXT NOT NULL,
    amount         REAL NOT NULL,
    method         TEXT DEFAULT 'original_payment',
    status         TEXT DEFAULT 'pending',
    processed_at   TEXT
);
CREATE TABLE IF NOT EXISTS payments (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id       INTEGER REFERENCES orders(id),
    customer_email TEXT NOT NULL,
    amount         REAL NOT NULL,
    method         TEXT NOT NULL,
    status         TEXT DEFAULT 'completed',
    transaction_id TEXT,
    payment_date   TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS complaints (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_email TEXT NOT NULL,
    order_id       INTEGER REFERENCES orders(id),
    type           TEXT NOT NULL,
    description    TEXT NOT NULL,
    status         TEXT DEFAULT 'open',
    priority       TEXT DEFAULT 'medium',
    escalated      INTEGER DEFAULT 0,
    resolution     TEXT,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP,
    resolved_at    TEXT
);
CREATE TABLE IF NOT EXISTS reviews (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_email TEXT NOT NULL,
    product_id     INTEGER REFERENCES products(id),
    order_id       INTEGER REFERENCES orders(id),
    rating         INTEGER CHECK(rating BETWEEN 1 AND 5),
    comment        TEXT,
    response       TEXT,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS loyalty_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_email TEXT NOT NULL,
    points_change  INTEGER NOT NULL,
    reason         TEXT NOT NULL,
    balance_after  INTEGER NOT NULL,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP
);
";

// (name, email, address, city, tier, points, account age in days)
const CUSTOMERS: &[(&str, &str, &str, &str, &str, i64, i64)] = &[
    ("Aarav Sharma", "aarav.sharma@shop.com", "12 MG Road", "Mumbai", "gold", 4250, 400),
    ("Priya Mehta", "priya.mehta@shop.com", "45 Brigade Road", "Bangalore", "silver", 1850, 380),
    ("Rohan Verma", "rohan.verma@shop.com", "7 Park Street", "Kolkata", "bronze", 320, 200),
    ("Sneha Patel", "sneha.patel@shop.com", "88 Residency Rd", "Pune", "gold", 6100, 500),
    ("Karan Gupta", "karan.gupta@shop.com", "22 Anna Salai", "Chennai", "silver", 2400, 300),
    ("Anjali Nair", "anjali.nair@shop.com", "5 Connaught Pl", "Delhi", "platinum", 9800, 700),
    ("Vikram Singh", "vikram.singh@shop.com", "34 Linking Road", "Mumbai", "bronze", 150, 90),
    ("Meena Joshi", "meena.joshi@shop.com", "18 FC Road", "Pune", "silver", 3200, 260),
    ("Arjun Das", "arjun.das@shop.com", "99 Jubilee Hills", "Hyderabad", "gold", 5500, 420),
    ("Kavya Reddy", "kavya.reddy@shop.com", "12 Koramangala", "Bangalore", "bronze", 80, 30),
    ("Serial Returner", "serial.returner@shop.com", "Unknown Address", "Delhi", "bronze", 0, 120),
    ("Fraud Customer", "fraud.customer@shop.com", "Fake Street 1", "Mumbai", "bronze", 0, 3),
];

// (name, sku, category, price, stock, reorder level, description, brand)
const PRODUCTS: &[(&str, &str, &str, f64, i64, i64, &str, &str)] = &[
    ("Sony WH-1000XM5 Headphones", "SONY-WH5-BLK", "Electronics", 29999.0, 45, 5, "Industry-leading noise cancelling headphones with 30hr battery", "Sony"),
    ("Samsung 65\" QLED TV", "SAM-TV65-4K", "Electronics", 129999.0, 8, 2, "65-inch QLED 4K Smart TV with Quantum Processor", "Samsung"),
    ("Nike Air Max 270", "NIKE-AM270-10", "Footwear", 8999.0, 120, 15, "Lightweight running shoes with Max Air unit in heel", "Nike"),
    ("Levi's 511 Slim Fit Jeans", "LEVIS-511-32", "Apparel", 3499.0, 200, 20, "Classic slim fit jeans in dark wash denim", "Levis"),
    ("Apple iPhone 15 Pro", "APPLE-IP15P", "Electronics", 134999.0, 22, 3, "6.1-inch Super Retina XDR display, A17 Pro chip, titanium design", "Apple"),
    ("Prestige Electric Kettle", "PRES-KETTLE2", "Kitchen", 1299.0, 85, 10, "1.5L electric kettle with auto shut-off, 1500W", "Prestige"),
    ("Fastrack Analog Watch", "FAST-W-ANA21", "Accessories", 2499.0, 160, 25, "Classic analog wristwatch with leather strap", "Fastrack"),
    ("Wildcraft 45L Backpack", "WILD-BP45-GRN", "Bags", 2999.0, 55, 10, "45 litre trekking backpack with rain cover", "Wildcraft"),
    ("Nestle KitKat Gift Box 24pc", "NESTLE-KK-24", "Food", 699.0, 300, 50, "Assorted KitKat chocolate gift box, 24 pieces", "Nestle"),
    ("Lenovo IdeaPad 3 Laptop", "LEN-IP3-15", "Electronics", 45999.0, 15, 3, "15.6-inch FHD, AMD Ryzen 5, 8GB RAM, 512GB SSD", "Lenovo"),
    ("Bosch Hand Blender", "BOSCH-HB-450", "Kitchen", 2199.0, 42, 8, "450W hand blender with 3-speed control and turbo function", "Bosch"),
    ("Out-of-Stock Speaker", "JBL-FLIP7-BLK", "Electronics", 8499.0, 0, 5, "JBL Flip 7 Bluetooth speaker, currently out of stock", "JBL"),
];

// (email, status, total, address, carrier, created days ago, shipped, delivered, sku)
type OrderSeed = (&'static str, &'static str, f64, &'static str, Option<&'static str>, i64, Option<i64>, Option<i64>, &'static str);

const ORDERS: &[OrderSeed] = &[
    ("aarav.sharma@shop.com", "delivered", 29999.0, "12 MG Road Mumbai", Some("BlueDart"), 30, Some(28), Some(25), "SONY-WH5-BLK"),
    ("aarav.sharma@shop.com", "out_for_delivery", 8999.0, "12 MG Road Mumbai", Some("Delhivery"), 3, Some(1), None, "NIKE-AM270-10"),
    ("priya.mehta@shop.com", "delivered", 3499.0, "45 Brigade Rd Bangalore", Some("DTDC"), 20, Some(18), Some(15), "LEVIS-511-32"),
    ("priya.mehta@shop.com", "shipped", 45999.0, "45 Brigade Rd Bangalore", Some("BlueDart"), 7, Some(5), None, "LEN-IP3-15"),
    ("rohan.verma@shop.com", "processing", 1299.0, "7 Park Street Kolkata", None, 1, None, None, "PRES-KETTLE2"),
    ("sneha.patel@shop.com", "delivered", 134999.0, "88 Residency Rd Pune", Some("FedEx"), 45, Some(43), Some(40), "APPLE-IP15P"),
    ("sneha.patel@shop.com", "delivered", 2999.0, "88 Residency Rd Pune", Some("Delhivery"), 15, Some(13), Some(10), "WILD-BP45-GRN"),
    ("karan.gupta@shop.com", "shipped", 2499.0, "22 Anna Salai Chennai", Some("DTDC"), 5, Some(3), None, "FAST-W-ANA21"),
    ("anjali.nair@shop.com", "delivered", 129999.0, "5 Connaught Pl Delhi", Some("BlueDart"), 60, Some(58), Some(55), "SAM-TV65-4K"),
    ("anjali.nair@shop.com", "delivered", 2199.0, "5 Connaught Pl Delhi", Some("Delhivery"), 10, Some(8), Some(5), "BOSCH-HB-450"),
    ("vikram.singh@shop.com", "cancelled", 8999.0, "34 Linking Rd Mumbai", None, 12, None, None, "NIKE-AM270-10"),
    ("meena.joshi@shop.com", "delivered", 699.0, "18 FC Road Pune", Some("India Post"), 25, Some(23), Some(20), "NESTLE-KK-24"),
    ("arjun.das@shop.com", "out_for_delivery", 2999.0, "99 Jubilee Hills Hyderabad", Some("BlueDart"), 4, Some(2), None, "WILD-BP45-GRN"),
    ("kavya.reddy@shop.com", "processing", 8499.0, "12 Koramangala Bangalore", None, 1, None, None, "JBL-FLIP7-BLK"),
    ("serial.returner@shop.com", "delivered", 3499.0, "Unknown Address Delhi", Some("DTDC"), 35, Some(33), Some(30), "LEVIS-511-32"),
    ("serial.returner@shop.com", "delivered", 8999.0, "Unknown Address Delhi", Some("Delhivery"), 50, Some(48), Some(45), "NIKE-AM270-10"),
    ("fraud.customer@shop.com", "delivered", 29999.0, "Fake Street 1 Mumbai", Some("BlueDart"), 20, Some(18), Some(15), "SONY-WH5-BLK"),
];

// (order index, email, amount, method, transaction id, days ago)
const PAYMENTS: &[(usize, &str, f64, &str, &str, i64)] = &[
    (0, "aarav.sharma@shop.com", 29999.0, "credit_card", "TXN-AA-001", 30),
    (1, "aarav.sharma@shop.com", 8999.0, "upi", "TXN-AA-002", 3),
    (2, "priya.mehta@shop.com", 3499.0, "debit_card", "TXN-PM-001", 20),
    (3, "priya.mehta@shop.com", 45999.0, "net_banking", "TXN-PM-002", 7),
    (5, "sneha.patel@shop.com", 134999.0, "credit_card", "TXN-SP-001", 45),
    (6, "sneha.patel@shop.com", 2999.0, "upi", "TXN-SP-002", 15),
    (8, "anjali.nair@shop.com", 129999.0, "credit_card", "TXN-AN-001", 60),
    (8, "anjali.nair@shop.com", 129999.0, "credit_card", "TXN-AN-DUP", 60),
    (9, "anjali.nair@shop.com", 2199.0, "upi", "TXN-AN-002", 10),
    (16, "fraud.customer@shop.com", 29999.0, "credit_card", "TXN-FR-001", 20),
];

// (order index, email, sku, reason, status, fraud flag, fraud reason)
const RETURNS: &[(usize, &str, &str, &str, &str, bool, Option<&str>)] = &[
    (0, "aarav.sharma@shop.com", "SONY-WH5-BLK", "Defective, noise cancelling not working", "approved", false, None),
    (2, "priya.mehta@shop.com", "LEVIS-511-32", "Wrong size delivered", "approved", false, None),
    (14, "serial.returner@shop.com", "LEVIS-511-32", "Changed mind", "rejected", true, Some("8 returns in 90 days, serial return pattern flagged")),
    (15, "serial.returner@shop.com", "NIKE-AM270-10", "Doesn't fit", "flagged", true, Some("Return fraud: excessive return rate")),
    (16, "fraud.customer@shop.com", "SONY-WH5-BLK", "Never received", "flagged", true, Some("Empty box fraud suspected, item weight mismatch")),
];

// (order index, email, type, description, status, priority, escalated, resolution)
const COMPLAINTS: &[(usize, &str, &str, &str, &str, &str, bool, Option<&str>)] = &[
    (0, "aarav.sharma@shop.com", "product_defect", "Headphones stopped working after 2 days. Noise cancelling completely broken.", "resolved", "high", false, Some("Replacement dispatched + refund offered")),
    (8, "anjali.nair@shop.com", "billing_issue", "I was charged twice for my TV order. Both transactions of 1,29,999 appeared.", "open", "urgent", true, None),
    (10, "vikram.singh@shop.com", "wrong_item", "Received black shoes but ordered white. Box was different too.", "open", "medium", false, None),
    (11, "meena.joshi@shop.com", "late_delivery", "Order placed 25 days ago still hasn't arrived per tracking.", "resolved", "low", false, Some("Delivered, courier delay apologised")),
    (13, "kavya.reddy@shop.com", "out_of_stock", "Placed and paid for JBL speaker that shows out of stock now.", "open", "high", false, None),
    (14, "serial.returner@shop.com", "return_rejected", "My return was rejected without explanation. This is unacceptable.", "open", "medium", false, None),
];

// (email, sku, order index, rating, comment)
const REVIEWS: &[(&str, &str, usize, i64, &str)] = &[
    ("aarav.sharma@shop.com", "SONY-WH5-BLK", 0, 5, "Amazing headphones! Worth every penny. Battery life is incredible."),
    ("priya.mehta@shop.com", "LEVIS-511-32", 2, 4, "Good quality jeans, fit well. Slight colour variation from website photo."),
    ("sneha.patel@shop.com", "APPLE-IP15P", 5, 5, "Best phone I've owned. Camera is exceptional. Very happy with purchase."),
    ("anjali.nair@shop.com", "SAM-TV65-4K", 8, 3, "Great picture quality but setup was complicated. Also had billing issue."),
    ("meena.joshi@shop.com", "NESTLE-KK-24", 11, 5, "Perfect gift box. Packaging was great and delivery (eventually) was fine."),
    ("arjun.das@shop.com", "WILD-BP45-GRN", 12, 4, "Solid backpack for trekking. Straps are comfortable. Good value for money."),
    ("kavya.reddy@shop.com", "JBL-FLIP7-BLK", 13, 1, "Charged me for an out-of-stock item. Very disappointed with this experience."),
];

// (email, change, reason, balance after)
const LOYALTY_HISTORY: &[(&str, i64, &str, i64)] = &[
    ("aarav.sharma@shop.com", 300, "Purchase order #1, Sony Headphones", 300),
    ("aarav.sharma@shop.com", 100, "Purchase order #2, Nike Shoes", 400),
    ("aarav.sharma@shop.com", 3750, "Gold tier bonus points", 4250),
    ("priya.mehta@shop.com", 100, "Purchase order #3, Levis Jeans", 100),
    ("priya.mehta@shop.com", 1750, "Silver tier welcome bonus", 1850),
    ("sneha.patel@shop.com", 1350, "Purchase, iPhone 15 Pro", 1350),
    ("sneha.patel@shop.com", 100, "Purchase, Wildcraft Backpack", 1450),
    ("sneha.patel@shop.com", 4650, "Gold tier status bonus", 6100),
    ("anjali.nair@shop.com", 1300, "Purchase, Samsung TV", 1300),
    ("anjali.nair@shop.com", 8500, "Platinum tier welcome bonus", 9800),
    ("meena.joshi@shop.com", 100, "Purchase, KitKat Gift Box", 100),
    ("meena.joshi@shop.com", 3100, "Silver tier bonus", 3200),
    ("arjun.das@shop.com", 100, "Purchase, Wildcraft Backpack", 100),
    ("arjun.das@shop.com", 5400, "Gold tier status upgrade bonus", 5500),
    ("karan.gupta@shop.com", 2400, "Silver tier welcome bonus", 2400),
];

fn product_id(conn: &Connection, sku: &str) -> Result<i64> {
    Ok(conn.query_row("SELECT id FROM products WHERE sku = ?1", params![sku], |r| r.get(0))?)
}

pub fn seed(conn: &Connection) -> Result<()> {
    for (name, email, address, city, tier, points, age) in CUSTOMERS {
        conn.execute(
            "INSERT INTO customers (name, email, address, city, loyalty_tier, loyalty_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![name, email, address, city, tier, points, days_ago(*age)],
        )?;
    }

    for (name, sku, category, price, stock, reorder, description, brand) in PRODUCTS {
        conn.execute(
            "INSERT INTO products (name, sku, category, price, stock_qty, reorder_level, description, brand)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![name, sku, category, price, stock, reorder, description, brand],
        )?;
    }

    let mut order_ids = Vec::with_capacity(ORDERS.len());
    for (idx, (email, status, total, address, carrier, created, shipped, delivered, sku)) in
        ORDERS.iter().enumerate()
    {
        let tracking = carrier.map(|_| format!("IND{:08}", 40_215_000 + idx as i64 * 7919));
        conn.execute(
            "INSERT INTO orders (customer_email, status, total_amount, shipping_address,
                                 tracking_number, carrier, created_at, shipped_at, delivered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                email,
                status,
                total,
                address,
                tracking,
                carrier,
                days_ago(*created),
                shipped.map(days_ago),
                delivered.map(days_ago),
            ],
        )?;
        let order_id = conn.last_insert_rowid();
        order_ids.push(order_id);

        conn.execute(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price, subtotal)
             VALUES (?1, ?2, 1, ?3, ?3)",
            params![order_id, product_id(conn, sku)?, total],
        )?;
    }

    for (order, email, amount, method, txn, days) in PAYMENTS {
        conn.execute(
            "INSERT INTO payments (order_id, customer_email, amount, method, status, transaction_id, payment_date)
             VALUES (?1, ?2, ?3, ?4, 'completed', ?5, ?6)",
            params![order_ids[*order], email, amount, method, txn, days_ago(*days)],
        )?;
    }

    let mut return_ids = Vec::with_capacity(RETURNS.len());
    for (order, email, sku, reason, status, fraud, fraud_reason) in RETURNS {
        let resolved = matches!(*status, "approved" | "rejected").then(|| days_ago(5));
        conn.execute(
            "INSERT INTO returns (order_id, customer_email, product_id, reason, status,
                                  fraud_flag, fraud_reason, initiated_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                order_ids[*order],
                email,
                product_id(conn, sku)?,
                reason,
                status,
                fraud,
                fraud_reason,
                days_ago(8),
                resolved,
            ],
        )?;
        return_ids.push(conn.last_insert_rowid());
    }

    conn.execute(
        "INSERT INTO refunds (return_id, customer_email, amount, method, status, processed_at)
         VALUES (?1, 'aarav.sharma@shop.com', 29999, 'original_payment', 'completed', ?2)",
        params![return_ids[0], days_ago(3)],
    )?;
    conn.execute(
        "INSERT INTO refunds (return_id, customer_email, amount, method, status, processed_at)
         VALUES (?1, 'priya.mehta@shop.com', 3499, 'store_credit', 'completed', ?2)",
        params![return_ids[1], days_ago(2)],
    )?;

    for (order, email, kind, description, status, priority, escalated, resolution) in COMPLAINTS {
        let resolved = (*status == "resolved").then(|| days_ago(2));
        conn.execute(
            "INSERT INTO complaints (customer_email, order_id, type, description, status,
                                     priority, escalated, resolution, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                email,
                order_ids[*order],
                kind,
                description,
                status,
                priority,
                escalated,
                resolution,
                days_ago(5),
                resolved,
            ],
        )?;
    }

    for (email, sku, order, rating, comment) in REVIEWS {
        conn.execute(
            "INSERT INTO reviews (customer_email, product_id, order_id, rating, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![email, product_id(conn, sku)?, order_ids[*order], rating, comment],
        )?;
    }

    for (email, change, reason, balance) in LOYALTY_HISTORY {
        conn.execute(
            "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
             VALUES (?1, ?2, ?3, ?4)",
            params![email, change, reason, balance],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_counts() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(count("customers"), 12);
        assert_eq!(count("products"), 12);
        assert_eq!(count("orders"), 17);
        assert_eq!(count("order_items"), 17);
        assert_eq!(count("returns"), 5);
        assert_eq!(count("refunds"), 2);

        let tracking: Option<String> = conn.query_row(
            "SELECT tracking_number FROM orders WHERE status = 'processing' LIMIT 1",
            [],
            |r| r.get(0),
        )?;
        assert!(tracking.is_none());
        Ok(())
    }
}
