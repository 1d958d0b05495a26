//! Financial reporting: ledger, budgets and cash

use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    code       TEXT UNIQUE NOT NULL,
    name       TEXT NOT NULL,
    type       TEXT NOT NULL CHECK (type IN ('asset','liability','equity','revenue','expense')),
    category   TEXT,
    department TEXT,
    is_active  INTEGER DEFAULT 1
);
CREATE TABLE IF NOT EXISTS transactions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    txn_date    TEXT NOT NULL,
    account_id  INTEGER REFERENCES accounts(id),
    description TEXT,
    amount      REAL NOT NULL,
    txn_type    TEXT NOT NULL CHECK (txn_type IN ('debit','credit')),
    category    TEXT,
    department  TEXT,
    reference   TEXT,
    posted_by   TEXT,
    created_at  TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(txn_date);
CREATE TABLE IF NOT EXISTS budgets (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    department  TEXT NOT NULL,
    fiscal_year INTEGER NOT NULL,
    period      INTEGER NOT NULL,
    amount      REAL NOT NULL,
    category    TEXT,
    created_by  TEXT,
    created_at  TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS budget_actuals (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id     INTEGER REFERENCES budgets(id),
    actual_amount REAL DEFAULT 0,
    as_of_date    TEXT DEFAULT CURRENT_DATE,
    updated_at    TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS cash_accounts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    account_type TEXT DEFAULT 'current',
    balance      REAL DEFAULT 0,
    currency     TEXT DEFAULT 'INR',
    institution  TEXT,
    updated_at   TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS cash_transactions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    cash_account_id INTEGER REFERENCES cash_accounts(id),
    txn_date        TEXT NOT NULL,
    txn_type        TEXT NOT NULL CHECK (txn_type IN ('inflow','outflow')),
    amount          REAL NOT NULL,
    category        TEXT,
    description     TEXT,
    created_at      TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS report_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    report_type  TEXT,
    generated_by TEXT,
    recipients   TEXT,
    sent_at      TEXT DEFAULT CURRENT_TIMESTAMP,
    period       TEXT,
    status       TEXT DEFAULT 'logged'
);
CREATE TABLE IF NOT EXISTS report_schedules (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    report_type TEXT,
    frequency   TEXT CHECK (frequency IN ('daily','weekly','monthly')),
    recipients  TEXT,
    next_run    TEXT,
    is_active   INTEGER DEFAULT 1,
    created_at  TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS kpi_snapshots (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name   TEXT NOT NULL,
    metric_value  REAL,
    period        TEXT,
    calculated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS alerts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_type    TEXT,
    threshold     REAL,
    current_value REAL,
    triggered_at  TEXT DEFAULT CURRENT_TIMESTAMP,
    sent_to       TEXT,
    resolved      INTEGER DEFAULT 0
);
";

const SEED: &str = "
INSERT INTO accounts (code, name, type, category, department) VALUES
  ('1001','Cash - HDFC Current','asset','cash','Finance'),
  ('1002','Cash - ICICI Savings','asset','cash','Finance'),
  ('1003','Petty Cash','asset','cash','Admin'),
  ('1010','Accounts Receivable','asset','receivable','Finance'),
  ('1020','Inventory','asset','inventory','Operations'),
  ('1030','Prepaid Expenses','asset','prepaid','Finance'),
  ('1100','Fixed Assets - Equipment','asset','fixed_asset','IT'),
  ('1101','Fixed Assets - Furniture','asset','fixed_asset','Admin'),
  ('1110','Accumulated Depreciation','asset','depreciation','Finance'),
  ('2001','Accounts Payable','liability','payable','Finance'),
  ('2010','Accrued Salaries','liability','accrued','HR'),
  ('2020','Short-term Loan - HDFC','liability','short_term_debt','Finance'),
  ('2100','Long-term Loan - SBI','liability','long_term_debt','Finance'),
  ('2110','Deferred Revenue','liability','deferred_revenue','Sales'),
  ('3001','Share Capital','equity','capital','Finance'),
  ('3010','Retained Earnings','equity','retained','Finance'),
  ('4001','Product Sales Revenue','revenue','product','Sales'),
  ('4002','SaaS Subscription Revenue','revenue','saas','Sales'),
  ('4003','Professional Services Revenue','revenue','services','Sales'),
  ('4004','Other Revenue','revenue','other','Sales'),
  ('5001','Cost of Goods Sold - Products','expense','cogs','Operations'),
  ('5002','Cloud Infrastructure Costs','expense','cogs','Engineering'),
  ('6001','Salaries - Engineering','expense','salary','Engineering'),
  ('6002','Salaries - Sales','expense','salary','Sales'),
  ('6003','Salaries - Marketing','expense','salary','Marketing'),
  ('6004','Salaries - Admin','expense','salary','Admin'),
  ('6010','Rent & Utilities','expense','overhead','Admin'),
  ('6020','Marketing & Advertising','expense','marketing','Marketing'),
  ('6030','Travel & Entertainment','expense','travel','Sales'),
  ('6040','Software & Subscriptions','expense','software','IT');

INSERT INTO transactions
  (txn_date, account_id, description, amount, txn_type, category, department, reference, posted_by)
VALUES
  ('2026-02-01',17,'Product sales Feb batch-1',4200000,'credit','product','Sales','REV-FEB-001','controller@finapp.com'),
  ('2026-02-10',17,'Product sales Feb batch-2',3800000,'credit','product','Sales','REV-FEB-002','controller@finapp.com'),
  ('2026-02-01',18,'SaaS subscriptions Feb',8500000,'credit','saas','Sales','SAAS-FEB-001','controller@finapp.com'),
  ('2026-02-15',18,'SaaS renewals Feb',2200000,'credit','saas','Sales','SAAS-FEB-002','controller@finapp.com'),
  ('2026-02-01',19,'Consulting projects Feb',3500000,'credit','services','Sales','SVC-FEB-001','controller@finapp.com'),
  ('2026-02-20',19,'Implementation fees Feb',1800000,'credit','services','Sales','SVC-FEB-002','controller@finapp.com'),
  ('2026-02-28',21,'Product COGS Feb',3200000,'debit','cogs','Operations','COGS-FEB-001','controller@finapp.com'),
  ('2026-02-28',22,'Cloud infra Feb',1800000,'debit','cogs','Engineering','COGS-FEB-002','controller@finapp.com'),
  ('2026-02-28',23,'Engineering salaries Feb',3200000,'debit','salary','Engineering','SAL-FEB-ENG','controller@finapp.com'),
  ('2026-02-28',24,'Sales salaries Feb',2100000,'debit','salary','Sales','SAL-FEB-SAL','controller@finapp.com'),
  ('2026-02-28',25,'Marketing salaries Feb',1400000,'debit','salary','Marketing','SAL-FEB-MKT','controller@finapp.com'),
  ('2026-02-28',26,'Admin salaries Feb',800000,'debit','salary','Admin','SAL-FEB-ADM','controller@finapp.com'),
  ('2026-02-28',27,'Rent Feb',600000,'debit','overhead','Admin','RENT-FEB','controller@finapp.com'),
  ('2026-02-15',28,'Google Ads Feb',920000,'debit','marketing','Marketing','MKT-FEB-001','controller@finapp.com'),
  ('2026-02-20',28,'LinkedIn Ads Feb',480000,'debit','marketing','Marketing','MKT-FEB-002','controller@finapp.com'),
  ('2026-02-28',29,'Sales travel Feb',340000,'debit','travel','Sales','TRV-FEB','controller@finapp.com'),
  ('2026-02-28',30,'AWS Slack Zoom Feb',210000,'debit','software','IT','SOFT-FEB','controller@finapp.com'),
  ('2026-01-01',17,'Product sales Jan',7500000,'credit','product','Sales','REV-JAN-001','controller@finapp.com'),
  ('2026-01-01',18,'SaaS subscriptions Jan',10200000,'credit','saas','Sales','SAAS-JAN-001','controller@finapp.com'),
  ('2026-01-01',19,'Consulting Jan',4800000,'credit','services','Sales','SVC-JAN-001','controller@finapp.com'),
  ('2026-01-31',21,'Product COGS Jan',4100000,'debit','cogs','Operations','COGS-JAN-001','controller@finapp.com'),
  ('2026-01-31',22,'Cloud infra Jan',1900000,'debit','cogs','Engineering','COGS-JAN-002','controller@finapp.com'),
  ('2026-01-31',23,'Engineering salaries Jan',3200000,'debit','salary','Engineering','SAL-JAN-ENG','controller@finapp.com'),
  ('2026-01-31',24,'Sales salaries Jan',2100000,'debit','salary','Sales','SAL-JAN-SAL','controller@finapp.com'),
  ('2026-01-31',25,'Marketing salaries Jan',1400000,'debit','salary','Marketing','SAL-JAN-MKT','controller@finapp.com'),
  ('2026-01-31',26,'Admin salaries Jan',800000,'debit','salary','Admin','SAL-JAN-ADM','controller@finapp.com'),
  ('2026-01-31',27,'Rent Jan',600000,'debit','overhead','Admin','RENT-JAN','controller@finapp.com'),
  ('2026-01-15',28,'Digital ads Jan',1200000,'debit','marketing','Marketing','MKT-JAN-001','controller@finapp.com'),
  ('2025-12-01',17,'Product sales Dec',8200000,'credit','product','Sales','REV-DEC-001','controller@finapp.com'),
  ('2025-12-01',18,'SaaS subscriptions Dec',9800000,'credit','saas','Sales','SAAS-DEC-001','controller@finapp.com'),
  ('2025-12-01',19,'Consulting Dec',3200000,'credit','services','Sales','SVC-DEC-001','controller@finapp.com'),
  ('2025-12-31',21,'Product COGS Dec',3900000,'debit','cogs','Operations','COGS-DEC-001','controller@finapp.com'),
  ('2025-12-31',22,'Cloud infra Dec',1750000,'debit','cogs','Engineering','COGS-DEC-002','controller@finapp.com'),
  ('2025-12-31',23,'Engineering salaries Dec',3200000,'debit','salary','Engineering','SAL-DEC-ENG','controller@finapp.com'),
  ('2025-12-31',24,'Sales salaries Dec',2100000,'debit','salary','Sales','SAL-DEC-SAL','controller@finapp.com'),
  ('2025-12-31',25,'Marketing salaries Dec',1400000,'debit','salary','Marketing','SAL-DEC-MKT','controller@finapp.com'),
  ('2025-12-31',26,'Admin salaries Dec',800000,'debit','salary','Admin','SAL-DEC-ADM','controller@finapp.com'),
  ('2025-12-31',27,'Rent Dec',600000,'debit','overhead','Admin','RENT-DEC','controller@finapp.com');

-- Opening balances plus dated receivable and payable items
INSERT INTO transactions
  (txn_date, account_id, description, amount, txn_type, category, department, reference, posted_by)
VALUES
  ('2025-11-30',1,'Opening balance',11200000,'debit','cash','Finance','OB-1001','controller@finapp.com'),
  ('2025-11-30',2,'Opening balance',4500000,'debit','cash','Finance','OB-1002','controller@finapp.com'),
  ('2025-11-30',3,'Opening balance',85000,'debit','cash','Admin','OB-1003','controller@finapp.com'),
  ('2025-11-30',5,'Opening balance',2800000,'debit','inventory','Operations','OB-1020','controller@finapp.com'),
  ('2025-11-30',6,'Opening balance',450000,'debit','prepaid','Finance','OB-1030','controller@finapp.com'),
  ('2025-11-30',7,'Opening balance',9500000,'debit','fixed_asset','IT','OB-1100','controller@finapp.com'),
  ('2025-11-30',8,'Opening balance',1200000,'debit','fixed_asset','Admin','OB-1101','controller@finapp.com'),
  ('2025-11-30',9,'Opening balance',2100000,'credit','depreciation','Finance','OB-1110','controller@finapp.com'),
  ('2025-11-30',11,'Opening balance',1200000,'credit','accrued','HR','OB-2010','controller@finapp.com'),
  ('2025-11-30',12,'Opening balance',2500000,'credit','short_term_debt','Finance','OB-2020','controller@finapp.com'),
  ('2025-11-30',13,'Opening balance',6000000,'credit','long_term_debt','Finance','OB-2100','controller@finapp.com'),
  ('2025-11-30',14,'Opening balance',1800000,'credit','deferred_revenue','Sales','OB-2110','controller@finapp.com'),
  ('2025-11-30',15,'Opening balance',10000000,'credit','capital','Finance','OB-3001','controller@finapp.com'),
  ('2025-11-30',16,'Opening balance',8935000,'credit','retained','Finance','OB-3010','controller@finapp.com'),
  ('2026-02-15',4,'Invoice Acme Retail',3200000,'debit','receivable','Sales','INV-2026-031','controller@finapp.com'),
  ('2026-01-10',4,'Invoice Northwind',1900000,'debit','receivable','Sales','INV-2026-007','controller@finapp.com'),
  ('2025-12-10',4,'Invoice Globex',800000,'debit','receivable','Sales','INV-2025-118','controller@finapp.com'),
  ('2025-11-15',4,'Invoice Initech',500000,'debit','receivable','Sales','INV-2025-102','controller@finapp.com'),
  ('2026-02-20',10,'Bill CloudCore hosting',1500000,'credit','payable','Operations','BILL-2026-044','controller@finapp.com'),
  ('2026-02-05',10,'Bill Office Supplies Co',1100000,'credit','payable','Admin','BILL-2026-029','controller@finapp.com'),
  ('2026-01-12',10,'Bill Apex Logistics',600000,'credit','payable','Operations','BILL-2026-011','controller@finapp.com'),
  ('2025-12-20',10,'Bill Vertex Legal',400000,'credit','payable','Finance','BILL-2025-090','controller@finapp.com');

INSERT INTO budgets (department, fiscal_year, period, amount, category, created_by) VALUES
  ('Engineering',2026,2,3000000,'salary','analyst@finapp.com'),
  ('Sales',2026,2,1950000,'salary','analyst@finapp.com'),
  ('Marketing',2026,2,1150000,'salary','analyst@finapp.com'),
  ('Admin',2026,2,800000,'salary','analyst@finapp.com'),
  ('Marketing',2026,2,1200000,'marketing','analyst@finapp.com'),
  ('Sales',2026,2,300000,'travel','analyst@finapp.com'),
  ('IT',2026,2,180000,'software','analyst@finapp.com'),
  ('Admin',2026,2,600000,'overhead','analyst@finapp.com'),
  ('Operations',2026,2,3000000,'cogs','analyst@finapp.com'),
  ('Engineering',2026,2,1700000,'cogs','analyst@finapp.com');

INSERT INTO budget_actuals (budget_id, actual_amount, as_of_date) VALUES
  (1,3200000,'2026-02-28'),(2,2100000,'2026-02-28'),(3,1400000,'2026-02-28'),
  (4,800000,'2026-02-28'),(5,1400000,'2026-02-28'),(6,340000,'2026-02-28'),
  (7,210000,'2026-02-28'),(8,600000,'2026-02-28'),(9,3200000,'2026-02-28'),
  (10,1800000,'2026-02-28');

INSERT INTO cash_accounts (name, account_type, balance, currency, institution) VALUES
  ('HDFC Current Account','current',11200000,'INR','HDFC Bank'),
  ('ICICI Savings Account','savings',4500000,'INR','ICICI Bank'),
  ('Petty Cash','petty',85000,'INR','Internal');

INSERT INTO cash_transactions (cash_account_id, txn_date, txn_type, amount, category, description) VALUES
  (1,'2026-02-01','inflow',8500000,'saas_revenue','SaaS collections Feb'),
  (1,'2026-02-05','inflow',4200000,'product_revenue','Product collections Feb'),
  (1,'2026-02-10','inflow',3500000,'services_revenue','Services collections Feb'),
  (1,'2026-02-28','outflow',7500000,'salaries','Payroll Feb 2026'),
  (1,'2026-02-15','outflow',1400000,'marketing','Digital ads payment Feb'),
  (1,'2026-02-20','outflow',600000,'rent','Office rent Feb'),
  (1,'2026-02-25','outflow',3200000,'cogs','Supplier payment Feb'),
  (1,'2026-01-01','inflow',10200000,'saas_revenue','SaaS collections Jan'),
  (1,'2026-01-01','inflow',7500000,'product_revenue','Product sales Jan'),
  (1,'2026-01-31','outflow',7600000,'salaries','Payroll Jan 2026'),
  (1,'2026-01-20','outflow',4100000,'cogs','COGS payments Jan'),
  (2,'2026-02-01','inflow',1800000,'services_revenue','Services ICICI received'),
  (2,'2026-02-10','outflow',340000,'travel','Sales travel reimbursement');

INSERT INTO kpi_snapshots (metric_name, metric_value, period, calculated_at) VALUES
  ('gross_margin_pct',53.60,'2025-12','2026-01-02 09:00:00'),
  ('ebitda_margin_pct',24.80,'2025-12','2026-01-02 09:00:00'),
  ('gross_margin_pct',52.80,'2026-01','2026-02-02 09:00:00'),
  ('ebitda_margin_pct',26.40,'2026-01','2026-02-02 09:00:00'),
  ('current_ratio',2.05,'2026-01','2026-02-02 09:00:00'),
  ('gross_margin_pct',54.20,'2026-02','2026-03-02 09:00:00'),
  ('ebitda_margin_pct',25.10,'2026-02','2026-03-02 09:00:00'),
  ('net_profit_margin',18.30,'2026-02','2026-03-02 09:00:00'),
  ('current_ratio',2.10,'2026-02','2026-03-02 09:00:00'),
  ('quick_ratio',1.85,'2026-02','2026-03-02 09:00:00'),
  ('debt_to_equity',0.34,'2026-02','2026-03-02 09:00:00'),
  ('revenue_growth_mom',-8.50,'2026-02','2026-03-02 09:00:00');

INSERT INTO report_schedules (report_type, frequency, recipients, next_run, is_active) VALUES
  ('weekly_kpi_digest','weekly','cfo@finapp.com,admin@finapp.com',datetime('now','+7 days'),1),
  ('monthly_pl','monthly','cfo@finapp.com,controller@finapp.com',datetime('now','+30 days'),1),
  ('cash_flow_summary','weekly','cfo@finapp.com,controller@finapp.com',datetime('now','+7 days'),1);
";

pub fn seed(conn: &Connection) -> Result<()> {
    conn.execute_batch(SEED)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_ledger_shape() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let accounts: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))?;
        assert_eq!(accounts, 30);

        // Revenue rows must point at revenue accounts
        let mismatched: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions t JOIN accounts a ON a.id = t.account_id
             WHERE t.category IN ('product','saas','services') AND a.type != 'revenue'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(mismatched, 0);

        let cash: f64 = conn.query_row("SELECT SUM(balance) FROM cash_accounts", [], |r| r.get(0))?;
        assert_eq!(cash, 15_785_000.0);

        // Opening balances keep the ledger in balance: debits = credits outside revenue/expense
        let net: f64 = conn.query_row(
            "SELECT SUM(CASE WHEN t.txn_type = 'debit' THEN t.amount ELSE -t.amount END)
             FROM transactions t JOIN accounts a ON a.id = t.account_id
             WHERE a.type IN ('asset','liability','equity')",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(net, 0.0);
        Ok(())
    }
}
