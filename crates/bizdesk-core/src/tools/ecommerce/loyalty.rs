//! Loyalty points, tiers and promo codes

use anyhow::Result;
use rusqlite::{Connection, params};
use serde_json::{Map, Value, json};

use bizdesk_store::rows::{int, query_one, query_rows, text};

use crate::tools::fmt::{grouped, rupees, title};
use crate::tools::params::{req_f64, req_i64, req_str, str_or};
use crate::tools::{Handler, Kind, Param, ToolSpec};

pub struct Tier {
    pub name: &'static str,
    pub min_points: i64,
    pub perks: &'static [&'static str],
}

/// Ascending by threshold
pub const TIERS: &[Tier] = &[
    Tier {
        name: "bronze",
        min_points: 0,
        perks: &["5% birthday discount"],
    },
    Tier {
        name: "silver",
        min_points: 1000,
        perks: &["10% discount", "Free standard shipping on orders ₹500+"],
    },
    Tier {
        name: "gold",
        min_points: 3000,
        perks: &["15% discount", "Free express shipping", "Priority support"],
    },
    Tier {
        name: "platinum",
        min_points: 10000,
        perks: &[
            "20% discount",
            "Free same-day shipping",
            "Dedicated support agent",
            "Early access to sales",
        ],
    },
];

pub fn tier_for_points(points: i64) -> &'static Tier {
    TIERS
        .iter()
        .rev()
        .find(|t| points >= t.min_points)
        .unwrap_or(&TIERS[0])
}

fn tier_named(name: &str) -> (usize, &'static Tier) {
    TIERS
        .iter()
        .enumerate()
        .find(|(_, t)| t.name.eq_ignore_ascii_case(name))
        .unwrap_or((0, &TIERS[0]))
}

pub struct Promo {
    pub code: &'static str,
    pub discount_pct: i64,
    pub min_order: f64,
    pub description: &'static str,
    pub valid_until: &'static str,
    pub tiers: Option<&'static [&'static str]>,
}

pub const PROMOS: &[Promo] = &[
    Promo {
        code: "SAVE10",
        discount_pct: 10,
        min_order: 500.0,
        description: "10% off on orders above ₹500",
        valid_until: "2026-12-31",
        tiers: None,
    },
    Promo {
        code: "WELCOME20",
        discount_pct: 20,
        min_order: 1000.0,
        description: "20% off for new customers",
        valid_until: "2026-12-31",
        tiers: None,
    },
    Promo {
        code: "FLASH50",
        discount_pct: 50,
        min_order: 5000.0,
        description: "50% off flash sale on orders above ₹5000",
        valid_until: "2026-06-30",
        tiers: None,
    },
    Promo {
        code: "GOLD15",
        discount_pct: 15,
        min_order: 2000.0,
        description: "15% off for Gold & Platinum members",
        valid_until: "2026-12-31",
        tiers: Some(&["gold", "platinum"]),
    },
];

const EMAIL: Param = Param::req("customer_email", Kind::String, "Customer email address");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_loyalty_points",
        description: "Get the current loyalty points balance, tier and progress to the next tier.",
        params: &[EMAIL],
        handler: Handler::Sql(get_loyalty_points),
    },
    ToolSpec {
        name: "get_tier_status",
        description: "Get full tier status, perks and the requirements of every tier.",
        params: &[EMAIL],
        handler: Handler::Sql(get_tier_status),
    },
    ToolSpec {
        name: "redeem_points",
        description: "Redeem loyalty points for store credit. 1 point = ₹1, minimum 100 points.",
        params: &[
            EMAIL,
            Param::req("points_to_redeem", Kind::Integer, "Points to redeem"),
        ],
        handler: Handler::Sql(redeem_points),
    },
    ToolSpec {
        name: "add_loyalty_points",
        description: "Add loyalty points to a customer account (purchases, reviews, referrals).",
        params: &[
            EMAIL,
            Param::req("points", Kind::Integer, "Points to add"),
            Param::opt("reason", Kind::String, "What the points are for"),
        ],
        handler: Handler::Sql(add_loyalty_points),
    },
    ToolSpec {
        name: "validate_promo_code",
        description: "Validate a promo code for a customer's order and compute the discount.",
        params: &[
            Param::req("code", Kind::String, "Promo code"),
            EMAIL,
            Param::req("order_amount", Kind::Number, "Order total in rupees"),
        ],
        handler: Handler::Sql(validate_promo_code),
    },
    ToolSpec {
        name: "get_active_promotions",
        description: "List the currently active promo codes.",
        params: &[],
        handler: Handler::Pure(get_active_promotions),
    },
    ToolSpec {
        name: "get_rewards_history",
        description: "Get the 20 most recent loyalty point changes for a customer.",
        params: &[EMAIL],
        handler: Handler::Sql(get_rewards_history),
    },
];

fn customer(conn: &Connection, email: &str) -> Result<Option<Value>> {
    query_one(
        conn,
        "SELECT name, loyalty_points, loyalty_tier FROM customers WHERE email = ?1",
        params![email],
    )
}

fn unknown_customer(email: &str) -> Value {
    json!({"found": false, "message": format!("Customer '{}' not found.", email)})
}

fn get_loyalty_points(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let Some(row) = customer(conn, email)? else {
        return Ok(unknown_customer(email));
    };

    let points = int(&row, "loyalty_points");
    let (idx, tier) = tier_named(text(&row, "loyalty_tier"));
    let next = TIERS.get(idx + 1);
    let to_next = next.map(|n| (n.min_points - points).max(0)).unwrap_or(0);

    let progress = match next {
        Some(n) if to_next > 0 => format!(
            "Need {} more points for {}!",
            grouped(to_next),
            title(n.name)
        ),
        _ => "Highest tier reached!".to_string(),
    };
    Ok(json!({
        "found": true,
        "name": row["name"],
        "email": email,
        "points": points,
        "tier": title(tier.name),
        "tier_perks": tier.perks,
        "monetary_value": rupees(points as f64),
        "next_tier": next.map(|n| title(n.name)).unwrap_or_else(|| "Already at highest tier".into()),
        "points_to_next_tier": to_next,
        "message": format!(
            "{} points ({} value), {} member. {}",
            grouped(points),
            rupees(points as f64),
            title(tier.name),
            progress
        ),
    }))
}

fn get_tier_status(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let Some(row) = customer(conn, email)? else {
        return Ok(unknown_customer(email));
    };

    let (_, tier) = tier_named(text(&row, "loyalty_tier"));
    let mut all = Map::new();
    for t in TIERS {
        all.insert(
            t.name.to_string(),
            json!({"min_points": t.min_points, "perks": t.perks}),
        );
    }
    let points = int(&row, "loyalty_points");
    Ok(json!({
        "found": true,
        "name": row["name"],
        "current_tier": title(tier.name),
        "points": points,
        "current_perks": tier.perks,
        "all_tiers": all,
        "message": format!(
            "{} is a {} member with {} points.",
            text(&row, "name"),
            title(tier.name),
            grouped(points)
        ),
    }))
}

fn redeem_points(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let redeem = req_i64(input, "points_to_redeem")?;
    if redeem < 100 {
        return Ok(json!({"status": "error", "message": "Minimum redemption is 100 points."}));
    }
    let Some(row) = customer(conn, email)? else {
        return Ok(json!({"status": "error", "message": format!("Customer '{}' not found.", email)}));
    };

    let balance = int(&row, "loyalty_points");
    if balance < redeem {
        return Ok(json!({
            "status": "error",
            "message": format!(
                "Insufficient points. You have {} points, trying to redeem {}.",
                grouped(balance),
                grouped(redeem)
            ),
        }));
    }

    let remaining = balance - redeem;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE customers SET loyalty_points = ?1 WHERE email = ?2",
        params![remaining, email],
    )?;
    tx.execute(
        "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            email,
            -redeem,
            format!("Redeemed {} points for store credit", redeem),
            remaining
        ],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "redeemed",
        "points_redeemed": redeem,
        "credit_value": rupees(redeem as f64),
        "remaining_points": remaining,
        "message": format!(
            "{} points redeemed for {} store credit. Remaining balance: {} points.",
            grouped(redeem),
            rupees(redeem as f64),
            grouped(remaining)
        ),
    }))
}

fn add_loyalty_points(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let points = req_i64(input, "points")?;
    let reason = str_or(input, "reason", "Manual adjustment");
    if points <= 0 {
        return Ok(json!({"status": "error", "message": "Points to add must be positive."}));
    }
    let Some(row) = customer(conn, email)? else {
        return Ok(json!({"status": "error", "message": format!("Customer '{}' not found.", email)}));
    };

    let balance = int(&row, "loyalty_points") + points;
    let old_tier = text(&row, "loyalty_tier").to_lowercase();
    let new_tier = tier_for_points(balance).name;
    let upgraded = new_tier != old_tier;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE customers SET loyalty_points = ?1, loyalty_tier = ?2 WHERE email = ?3",
        params![balance, new_tier, email],
    )?;
    tx.execute(
        "INSERT INTO loyalty_history (customer_email, points_change, reason, balance_after)
         VALUES (?1, ?2, ?3, ?4)",
        params![email, points, reason, balance],
    )?;
    tx.commit()?;

    Ok(json!({
        "status": "added",
        "points_added": points,
        "new_balance": balance,
        "tier": title(new_tier),
        "tier_upgraded": upgraded,
        "message": format!(
            "{} points added. New balance: {}. Tier: {}.{}",
            grouped(points),
            grouped(balance),
            title(new_tier),
            if upgraded { " Tier upgraded!" } else { "" }
        ),
    }))
}

fn validate_promo_code(conn: &Connection, input: &Value) -> Result<Value> {
    let code = req_str(input, "code")?.to_uppercase();
    let email = req_str(input, "customer_email")?;
    let amount = req_f64(input, "order_amount")?;

    let Some(promo) = PROMOS.iter().find(|p| p.code == code) else {
        return Ok(json!({
            "valid": false,
            "message": format!("Code '{}' is invalid or does not exist.", code),
        }));
    };
    if amount < promo.min_order {
        return Ok(json!({
            "valid": false,
            "message": format!(
                "Minimum order {} required for '{}'. Your order: {}.",
                rupees(promo.min_order),
                code,
                rupees(amount)
            ),
        }));
    }
    if let Some(tiers) = promo.tiers {
        let tier = customer(conn, email)?
            .map(|row| text(&row, "loyalty_tier").to_lowercase())
            .unwrap_or_default();
        if !tiers.contains(&tier.as_str()) {
            return Ok(json!({
                "valid": false,
                "message": format!("Code '{}' is only for Gold and Platinum members.", code),
            }));
        }
    }

    let discount = (amount * promo.discount_pct as f64).round() / 100.0;
    let total = ((amount - discount) * 100.0).round() / 100.0;
    Ok(json!({
        "valid": true,
        "code": code,
        "discount_pct": promo.discount_pct,
        "discount_amount": discount,
        "original_total": amount,
        "final_total": total,
        "valid_until": promo.valid_until,
        "message": format!(
            "Code '{}' valid! Save {} ({}% off). Pay {}.",
            code,
            rupees(discount),
            promo.discount_pct,
            rupees(total)
        ),
    }))
}

fn get_active_promotions(_input: &Value) -> Result<Value> {
    Ok(PROMOS
        .iter()
        .map(|p| {
            json!({
                "code": p.code,
                "discount": format!("{}% off", p.discount_pct),
                "min_order": rupees(p.min_order),
                "description": p.description,
                "valid_until": p.valid_until,
            })
        })
        .collect())
}

fn get_rewards_history(conn: &Connection, input: &Value) -> Result<Value> {
    let email = req_str(input, "customer_email")?;
    let rows = query_rows(
        conn,
        "SELECT points_change, reason, balance_after, substr(created_at, 1, 16) AS created_at
         FROM loyalty_history WHERE customer_email = ?1
         ORDER BY created_at DESC, id DESC LIMIT 20",
        params![email],
    )?;
    if rows.is_empty() {
        return Ok(json!([{"message": format!("No loyalty history found for '{}'.", email)}]));
    }
    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::seeded;
    use bizdesk_store::AppKind;

    fn run(conn: &Connection, name: &str, input: Value) -> Value {
        crate::tools::testing::run(TOOLS, conn, name, input)
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(tier_for_points(0).name, "bronze");
        assert_eq!(tier_for_points(999).name, "bronze");
        assert_eq!(tier_for_points(1000).name, "silver");
        assert_eq!(tier_for_points(9999).name, "gold");
        assert_eq!(tier_for_points(10000).name, "platinum");
    }

    #[test]
    fn test_points_and_next_tier() {
        let conn = seeded(AppKind::Ecommerce);
        let points = run(&conn, "get_loyalty_points", json!({"customer_email": "anjali.nair@shop.com"}));
        assert_eq!(points["tier"], "Platinum");
        assert_eq!(points["next_tier"], "Already at highest tier");

        let points = run(&conn, "get_loyalty_points", json!({"customer_email": "priya.mehta@shop.com"}));
        assert_eq!(points["next_tier"], "Gold");
        assert_eq!(points["points_to_next_tier"], 1150);

        let missing = run(&conn, "get_tier_status", json!({"customer_email": "ghost@shop.com"}));
        assert_eq!(missing["found"], false);
    }

    #[test]
    fn test_redeem_rules() {
        let conn = seeded(AppKind::Ecommerce);
        let small = run(&conn, "redeem_points", json!({"customer_email": "aarav.sharma@shop.com", "points_to_redeem": 50}));
        assert_eq!(small["message"], "Minimum redemption is 100 points.");

        let too_many = run(&conn, "redeem_points", json!({"customer_email": "rohan.verma@shop.com", "points_to_redeem": 500}));
        assert!(too_many["message"].as_str().unwrap().starts_with("Insufficient points"));

        let ok = run(&conn, "redeem_points", json!({"customer_email": "aarav.sharma@shop.com", "points_to_redeem": 250}));
        assert_eq!(ok["remaining_points"], 4000);
    }

    #[test]
    fn test_add_points_upgrades_tier() {
        let conn = seeded(AppKind::Ecommerce);
        let added = run(
            &conn,
            "add_loyalty_points",
            json!({"customer_email": "anjali.nair@shop.com", "points": 500, "reason": "Review bonus"}),
        );
        assert_eq!(added["new_balance"], 10300);
        assert_eq!(added["tier"], "Platinum");
        assert_eq!(added["tier_upgraded"], false);

        let added = run(&conn, "add_loyalty_points", json!({"customer_email": "rohan.verma@shop.com", "points": 700}));
        assert_eq!(added["tier"], "Silver");
        assert_eq!(added["tier_upgraded"], true);

        let history = run(&conn, "get_rewards_history", json!({"customer_email": "rohan.verma@shop.com"}));
        assert_eq!(history[0]["points_change"], 700);
    }

    #[test]
    fn test_promo_codes() {
        let conn = seeded(AppKind::Ecommerce);
        let ok = run(
            &conn,
            "validate_promo_code",
            json!({"code": "save10", "customer_email": "rohan.verma@shop.com", "order_amount": 1000}),
        );
        assert_eq!(ok["valid"], true);
        assert_eq!(ok["final_total"], 900.0);

        let below = run(
            &conn,
            "validate_promo_code",
            json!({"code": "FLASH50", "customer_email": "rohan.verma@shop.com", "order_amount": 4999}),
        );
        assert_eq!(below["valid"], false);

        let wrong_tier = run(
            &conn,
            "validate_promo_code",
            json!({"code": "GOLD15", "customer_email": "rohan.verma@shop.com", "order_amount": 5000}),
        );
        assert_eq!(wrong_tier["valid"], false);

        let gold = run(
            &conn,
            "validate_promo_code",
            json!({"code": "GOLD15", "customer_email": "aarav.sharma@shop.com", "order_amount": 5000}),
        );
        assert_eq!(gold["discount_amount"], 750.0);

        let unknown = run(
            &conn,
            "validate_promo_code",
            json!({"code": "FREE", "customer_email": "aarav.sharma@shop.com", "order_amount": 5000}),
        );
        assert!(unknown["message"].as_str().unwrap().contains("invalid"));
    }
}
