//! Customer support desk for an online store

use bizdesk_store::AppKind;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::ecommerce::{
    COMPLAINTS_SERVER, LOYALTY_SERVER, ORDER_SERVER, PAYMENT_SERVER, PRODUCT_SERVER, RETURNS_SERVER,
};

const SUPERVISOR_PROMPT: &str = "\
You route customer messages for the ShopAI support desk. Hand every message to exactly one \
specialist by calling its transfer tool; do not answer the customer yourself.

- order: tracking, delivery dates, shipment status, cancelling an order, changing the shipping address
- returns: returns, refunds, damaged or wrong items, exchanges, getting money back
- product: stock, availability, prices, product details, categories, restock dates
- payment: charges, duplicate or failed payments, coupons, invoices, transaction history
- complaints: complaints, reviews, replacements, escalation to a human
- loyalty: points, tiers, rewards, promo codes, discounts, vouchers, membership

If the message fits none of these, call no tool.";

const ORDER_PROMPT: &str = "\
You are the order tracking specialist at ShopAI. You look up orders, delivery estimates and \
statuses, cancel orders and update shipping addresses.
- Find the customer's orders by email before anything else.
- Mention the carrier and tracking number when an order has shipped.
- Orders that are out for delivery arrive today; say so.
- Cancellations and address changes need the email that placed the order.";

const RETURNS_PROMPT: &str = "\
You are the returns and refunds specialist at ShopAI.
- Check eligibility and run the fraud check before you open a return.
- When a return is refused, explain the exact reason.
- Never approve a return the fraud check rated HIGH; say politely that it needs review.
- Store credit earns loyalty points, so offer it as an alternative to a bank refund.";

const PRODUCT_PROMPT: &str = "\
You are the product and inventory specialist at ShopAI. You handle product details, stock, \
prices, category browsing, low-stock alerts and restock dates.
- Check the real stock level before confirming availability.
- Give a restock date for anything out of stock.
- Be specific about brand, features and price.
- Searches should return several relevant products.";

const PAYMENT_PROMPT: &str = "\
You are the payments and billing specialist at ShopAI. You verify charges, catch duplicate \
charges, check coupons, produce invoices and apply store credit.
- Verify a charge against the order total before escalating.
- Flag duplicate charges straight away and give the refund timeline.
- Check coupons against the actual order total.
- Be exact with amounts.";

const COMPLAINTS_PROMPT: &str = "\
You are the complaints and reviews specialist at ShopAI. You file complaints, report their \
status, arrange replacements, escalate to a human and collect reviews.
- Acknowledge every complaint with empathy.
- Billing problems and product-safety issues are filed as urgent.
- Always give a timeline when a complaint is filed.
- For 1-star reviews, offer to make things right.";

const LOYALTY_PROMPT: &str = "\
You are the loyalty and promotions specialist at ShopAI. One point is worth one rupee.
- Report balances together with their rupee value.
- Tell the customer how far they are from the next tier.
- Promo codes have minimum order amounts; validate against the real order total.
- Keep the tone upbeat.";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Ecommerce,
    title: "ShopAI Support",
    supervisor_prompt: SUPERVISOR_PROMPT,
    mode: RoutingMode::Handoff,
    keyword_first: true,
    scoring: Scoring::UniqueMostHits,
    specialists: &[
        SpecialistDef {
            id: "order_agent",
            label: "Order",
            summary: "Route to the order agent: tracking, status, delivery, cancellation, address.",
            prompt: ORDER_PROMPT,
            server: &ORDER_SERVER,
            keywords: &[
                "order", "track", "tracking", "delivery", "shipment", "shipping",
                "where is", "cancel order", "address update", "status",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "returns_agent",
            label: "Returns",
            summary: "Route to the returns agent: returns, refunds, exchanges, damaged or wrong items.",
            prompt: RETURNS_PROMPT,
            server: &RETURNS_SERVER,
            keywords: &[
                "return", "refund", "exchange", "wrong item", "damaged",
                "defective", "money back", "send back",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "product_agent",
            label: "Product",
            summary: "Route to the product agent: stock, availability, pricing, product info, restock.",
            prompt: PRODUCT_PROMPT,
            server: &PRODUCT_SERVER,
            keywords: &[
                "product", "stock", "available", "availability", "price",
                "restock", "catalog", "catalogue", "size",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "payment_agent",
            label: "Payment",
            summary: "Route to the payment agent: billing, charges, coupons, invoices, transactions.",
            prompt: PAYMENT_PROMPT,
            server: &PAYMENT_SERVER,
            keywords: &[
                "payment", "charged", "charge", "duplicate charge", "invoice",
                "billing", "coupon", "transaction", "failed payment",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "complaints_agent",
            label: "Complaints",
            summary: "Route to the complaints agent: complaints, reviews, replacements, escalations.",
            prompt: COMPLAINTS_PROMPT,
            server: &COMPLAINTS_SERVER,
            keywords: &[
                "complaint", "review", "feedback", "bad experience", "broken",
                "replace", "replacement", "escalate", "unhappy",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "loyalty_agent",
            label: "Loyalty",
            summary: "Route to the loyalty agent: points, tiers, promo codes, rewards, discounts.",
            prompt: LOYALTY_PROMPT,
            server: &LOYALTY_SERVER,
            keywords: &[
                "loyalty", "points", "reward", "promo", "promo code",
                "discount", "tier", "voucher", "membership", "cashback",
            ],
            strong: &[],
        },
    ],
    fallback: Fallback::Static {
        id: "guidance",
        summary: "",
        reply: "I can help with orders and deliveries, returns and refunds, products and stock, \
                payments and invoices, complaints and reviews, or loyalty points and promo codes. \
                Please tell me which one, with your order number or email.",
    },
    fallback_handoff: false,
    supervisor_context: 8,
    specialist_context: 10,
};
