use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Flat tax applied to the items subtotal, in percent.
pub const TAX_RATE_PERCENT: i64 = 10;
/// Flat delivery fee in minor units.
pub const FLAT_SHIPPING_PRICE: i64 = 1_500;
/// Orders at or above this subtotal ship for free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 50_000;

/// Authoritative price breakdown, always computed server-side from current
/// catalog prices. The invariant `total_price = items_price + tax_price +
/// shipping_price` holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceBreakdown {
    pub items_price: i64,
    pub tax_price: i64,
    pub shipping_price: i64,
    pub total_price: i64,
}

/// Unit price with any unexpired discount applied, in minor units. A
/// discount only counts when it is positive and carries a future expiry.
pub fn discounted_unit_price(
    price: i64,
    discount_percent: i32,
    discount_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    if discount_percent > 0
        && discount_expires_at
            .map(|expires| now < expires)
            .unwrap_or(false)
    {
        price * i64::from(100 - discount_percent) / 100
    } else {
        price
    }
}

pub fn compute_breakdown(items_price: i64) -> PriceBreakdown {
    let tax_price = items_price * TAX_RATE_PERCENT / 100;
    let shipping_price = if items_price >= FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING_PRICE
    };
    PriceBreakdown {
        items_price,
        tax_price,
        shipping_price,
        total_price: items_price + tax_price + shipping_price,
    }
}
