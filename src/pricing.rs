//! Price engine.
//!
//! [`compute_totals`] is a pure function of the line items, the applied
//! coupon code and the [`PricingRules`]. All arithmetic is exact decimal
//! arithmetic, so two calls with the same inputs produce identical totals.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{round_to_unit, CartLineItem, Currency, OrderCharge};

/// A recognised coupon code and the share of the subtotal it takes off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub discount_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingRules {
    pub default_currency: Currency,
    /// Orders with a subtotal strictly above this ship for free.
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
    /// Known coupon codes and their discount rates.
    pub coupons: BTreeMap<String, Decimal>,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            default_currency: Currency::inr(),
            free_shipping_threshold: Decimal::from(500),
            flat_shipping_fee: Decimal::from(40),
            tax_rate: Decimal::new(5, 2),
            coupons: BTreeMap::from([("WELCOME10".to_string(), Decimal::new(10, 2))]),
        }
    }
}

impl PricingRules {
    /// Look a coupon up, ignoring case and surrounding whitespace.
    pub fn find_coupon(&self, code: &str) -> Option<Coupon> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }
        self.coupons
            .iter()
            .find(|(known, _)| known.trim().eq_ignore_ascii_case(code))
            .map(|(known, rate)| Coupon {
                code: known.trim().to_ascii_uppercase(),
                discount_rate: *rate,
            })
    }
}

/// Derived cart figures. Never stored; recomputed from the line items on every read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub item_count: u32,
    pub currency: Currency,
}

impl From<&CartTotals> for OrderCharge {
    fn from(totals: &CartTotals) -> Self {
        Self {
            amount: totals.total,
            currency: totals.currency.clone(),
        }
    }
}

pub fn compute_totals(
    items: &[CartLineItem],
    coupon_code: Option<&str>,
    rules: &PricingRules,
) -> CartTotals {
    let currency = items
        .first()
        .map(|item| item.currency.clone())
        .unwrap_or_else(|| rules.default_currency.clone());

    let subtotal: Decimal = items.iter().map(CartLineItem::line_total).sum();
    let item_count = items.iter().map(|item| item.quantity).sum();

    let shipping_cost = if subtotal > rules.free_shipping_threshold {
        Decimal::ZERO
    } else {
        rules.flat_shipping_fee
    };

    let tax = round_to_unit(subtotal * rules.tax_rate);

    let discount = coupon_code
        .and_then(|code| rules.find_coupon(code))
        .map_or(Decimal::ZERO, |coupon| round_to_unit(subtotal * coupon.discount_rate));

    CartTotals {
        subtotal,
        shipping_cost,
        tax,
        discount,
        total: subtotal + shipping_cost + tax - discount,
        item_count,
        currency,
    }
}
