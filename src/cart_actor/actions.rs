use std::sync::Arc;

use crate::domain::{LineKey, NewLineItem};
use crate::pricing::PricingRules;

/// Parameters for opening a new cart.
#[derive(Debug, Clone, Default)]
pub struct CartCreate {
    pub rules: Arc<PricingRules>,
}

/// Mutations of a cart. Every successful action answers with the cart as it
/// stands right after the change.
#[derive(Debug, Clone)]
pub enum CartAction {
    /// Adds `quantity` units. An existing line for the same product and
    /// variant is incremented instead of duplicated.
    Add { item: NewLineItem, quantity: u32 },
    /// Removes a line. Removing a line that is not in the cart does nothing.
    Remove(LineKey),
    /// Sets a line's quantity, clamped to the allowed range. Zero or less
    /// removes the line.
    SetQuantity(LineKey, i64),
    /// Empties the cart and drops the applied coupon.
    Clear,
    ApplyCoupon(String),
    RemoveCoupon,
}
