use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::actions::{CartAction, CartCreate};
use crate::actor_framework::Entity;
use crate::domain::{
    clamp_quantity, CartId, CartLineItem, Currency, LineKey, NewLineItem, SubjectId, MAX_QUANTITY,
};
use crate::error::CartError;
use crate::pricing::{compute_totals, CartTotals, PricingRules};

/// A shopping cart. Owned by its [`crate::actor_framework::ResourceActor`];
/// everything else works on snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    id: CartId,
    lines: Vec<CartLineItem>,
    coupon_code: Option<String>,
    rules: Arc<PricingRules>,
    revision: u64,
}

impl Cart {
    pub fn id(&self) -> &CartId {
        &self.id
    }

    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    /// Incremented on every committed mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, key: &LineKey) -> Option<&CartLineItem> {
        self.lines.iter().find(|line| line.key() == *key)
    }

    /// Totals are derived from the current lines on every call.
    pub fn totals(&self) -> CartTotals {
        compute_totals(&self.lines, self.coupon_code.as_deref(), &self.rules)
    }

    /// Distinct products and variants referenced by the cart.
    pub fn subjects(&self) -> BTreeSet<SubjectId> {
        self.lines.iter().map(|line| line.key().subject()).collect()
    }

    fn currency(&self) -> Option<&Currency> {
        self.lines.first().map(|line| &line.currency)
    }

    fn add(&mut self, item: NewLineItem, quantity: u32) -> Result<(), CartError> {
        let key = item.key();
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(0));
        }
        if item.unit_price < Decimal::ZERO
            || item.discount_unit_price.is_some_and(|price| price < Decimal::ZERO)
        {
            return Err(CartError::NegativePrice(key));
        }
        if let Some(expected) = self.currency() {
            if *expected != item.currency {
                return Err(CartError::CurrencyMismatch {
                    item: key,
                    found: item.currency,
                    expected: expected.clone(),
                });
            }
        }

        match self.lines.iter_mut().find(|line| line.key() == key) {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity).min(MAX_QUANTITY);
                line.unit_price = item.unit_price;
                line.discount_unit_price = item.discount_unit_price;
            }
            None => self.lines.push(CartLineItem {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: quantity.min(MAX_QUANTITY),
                unit_price: item.unit_price,
                discount_unit_price: item.discount_unit_price,
                currency: item.currency,
            }),
        }
        Ok(())
    }

    fn set_quantity(&mut self, key: LineKey, requested: i64) -> Result<(), CartError> {
        let Some(quantity) = clamp_quantity(requested) else {
            self.lines.retain(|line| line.key() != key);
            return Ok(());
        };
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.key() == key)
            .ok_or(CartError::LineNotFound(key))?;
        line.quantity = quantity;
        Ok(())
    }
}

impl Entity for Cart {
    type Id = CartId;
    type CreateParams = CartCreate;
    type Action = CartAction;
    type ActionResult = Cart;
    type Error = CartError;

    fn id(&self) -> &CartId {
        &self.id
    }

    fn from_create_params(id: CartId, params: CartCreate) -> Result<Self, CartError> {
        Ok(Self {
            id,
            lines: Vec::new(),
            coupon_code: None,
            rules: params.rules,
            revision: 0,
        })
    }

    /// Applies a cart mutation.
    ///
    /// # Errors
    /// - `InvalidQuantity` when adding zero units
    /// - `NegativePrice` / `CurrencyMismatch` for a line that cannot join the cart
    /// - `LineNotFound` when setting a positive quantity on a missing line
    /// - `UnknownCoupon` for a code the pricing rules do not know
    fn handle_action(&mut self, action: CartAction) -> Result<Cart, CartError> {
        match action {
            CartAction::Add { item, quantity } => self.add(item, quantity)?,
            CartAction::Remove(key) => self.lines.retain(|line| line.key() != key),
            CartAction::SetQuantity(key, requested) => self.set_quantity(key, requested)?,
            CartAction::Clear => {
                self.lines.clear();
                self.coupon_code = None;
            }
            CartAction::ApplyCoupon(code) => {
                let coupon = self
                    .rules
                    .find_coupon(&code)
                    .ok_or_else(|| CartError::UnknownCoupon(code.trim().to_string()))?;
                self.coupon_code = Some(coupon.code);
            }
            CartAction::RemoveCoupon => self.coupon_code = None,
        }
        self.revision += 1;
        Ok(self.clone())
    }
}
