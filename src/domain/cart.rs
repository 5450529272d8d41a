//! Catalogue identifiers and cart line items.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::Currency;

/// Smallest quantity a line item can hold.
pub const MIN_QUANTITY: u32 = 1;
/// Largest quantity a line item can hold.
pub const MAX_QUANTITY: u32 = 10;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Catalogue product id.
    ProductId
);
string_id!(
    /// Catalogue variant id (size, colour, ...). Always belongs to one product.
    VariantId
);
string_id!(
    /// Cart id, one per storefront session.
    CartId
);

/// What stock is tracked against: the variant when there is one, otherwise the product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SubjectId {
    Product(ProductId),
    Variant(VariantId),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(id) => write!(f, "product:{id}"),
            Self::Variant(id) => write!(f, "variant:{id}"),
        }
    }
}

/// Identity of a line in the cart: a product, optionally narrowed to one variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
        }
    }

    pub fn variant(product_id: impl Into<ProductId>, variant_id: impl Into<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: Some(variant_id.into()),
        }
    }

    pub fn subject(&self) -> SubjectId {
        match &self.variant_id {
            Some(variant) => SubjectId::Variant(variant.clone()),
            None => SubjectId::Product(self.product_id.clone()),
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// One product(+variant) entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_unit_price: Option<Decimal>,
    pub currency: Currency,
}

impl CartLineItem {
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    /// Price actually charged per unit: the discounted price when present.
    pub fn effective_unit_price(&self) -> Decimal {
        self.discount_unit_price.unwrap_or(self.unit_price)
    }

    pub fn line_total(&self) -> Decimal {
        self.effective_unit_price() * Decimal::from(self.quantity)
    }
}

/// Catalogue data the UI hands over when a product is put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub unit_price: Decimal,
    pub discount_unit_price: Option<Decimal>,
    pub currency: Currency,
}

impl NewLineItem {
    pub fn new(product_id: impl Into<ProductId>, unit_price: Decimal, currency: Currency) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            unit_price,
            discount_unit_price: None,
            currency,
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<VariantId>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    pub fn with_discount_price(mut self, price: Decimal) -> Self {
        self.discount_unit_price = Some(price);
        self
    }

    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }
}

/// Clamp a requested quantity into `[MIN_QUANTITY, MAX_QUANTITY]`.
///
/// Returns `None` for zero or negative requests, which mean "remove the line".
pub fn clamp_quantity(requested: i64) -> Option<u32> {
    if requested < i64::from(MIN_QUANTITY) {
        return None;
    }
    let capped = requested.min(i64::from(MAX_QUANTITY));
    u32::try_from(capped).ok()
}
