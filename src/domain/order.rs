//! Payloads exchanged with the order service and the payment processor.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::address::PostalAddress;
use super::cart::{ProductId, VariantId};
use super::checkout::{PaymentData, PaymentMethod};
use super::money::Currency;

/// Id assigned by the order service. Once known it never changes for a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

/// Body of the single create-order call made per checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
    pub shipping_address: PostalAddress,
    pub billing_address: PostalAddress,
    pub payment_method: PaymentMethod,
    /// Applied coupon, re-validated by the order service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// Raw reply of the order service. Every field is optional on the wire; an
/// answer without an id cannot be acted upon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub id: Option<String>,
    pub order_number: Option<String>,
    pub status: Option<String>,
}

/// An order the order service has confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub id: OrderId,
    pub order_number: String,
    pub status: String,
}

/// What the customer pays for an order, fixed when the order is created.
/// Later cart edits never change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCharge {
    pub amount: Decimal,
    pub currency: Currency,
}

/// Hand-off to the external payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub payment_data: PaymentData,
}

/// Reported by the payment processor when a payment completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub order_id: OrderId,
    pub payment_id: String,
}
