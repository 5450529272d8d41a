//! Data accumulated across the checkout steps.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::AddressSelection;
use super::order::{CreatedOrder, OrderCharge, OrderId};
use crate::error::CheckoutError;

/// Method-specific payment fields (card number, UPI id, ...), passed through
/// to the payment processor untouched.
pub type PaymentData = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
    Upi,
    /// Any other online method (net banking, wallets, ...), stored lower case.
    Other(String),
}

impl PaymentMethod {
    /// Parse a method name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "" => None,
            "cod" => Some(Self::CashOnDelivery),
            "card" => Some(Self::Card),
            "upi" => Some(Self::Upi),
            _ => Some(Self::Other(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CashOnDelivery => "cod",
            Self::Card => "card",
            Self::Upi => "upi",
            Self::Other(name) => name,
        }
    }

    /// Everything except cash on delivery is paid through the payment processor.
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::CashOnDelivery)
    }

    /// Payment data keys that must be filled in before this method can be submitted.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Card => &["cardNumber", "cardHolder", "expiry"],
            Self::Upi => &["upiId"],
            Self::CashOnDelivery | Self::Other(_) => &[],
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::parse(&name).ok_or_else(|| "payment method must not be blank".to_string())
    }
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Partial update from one of the checkout forms. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutPatch {
    pub shipping: Option<AddressSelection>,
    pub billing: Option<AddressSelection>,
    pub use_same_address_for_billing: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_data: Option<PaymentData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutData {
    pub shipping: Option<AddressSelection>,
    pub billing: Option<AddressSelection>,
    pub use_same_address_for_billing: bool,
    pub payment_method: Option<PaymentMethod>,
    pub payment_data: PaymentData,
    order_id: Option<OrderId>,
    order_number: Option<String>,
    order_charge: Option<OrderCharge>,
    payment_started: bool,
    payment_error: Option<String>,
}

impl Default for CheckoutData {
    fn default() -> Self {
        Self {
            shipping: None,
            billing: None,
            use_same_address_for_billing: true,
            payment_method: None,
            payment_data: PaymentData::new(),
            order_id: None,
            order_number: None,
            order_charge: None,
            payment_started: false,
            payment_error: None,
        }
    }
}

impl CheckoutData {
    /// Merge a form update.
    ///
    /// Once an order exists upstream it was created for either cash on
    /// delivery or online payment; switching between the two would need a new
    /// order, so it is refused.
    pub fn apply(&mut self, patch: CheckoutPatch) -> Result<(), CheckoutError> {
        if let (Some(_), Some(current), Some(requested)) =
            (&self.order_id, &self.payment_method, &patch.payment_method)
        {
            if current.is_online() != requested.is_online() {
                return Err(CheckoutError::Validation {
                    fields: vec!["paymentMethod".to_string()],
                });
            }
        }

        if let Some(shipping) = patch.shipping {
            self.shipping = Some(shipping);
        }
        if let Some(billing) = patch.billing {
            self.billing = Some(billing);
        }
        if let Some(same) = patch.use_same_address_for_billing {
            self.use_same_address_for_billing = same;
        }
        if let Some(method) = patch.payment_method {
            self.payment_method = Some(method);
        }
        if let Some(data) = patch.payment_data {
            self.payment_data = data;
        }
        Ok(())
    }

    /// Address the order is billed to.
    pub fn billing_selection(&self) -> Option<&AddressSelection> {
        if self.use_same_address_for_billing {
            self.shipping.as_ref()
        } else {
            self.billing.as_ref()
        }
    }

    pub fn missing_step1_fields(&self) -> Vec<String> {
        let mut missing = section_gaps("shipping", self.shipping.as_ref());
        if !self.use_same_address_for_billing {
            missing.extend(section_gaps("billing", self.billing.as_ref()));
        }
        missing
    }

    pub fn missing_step2_fields(&self) -> Vec<String> {
        let Some(method) = &self.payment_method else {
            return vec!["paymentMethod".to_string()];
        };
        method
            .required_fields()
            .iter()
            .filter(|field| {
                self.payment_data
                    .get(**field)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|field| format!("paymentData.{field}"))
            .collect()
    }

    pub fn is_step1_complete(&self) -> bool {
        self.missing_step1_fields().is_empty()
    }

    pub fn is_step2_complete(&self) -> bool {
        self.missing_step2_fields().is_empty()
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn order_number(&self) -> Option<&str> {
        self.order_number.as_deref()
    }

    /// Amount the recorded order was created for.
    pub fn order_charge(&self) -> Option<&OrderCharge> {
        self.order_charge.as_ref()
    }

    pub fn payment_started(&self) -> bool {
        self.payment_started
    }

    pub fn payment_error(&self) -> Option<&str> {
        self.payment_error.as_deref()
    }

    /// Store the order created upstream together with the amount it was
    /// created for. The first order wins; a different id afterwards means a
    /// duplicate order and is refused, and the recorded charge never changes.
    pub(crate) fn record_order(&mut self, order: &CreatedOrder, charge: OrderCharge) -> Result<(), CheckoutError> {
        match &self.order_id {
            Some(existing) if *existing != order.id => {
                Err(CheckoutError::OrderAlreadyCreated(existing.clone()))
            }
            Some(_) => Ok(()),
            None => {
                self.order_id = Some(order.id.clone());
                self.order_number = Some(order.order_number.clone());
                self.order_charge = Some(charge);
                Ok(())
            }
        }
    }

    pub(crate) fn set_payment_started(&mut self, started: bool) {
        self.payment_started = started;
    }

    pub(crate) fn set_payment_error(&mut self, message: Option<String>) {
        self.payment_error = message;
    }
}

fn section_gaps(section: &str, selection: Option<&AddressSelection>) -> Vec<String> {
    match selection {
        None => vec![section.to_string()],
        Some(selection) => selection
            .missing_fields()
            .into_iter()
            .map(|field| format!("{section}.{field}"))
            .collect(),
    }
}
