use thiserror::Error;

use crate::actor_framework::FrameworkError;
use crate::checkout::CheckoutStep;
use crate::domain::{Currency, LineKey, OrderId, ProductId, SubjectId};

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CartError {
    #[error("Cart not found: {0}")]
    NotFound(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
    #[error("Negative price for {0}")]
    NegativePrice(LineKey),
    #[error("Item {item} has currency {found}, but cart has currency {expected}")]
    CurrencyMismatch {
        item: LineKey,
        found: Currency,
        expected: Currency,
    },
    #[error("Line not in cart: {0}")]
    LineNotFound(LineKey),
    #[error("Unknown coupon: {0}")]
    UnknownCoupon(String),
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

impl From<FrameworkError<CartError>> for CartError {
    fn from(error: FrameworkError<CartError>) -> Self {
        match error {
            FrameworkError::Entity(error) => error,
            FrameworkError::NotFound(id) => CartError::NotFound(id),
            other => CartError::ActorCommunicationError(other.to_string()),
        }
    }
}

/// Errors surfaced by the checkout pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckoutError {
    #[error("Checkout details incomplete: {}", .fields.join(", "))]
    Validation { fields: Vec<String> },
    #[error("Cart items unavailable: {unavailable:?}, stock unknown: {unknown:?}")]
    AvailabilityConflict {
        unavailable: Vec<ProductId>,
        unknown: Vec<SubjectId>,
    },
    #[error("Order submission failed: {0}")]
    SubmissionFailure(String),
    #[error("Payment failed: {0}")]
    PaymentFailure(String),
    #[error("Order service answered without an order id")]
    UnknownOrderResponse,
    #[error("Order already created: {0}")]
    OrderAlreadyCreated(OrderId),
    #[error("Cannot {action} while checkout is {from}")]
    InvalidTransition {
        from: CheckoutStep,
        action: &'static str,
    },
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

impl CheckoutError {
    /// Text shown to the customer, stored as the checkout's payment error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { fields } => format!("Please complete: {}", fields.join(", ")),
            Self::AvailabilityConflict { .. } => {
                "Some items in your cart are out of stock or could not be checked. Please review your cart."
                    .to_string()
            }
            Self::SubmissionFailure(_) => {
                "We couldn't place your order. Please try again.".to_string()
            }
            Self::PaymentFailure(reason) => {
                format!("Payment failed: {reason}. You can try again.")
            }
            Self::UnknownOrderResponse => {
                "We couldn't confirm your order. Please contact support before trying again."
                    .to_string()
            }
            Self::EmptyCart => "Your cart is empty.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AvailabilityError {
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}
