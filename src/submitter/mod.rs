//! Order Submitter: turns a validated checkout into at most one order and,
//! for online methods, a hand-off to the payment processor.
//!
//! Every failure leaving this module is a [`CheckoutError`]; raw service or
//! task errors never reach the caller.

mod builder;
mod latch;

pub use builder::*;
pub use latch::*;

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::availability::{AvailabilityReport, Demand};
use crate::cart_actor::Cart;
use crate::domain::{
    CheckoutData, CreateOrderRequest, CreateOrderResponse, CreatedOrder, OrderCharge, OrderId,
    PaymentReceipt, PaymentRequest,
};
use crate::error::CheckoutError;
use crate::services::{OrderService, PaymentProcessor};

/// What a submit attempt has to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// No order exists yet for this session. `charge` is what the customer
    /// will be asked to pay for it.
    NewOrder {
        request: CreateOrderRequest,
        charge: OrderCharge,
    },
    /// An order was already created; only the payment is retried.
    ExistingOrder(PaymentRequest),
}

#[derive(Clone)]
pub struct OrderSubmitter {
    orders: Arc<dyn OrderService>,
    payments: Arc<dyn PaymentProcessor>,
}

impl OrderSubmitter {
    pub fn new(orders: Arc<dyn OrderService>, payments: Arc<dyn PaymentProcessor>) -> Self {
        Self { orders, payments }
    }

    /// Checks a submit attempt against the cart, the checkout data and the
    /// latest availability, and works out what it has to do.
    ///
    /// Once an order exists only its payment is repeated. The order already
    /// holds its stock and its amount, so neither the cart nor availability
    /// is consulted again.
    ///
    /// # Errors
    /// - `EmptyCart`
    /// - `Validation` listing every missing field
    /// - `AvailabilityConflict` when any line of a new order is unavailable or unverified
    pub fn prepare(
        &self,
        cart: &Cart,
        data: &CheckoutData,
        availability: &AvailabilityReport,
    ) -> Result<Submission, CheckoutError> {
        if let Some(order_id) = data.order_id() {
            let charge = data.order_charge().ok_or_else(|| {
                CheckoutError::PaymentFailure(format!("no amount recorded for order {order_id}"))
            })?;
            return Ok(Submission::ExistingOrder(build_payment_request(order_id, charge, data)?));
        }

        let request = build_order_request(cart, data)?;

        // The report may lag the cart; lines it has not seen yet count as unknown.
        let current = AvailabilityReport::derive(
            &Demand::from_cart(cart),
            &availability.snapshots,
            availability.loading,
            None,
        );
        if current.blocked() {
            return Err(CheckoutError::AvailabilityConflict {
                unavailable: current.unavailable.into_iter().collect(),
                unknown: current.unknown.into_iter().collect(),
            });
        }

        Ok(Submission::NewOrder {
            request,
            charge: OrderCharge::from(&cart.totals()),
        })
    }

    /// Calls the order service once.
    ///
    /// The call runs in its own task so that a panic inside the service
    /// adapter surfaces as a `SubmissionFailure` instead of unwinding through
    /// the caller.
    #[instrument(skip(self, request), fields(items = request.items.len(), method = %request.payment_method))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder, CheckoutError> {
        let orders = Arc::clone(&self.orders);
        let response = tokio::spawn(async move { orders.create_order(request).await })
            .await
            .map_err(|e| {
                error!(error = %e, "Order service task failed");
                CheckoutError::SubmissionFailure(e.to_string())
            })?
            .map_err(|e| {
                error!(error = %e, "Order service call failed");
                CheckoutError::SubmissionFailure(e.to_string())
            })?;

        let order = created_order(response)?;
        info!(order_id = %order.id, order_number = %order.order_number, "Order created");
        Ok(order)
    }

    /// Hands the payment to the external processor and waits for its verdict.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.payment_method))]
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, CheckoutError> {
        let order_id = request.order_id.clone();
        let payments = Arc::clone(&self.payments);
        let receipt = tokio::spawn(async move { payments.process_payment(request).await })
            .await
            .map_err(|e| CheckoutError::PaymentFailure(e.to_string()))?
            .map_err(|e| {
                warn!(error = %e, "Payment processor reported an error");
                CheckoutError::PaymentFailure(e.to_string())
            })?;

        if receipt.order_id != order_id {
            warn!(receipt_order = %receipt.order_id, "Payment receipt names a different order");
            return Err(CheckoutError::PaymentFailure(format!(
                "receipt for order {} does not match order {}",
                receipt.order_id, order_id
            )));
        }
        Ok(receipt)
    }
}

/// An answer without an id leaves no safe way forward: retrying blindly
/// could create a second order.
fn created_order(response: CreateOrderResponse) -> Result<CreatedOrder, CheckoutError> {
    let id = response
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            error!(order_number = ?response.order_number, "Order service answered without an order id");
            CheckoutError::UnknownOrderResponse
        })?;

    Ok(CreatedOrder {
        order_number: response.order_number.unwrap_or_else(|| id.clone()),
        status: response.status.unwrap_or_default(),
        id: OrderId::new(id),
    })
}
