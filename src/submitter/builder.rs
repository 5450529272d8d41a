use crate::cart_actor::Cart;
use crate::domain::{CheckoutData, CreateOrderRequest, OrderCharge, OrderId, OrderItem, PaymentRequest};
use crate::error::CheckoutError;

fn incomplete(data: &CheckoutData) -> Option<CheckoutError> {
    let mut fields = data.missing_step1_fields();
    fields.extend(data.missing_step2_fields());
    (!fields.is_empty()).then_some(CheckoutError::Validation { fields })
}

/// Builds the create-order payload from a cart snapshot and the checkout data.
///
/// Saved addresses are resolved structured-first; anything unresolved is sent
/// as the `"Unknown"` sentinel, never as an empty string.
pub fn build_order_request(
    cart: &Cart,
    data: &CheckoutData,
) -> Result<CreateOrderRequest, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if let Some(error) = incomplete(data) {
        return Err(error);
    }

    let (Some(shipping), Some(billing), Some(payment_method)) = (
        data.shipping.as_ref(),
        data.billing_selection(),
        data.payment_method.clone(),
    ) else {
        return Err(CheckoutError::Validation {
            fields: vec!["shipping".to_string()],
        });
    };

    let items = cart
        .lines()
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            quantity: line.quantity,
        })
        .collect();

    Ok(CreateOrderRequest {
        items,
        shipping_address: shipping.to_postal(),
        billing_address: billing.to_postal(),
        payment_method,
        coupon_code: cart.coupon_code().map(str::to_string),
    })
}

/// Builds the hand-off to the payment processor for an existing order,
/// charging what the order was created for.
pub fn build_payment_request(
    order_id: &OrderId,
    charge: &OrderCharge,
    data: &CheckoutData,
) -> Result<PaymentRequest, CheckoutError> {
    if let Some(error) = incomplete(data) {
        return Err(error);
    }
    let payment_method = data.payment_method.clone().ok_or_else(|| CheckoutError::Validation {
        fields: vec!["paymentMethod".to_string()],
    })?;

    Ok(PaymentRequest {
        order_id: order_id.clone(),
        amount: charge.amount,
        currency: charge.currency.clone(),
        payment_method,
        payment_data: data.payment_data.clone(),
    })
}
