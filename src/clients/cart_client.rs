use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::actor_framework::ResourceClient;
use crate::cart_actor::{Cart, CartAction, CartCreate};
use crate::domain::{CartId, LineKey, NewLineItem};
use crate::error::CartError;
use crate::pricing::{CartTotals, PricingRules};

/// Client for one cart held by the cart [`ResourceActor`](crate::actor_framework::ResourceActor).
///
/// Every mutation answers with the cart as it stands afterwards.
#[derive(Debug, Clone)]
pub struct CartClient {
    inner: ResourceClient<Cart>,
    cart_id: CartId,
}

impl CartClient {
    /// Creates an empty cart priced with `rules`.
    #[instrument(skip(inner, rules))]
    pub async fn open(inner: ResourceClient<Cart>, rules: Arc<PricingRules>) -> Result<Self, CartError> {
        let cart_id = inner.create(CartCreate { rules }).await?;
        info!(%cart_id, "Cart opened");
        Ok(Self { inner, cart_id })
    }

    /// Attaches to a cart that already exists.
    pub fn attach(inner: ResourceClient<Cart>, cart_id: CartId) -> Self {
        Self { inner, cart_id }
    }

    pub fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    async fn act(&self, action: CartAction) -> Result<Cart, CartError> {
        debug!("Sending request");
        Ok(self.inner.perform_action(self.cart_id.clone(), action).await?)
    }

    #[instrument(skip(self, item), fields(cart_id = %self.cart_id, line = %item.key()))]
    pub async fn add(&self, item: NewLineItem, quantity: u32) -> Result<Cart, CartError> {
        self.act(CartAction::Add { item, quantity }).await
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn remove(&self, key: LineKey) -> Result<Cart, CartError> {
        self.act(CartAction::Remove(key)).await
    }

    /// Zero or a negative quantity removes the line.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn set_quantity(&self, key: LineKey, quantity: i64) -> Result<Cart, CartError> {
        self.act(CartAction::SetQuantity(key, quantity)).await
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn clear(&self) -> Result<Cart, CartError> {
        self.act(CartAction::Clear).await
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn apply_coupon(&self, code: &str) -> Result<Cart, CartError> {
        self.act(CartAction::ApplyCoupon(code.to_string())).await
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn remove_coupon(&self) -> Result<Cart, CartError> {
        self.act(CartAction::RemoveCoupon).await
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn snapshot(&self) -> Result<Cart, CartError> {
        debug!("Sending request");
        self.inner
            .get(self.cart_id.clone())
            .await?
            .ok_or_else(|| CartError::NotFound(self.cart_id.to_string()))
    }

    pub async fn totals(&self) -> Result<CartTotals, CartError> {
        Ok(self.snapshot().await?.totals())
    }

    /// Receives the cart after every successful mutation. Closes when the
    /// cart is deleted.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn watch(&self) -> Result<watch::Receiver<Cart>, CartError> {
        debug!("Sending request");
        Ok(self.inner.watch(self.cart_id.clone()).await?)
    }

    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn delete(&self) -> Result<(), CartError> {
        debug!("Sending request");
        Ok(self.inner.delete(self.cart_id.clone()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_framework::ResourceActor;
    use crate::domain::Currency;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn open_cart() -> CartClient {
        let counter = AtomicU64::new(1);
        let (actor, client) = ResourceActor::<Cart>::new(8, move || {
            CartId::new(format!("cart_{}", counter.fetch_add(1, Ordering::SeqCst)))
        });
        tokio::spawn(actor.run());
        CartClient::open(client, Arc::new(PricingRules::default())).await.unwrap()
    }

    #[tokio::test]
    async fn mutations_are_visible_to_watchers() {
        let cart = open_cart().await;
        let mut rx = cart.watch().await.unwrap();

        cart.add(NewLineItem::new("mug", Decimal::from(250), Currency::inr()), 2)
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().lines()[0].quantity, 2);

        let totals = cart.totals().await.unwrap();
        assert_eq!(totals.subtotal, Decimal::from(500));
    }

    #[tokio::test]
    async fn deleted_cart_closes_watchers_and_is_gone() {
        let cart = open_cart().await;
        let mut rx = cart.watch().await.unwrap();

        cart.delete().await.unwrap();
        assert!(rx.changed().await.is_err());
        assert!(matches!(cart.snapshot().await, Err(CartError::NotFound(_))));
        assert!(matches!(cart.clear().await, Err(CartError::NotFound(_))));
    }
}
