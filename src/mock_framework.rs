//! # Mock Framework
//!
//! Utilities for testing clients and the checkout pipeline in isolation.
//!
//! Use [`create_mock_client`] to get a resource client and a receiver, or
//! [`create_mock_services`] to get external collaborators whose calls land on
//! channels. Then use the `expect_*` helpers to assert each request and answer
//! it through the returned responder.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::actor_framework::{Entity, Response, ResourceClient, ResourceRequest};
use crate::app_system::Collaborators;
use crate::domain::{
    CreateOrderRequest, CreateOrderResponse, PaymentReceipt, PaymentRequest, StockLevel, SubjectId,
};
use crate::services::{AvailabilityQuery, InventoryService, OrderService, PaymentProcessor, ServiceError};

/// Creates a mock client and a receiver for asserting requests.
///
/// The client sends to a channel the test controls instead of a running
/// `ResourceActor`, so the test decides how and when each request is answered.
pub fn create_mock_client<T: Entity>(buffer_size: usize) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ResourceClient::new(sender), receiver)
}

/// Helper to verify that the next message is a Create request
pub async fn expect_create<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::CreateParams, Response<T::Id, T::Error>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Create { params, respond_to }) => Some((params, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Get request
pub async fn expect_get<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, Response<Option<T>, T::Error>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Get { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Action request
pub async fn expect_action<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, T::Action, Response<T::ActionResult, T::Error>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Action { id, action, respond_to }) => Some((id, action, respond_to)),
        _ => None,
    }
}

// =============================================================================
// External services
// =============================================================================

/// One call to a channel-backed service.
pub struct ServiceCall<Req, Resp> {
    pub request: Req,
    pub respond_to: oneshot::Sender<Result<Resp, ServiceError>>,
}

pub struct ChannelService<Req, Resp> {
    sender: mpsc::UnboundedSender<ServiceCall<Req, Resp>>,
}

impl<Req: Send, Resp: Send> ChannelService<Req, Resp> {
    async fn call(&self, request: Req) -> Result<Resp, ServiceError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ServiceCall { request, respond_to })
            .map_err(|_| ServiceError::Transport("mock service closed".to_string()))?;
        response
            .await
            .map_err(|_| ServiceError::Transport("mock service dropped the call".to_string()))?
    }
}

pub type InventoryCall = ServiceCall<AvailabilityQuery, HashMap<SubjectId, StockLevel>>;
pub type OrderCall = ServiceCall<CreateOrderRequest, CreateOrderResponse>;
pub type PaymentCall = ServiceCall<PaymentRequest, PaymentReceipt>;

#[async_trait]
impl InventoryService for ChannelService<AvailabilityQuery, HashMap<SubjectId, StockLevel>> {
    async fn get_availability(
        &self,
        query: AvailabilityQuery,
    ) -> Result<HashMap<SubjectId, StockLevel>, ServiceError> {
        self.call(query).await
    }
}

#[async_trait]
impl OrderService for ChannelService<CreateOrderRequest, CreateOrderResponse> {
    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse, ServiceError> {
        self.call(request).await
    }
}

#[async_trait]
impl PaymentProcessor for ChannelService<PaymentRequest, PaymentReceipt> {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, ServiceError> {
        self.call(request).await
    }
}

/// Receiving ends of [`create_mock_services`].
pub struct ServiceReceivers {
    pub inventory: mpsc::UnboundedReceiver<InventoryCall>,
    pub orders: mpsc::UnboundedReceiver<OrderCall>,
    pub payments: mpsc::UnboundedReceiver<PaymentCall>,
}

/// Collaborators whose every call is delivered to the returned receivers.
pub fn create_mock_services() -> (Collaborators, ServiceReceivers) {
    let (inventory_tx, inventory) = mpsc::unbounded_channel();
    let (orders_tx, orders) = mpsc::unbounded_channel();
    let (payments_tx, payments) = mpsc::unbounded_channel();

    let collaborators = Collaborators {
        inventory: Arc::new(ChannelService { sender: inventory_tx }),
        orders: Arc::new(ChannelService { sender: orders_tx }),
        payments: Arc::new(ChannelService { sender: payments_tx }),
    };
    (
        collaborators,
        ServiceReceivers {
            inventory,
            orders,
            payments,
        },
    )
}

/// Helper to take the next call of a mock service
pub async fn expect_call<Req, Resp>(
    receiver: &mut mpsc::UnboundedReceiver<ServiceCall<Req, Resp>>,
) -> Option<(Req, oneshot::Sender<Result<Resp, ServiceError>>)> {
    receiver
        .recv()
        .await
        .map(|ServiceCall { request, respond_to }| (request, respond_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart_actor::{Cart, CartAction};
    use crate::clients::CartClient;
    use crate::domain::{CartId, Currency, NewLineItem, StockStatus};
    use crate::error::CartError;
    use crate::pricing::PricingRules;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client::<Cart>(10);

        let open_task = tokio::spawn(async move {
            CartClient::open(client, Arc::new(PricingRules::default())).await
        });

        let (_params, responder) = expect_create(&mut receiver).await.expect("Expected Create request");
        responder.send(Ok(CartId::new("cart_7"))).unwrap();

        let cart = open_task.await.unwrap().unwrap();
        assert_eq!(cart.cart_id(), &CartId::new("cart_7"));

        let snapshot_task = {
            let cart = cart.clone();
            tokio::spawn(async move { cart.snapshot().await })
        };
        let (id, responder) = expect_get(&mut receiver).await.expect("Expected Get request");
        assert_eq!(id, CartId::new("cart_7"));
        responder.send(Ok(None)).unwrap();
        assert_eq!(snapshot_task.await.unwrap(), Err(CartError::NotFound("cart_7".into())));

        let add_task = tokio::spawn(async move {
            cart.add(NewLineItem::new("mug", Decimal::from(250), Currency::inr()), 3).await
        });
        let (id, action, responder) = expect_action(&mut receiver).await.expect("Expected Action request");
        assert_eq!(id, CartId::new("cart_7"));
        match action {
            CartAction::Add { quantity, .. } => assert_eq!(quantity, 3),
            other => panic!("Unexpected action: {:?}", other),
        }
        responder
            .send(Err(crate::actor_framework::FrameworkError::NotFound("cart_7".into())))
            .unwrap();

        assert_eq!(add_task.await.unwrap(), Err(CartError::NotFound("cart_7".into())));
    }

    #[tokio::test]
    async fn test_mock_services() {
        let (collaborators, mut receivers) = create_mock_services();

        let lookup = tokio::spawn(async move {
            collaborators
                .inventory
                .get_availability(AvailabilityQuery {
                    product_ids: vec!["tee".into()],
                    variant_ids: Vec::new(),
                })
                .await
        });

        let (query, responder) = expect_call(&mut receivers.inventory).await.expect("Expected lookup");
        assert_eq!(query.product_ids.len(), 1);
        responder
            .send(Ok(HashMap::from([(
                SubjectId::Product("tee".into()),
                StockLevel::new(StockStatus::InStock, 4),
            )])))
            .unwrap();

        let levels = lookup.await.unwrap().unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[tokio::test]
    async fn dropped_responder_is_a_transport_error() {
        let (collaborators, mut receivers) = create_mock_services();
        let call = tokio::spawn(async move {
            collaborators
                .orders
                .create_order(CreateOrderRequest {
                    items: Vec::new(),
                    shipping_address: Default::default(),
                    billing_address: Default::default(),
                    payment_method: crate::domain::PaymentMethod::CashOnDelivery,
                    coupon_code: None,
                })
                .await
        });

        drop(expect_call(&mut receivers.orders).await);
        assert!(matches!(call.await.unwrap(), Err(ServiceError::Transport(_))));
    }
}
