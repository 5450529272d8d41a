//! In-process collaborators: stock and orders live in resource actors, the
//! payment processor follows a script. Used by the demo binary and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{AvailabilityQuery, InventoryService, OrderService, PaymentProcessor, ServiceError};
use crate::actor_framework::{Entity, FrameworkError, ResourceActor, ResourceClient};
use crate::domain::{
    CreateOrderRequest, CreateOrderResponse, OrderId, OrderItem, PaymentMethod, PaymentReceipt,
    PaymentRequest, StockLevel, StockStatus, SubjectId,
};

/// At or below this many units a subject is reported as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

// =============================================================================
// Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    subject: SubjectId,
    on_hand: u32,
}

impl StockItem {
    pub fn new(subject: SubjectId, on_hand: u32) -> Self {
        Self { subject, on_hand }
    }

    pub fn level(&self) -> StockLevel {
        let status = match self.on_hand {
            0 => StockStatus::OutOfStock,
            n if n <= LOW_STOCK_THRESHOLD => StockStatus::LowStock,
            _ => StockStatus::InStock,
        };
        StockLevel::new(status, self.on_hand)
    }
}

#[derive(Debug, Clone)]
pub enum StockAction {
    SetOnHand(u32),
    Reserve(u32),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StockError {
    #[error("Insufficient stock for {subject}: requested {requested}, available {available}")]
    InsufficientStock {
        subject: SubjectId,
        requested: u32,
        available: u32,
    },
}

impl Entity for StockItem {
    type Id = SubjectId;
    type CreateParams = u32;
    type Action = StockAction;
    type ActionResult = StockLevel;
    type Error = StockError;

    fn id(&self) -> &SubjectId {
        &self.subject
    }

    fn from_create_params(subject: SubjectId, on_hand: u32) -> Result<Self, StockError> {
        Ok(Self::new(subject, on_hand))
    }

    fn handle_action(&mut self, action: StockAction) -> Result<StockLevel, StockError> {
        match action {
            StockAction::SetOnHand(units) => self.on_hand = units,
            StockAction::Reserve(requested) if requested > self.on_hand => {
                return Err(StockError::InsufficientStock {
                    subject: self.subject.clone(),
                    requested,
                    available: self.on_hand,
                });
            }
            StockAction::Reserve(requested) => self.on_hand -= requested,
        }
        Ok(self.level())
    }
}

/// Inventory backed by a keyed [`ResourceActor`] of [`StockItem`]s.
#[derive(Clone)]
pub struct MemoryInventory {
    stock: ResourceClient<StockItem>,
}

impl MemoryInventory {
    pub fn spawn(buffer_size: usize) -> (Self, JoinHandle<()>) {
        let (actor, stock) = ResourceActor::keyed(buffer_size);
        (Self { stock }, tokio::spawn(actor.run()))
    }

    #[instrument(skip(self))]
    pub async fn stock(&self, subject: SubjectId, on_hand: u32) -> Result<(), ServiceError> {
        debug!("Sending request");
        self.stock
            .put(StockItem::new(subject, on_hand))
            .await
            .map_err(stock_failure)
    }

    #[instrument(skip(self))]
    pub async fn set_on_hand(&self, subject: SubjectId, on_hand: u32) -> Result<StockLevel, ServiceError> {
        debug!("Sending request");
        self.stock
            .perform_action(subject, StockAction::SetOnHand(on_hand))
            .await
            .map_err(stock_failure)
    }

    /// Takes stock for every item, or none of it when any subject falls short.
    async fn reserve_all(&self, items: &[OrderItem]) -> Result<(), ServiceError> {
        let wanted: Vec<(SubjectId, u32)> = items.iter().map(|item| (subject_of(item), item.quantity)).collect();
        let ids = wanted.iter().map(|(subject, _)| subject.clone()).collect();
        let on_hand: HashMap<SubjectId, u32> = self
            .stock
            .get_many(ids)
            .await
            .map_err(stock_failure)?
            .into_iter()
            .map(|item| (item.subject, item.on_hand))
            .collect();

        for (subject, requested) in &wanted {
            let available = on_hand.get(subject).copied().unwrap_or(0);
            if available < *requested {
                return Err(stock_failure(FrameworkError::Entity(StockError::InsufficientStock {
                    subject: subject.clone(),
                    requested: *requested,
                    available,
                })));
            }
        }
        for (subject, requested) in wanted {
            self.stock
                .perform_action(subject, StockAction::Reserve(requested))
                .await
                .map_err(stock_failure)?;
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryService for MemoryInventory {
    #[instrument(name = "memory_inventory", skip(self))]
    async fn get_availability(
        &self,
        query: AvailabilityQuery,
    ) -> Result<HashMap<SubjectId, StockLevel>, ServiceError> {
        let items = self
            .stock
            .get_many(query.subjects().collect())
            .await
            .map_err(stock_failure)?;
        Ok(items.into_iter().map(|item| (item.subject.clone(), item.level())).collect())
    }
}

fn subject_of(item: &OrderItem) -> SubjectId {
    match &item.variant_id {
        Some(variant) => SubjectId::Variant(variant.clone()),
        None => SubjectId::Product(item.product_id.clone()),
    }
}

fn stock_failure(error: FrameworkError<StockError>) -> ServiceError {
    match error {
        FrameworkError::Entity(error) => ServiceError::Rejected(error.to_string()),
        FrameworkError::NotFound(id) => ServiceError::Rejected(format!("Unknown stock item: {id}")),
        other => ServiceError::Transport(other.to_string()),
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Confirmed,
    PendingPayment,
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
}

#[derive(Debug)]
pub struct OrderCreate {
    pub order_number: String,
    pub request: CreateOrderRequest,
}

#[derive(Debug, Clone)]
pub enum OrderRecordAction {
    MarkPaid { payment_id: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderBookError {
    #[error("Order {0} is not awaiting payment")]
    NotAwaitingPayment(OrderId),
}

impl Entity for OrderRecord {
    type Id = OrderId;
    type CreateParams = OrderCreate;
    type Action = OrderRecordAction;
    type ActionResult = OrderRecord;
    type Error = OrderBookError;

    fn id(&self) -> &OrderId {
        &self.id
    }

    fn from_create_params(id: OrderId, params: OrderCreate) -> Result<Self, OrderBookError> {
        let request = params.request;
        let status = if request.payment_method.is_online() {
            OrderStatus::PendingPayment
        } else {
            OrderStatus::Confirmed
        };
        Ok(Self {
            id,
            order_number: params.order_number,
            items: request.items,
            payment_method: request.payment_method,
            coupon_code: request.coupon_code,
            status,
            payment_id: None,
        })
    }

    fn handle_action(&mut self, action: OrderRecordAction) -> Result<OrderRecord, OrderBookError> {
        match action {
            OrderRecordAction::MarkPaid { payment_id } => {
                if self.status != OrderStatus::PendingPayment {
                    return Err(OrderBookError::NotAwaitingPayment(self.id.clone()));
                }
                self.status = OrderStatus::Paid;
                self.payment_id = Some(payment_id);
            }
        }
        Ok(self.clone())
    }
}

/// Order book that reserves stock before recording an order.
#[derive(Clone)]
pub struct MemoryOrderService {
    orders: ResourceClient<OrderRecord>,
    inventory: MemoryInventory,
    sequence: Arc<AtomicU64>,
}

impl MemoryOrderService {
    pub fn spawn(buffer_size: usize, inventory: MemoryInventory) -> (Self, JoinHandle<()>) {
        let counter = Arc::new(AtomicU64::new(1));
        let next_order_id = move || OrderId::new(format!("order_{}", counter.fetch_add(1, Ordering::SeqCst)));
        let (actor, orders) = ResourceActor::new(buffer_size, next_order_id);
        let service = Self {
            orders,
            inventory,
            sequence: Arc::new(AtomicU64::new(1)),
        };
        (service, tokio::spawn(actor.run()))
    }

    #[instrument(skip(self))]
    pub async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>, ServiceError> {
        debug!("Sending request");
        self.orders
            .get(id)
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn mark_paid(&self, id: OrderId, payment_id: String) -> Result<OrderRecord, ServiceError> {
        debug!("Sending request");
        self.orders
            .perform_action(id, OrderRecordAction::MarkPaid { payment_id })
            .await
            .map_err(|e| match e {
                FrameworkError::Entity(e) => ServiceError::Rejected(e.to_string()),
                other => ServiceError::Transport(other.to_string()),
            })
    }
}

#[async_trait]
impl OrderService for MemoryOrderService {
    #[instrument(name = "memory_order_service", skip(self, request), fields(items = request.items.len()))]
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::Rejected("Order has no items".to_string()));
        }
        self.inventory.reserve_all(&request.items).await?;

        let order_number = format!("SO-{:06}", self.sequence.fetch_add(1, Ordering::SeqCst));
        let id = self
            .orders
            .create(OrderCreate {
                order_number: order_number.clone(),
                request,
            })
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let record = self.order(id.clone()).await?;
        let status = record.map(|record| record.status.as_str().to_string());

        info!(order_id = %id, %order_number, "Order recorded");
        Ok(CreateOrderResponse {
            id: Some(id.to_string()),
            order_number: Some(order_number),
            status,
        })
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Payment processor that approves or declines every payment, as configured.
/// Approved payments are marked paid in the attached order book.
#[derive(Clone)]
pub struct ScriptedPaymentProcessor {
    orders: Option<MemoryOrderService>,
    decline_reason: Option<String>,
    sequence: Arc<AtomicU64>,
}

impl ScriptedPaymentProcessor {
    pub fn approving() -> Self {
        Self {
            orders: None,
            decline_reason: None,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn declining(reason: impl Into<String>) -> Self {
        Self {
            decline_reason: Some(reason.into()),
            ..Self::approving()
        }
    }

    pub fn with_order_book(mut self, orders: MemoryOrderService) -> Self {
        self.orders = Some(orders);
        self
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedPaymentProcessor {
    #[instrument(name = "scripted_payment", skip(self, request), fields(order_id = %request.order_id))]
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, ServiceError> {
        if let Some(reason) = &self.decline_reason {
            warn!(method = %request.payment_method, "Declining payment");
            return Err(ServiceError::Rejected(reason.clone()));
        }

        let payment_id = format!("pay_{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        if let Some(orders) = &self.orders {
            orders.mark_paid(request.order_id.clone(), payment_id.clone()).await?;
        }
        info!(%payment_id, amount = %request.amount, "Payment captured");
        Ok(PaymentReceipt {
            order_id: request.order_id,
            payment_id,
        })
    }
}
