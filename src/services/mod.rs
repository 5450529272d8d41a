//! Boundary contracts with the external inventory, order and payment services.
//!
//! The checkout pipeline only talks to these traits. [`memory`] backs them
//! with in-process actors, [`http`] with JSON over HTTP.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    CreateOrderRequest, CreateOrderResponse, PaymentReceipt, PaymentRequest, ProductId,
    StockLevel, SubjectId, VariantId,
};

pub mod http;
pub mod memory;

pub use http::*;
pub use memory::*;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Service answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// One batched availability lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub product_ids: Vec<ProductId>,
    pub variant_ids: Vec<VariantId>,
}

impl AvailabilityQuery {
    pub fn from_subjects<'a>(subjects: impl IntoIterator<Item = &'a SubjectId>) -> Self {
        let mut query = Self::default();
        for subject in subjects {
            match subject {
                SubjectId::Product(id) => query.product_ids.push(id.clone()),
                SubjectId::Variant(id) => query.variant_ids.push(id.clone()),
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty() && self.variant_ids.is_empty()
    }

    pub fn subjects(&self) -> impl Iterator<Item = SubjectId> + '_ {
        self.product_ids
            .iter()
            .cloned()
            .map(SubjectId::Product)
            .chain(self.variant_ids.iter().cloned().map(SubjectId::Variant))
    }
}

/// Authoritative stock levels. Answers may be partial; subjects missing from
/// the result are unknown, never available.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn get_availability(
        &self,
        query: AvailabilityQuery,
    ) -> Result<HashMap<SubjectId, StockLevel>, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates an order. Called at most once per checkout session.
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError>;
}

/// External payment rails. `Ok` is the completion callback, `Err` the error callback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, ServiceError>;
}
