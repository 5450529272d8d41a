//! JSON-over-HTTP adapters for the external services.
//!
//! Wire shapes:
//! - `POST {inventory}/availability` with `{productIds, variantIds}`, answered by
//!   `{products: {id: level}, variants: {id: level}}`
//! - `POST {orders}/orders` with a [`CreateOrderRequest`], answered by a [`CreateOrderResponse`]
//! - `POST {payments}/payments` with a [`PaymentRequest`], answered by `{paymentId, status, message}`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{AvailabilityQuery, InventoryService, OrderService, PaymentProcessor, ServiceError};
use crate::domain::{
    CreateOrderRequest, CreateOrderResponse, PaymentReceipt, PaymentRequest, ProductId,
    StockLevel, SubjectId, VariantId,
};

/// Builds the shared HTTP client. Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

async fn post_json<B, R>(client: &reqwest::Client, url: &str, body: &B) -> Result<R, ServiceError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    debug!(%url, "Sending request");
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ServiceError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(%url, status = status.as_u16(), "Service answered with an error status");
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ServiceError::Decode(e.to_string()))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityBody<'a> {
    product_ids: &'a [ProductId],
    variant_ids: &'a [VariantId],
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AvailabilityReply {
    products: HashMap<ProductId, StockLevel>,
    variants: HashMap<VariantId, StockLevel>,
}

#[derive(Clone)]
pub struct HttpInventory {
    client: reqwest::Client,
    url: String,
}

impl HttpInventory {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "availability"),
        }
    }
}

#[async_trait]
impl InventoryService for HttpInventory {
    #[instrument(name = "http_inventory", skip(self))]
    async fn get_availability(
        &self,
        query: AvailabilityQuery,
    ) -> Result<HashMap<SubjectId, StockLevel>, ServiceError> {
        let body = AvailabilityBody {
            product_ids: &query.product_ids,
            variant_ids: &query.variant_ids,
        };
        let reply: AvailabilityReply = post_json(&self.client, &self.url, &body).await?;

        Ok(reply
            .products
            .into_iter()
            .map(|(id, level)| (SubjectId::Product(id), level))
            .chain(reply.variants.into_iter().map(|(id, level)| (SubjectId::Variant(id), level)))
            .collect())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Clone)]
pub struct HttpOrderService {
    client: reqwest::Client,
    url: String,
}

impl HttpOrderService {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "orders"),
        }
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    #[instrument(name = "http_order_service", skip(self, request), fields(items = request.items.len()))]
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        post_json(&self.client, &self.url, &request).await
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PaymentReply {
    payment_id: Option<String>,
    status: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    url: String,
}

impl HttpPaymentProcessor {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "payments"),
        }
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    #[instrument(name = "http_payment", skip(self, request), fields(order_id = %request.order_id))]
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, ServiceError> {
        let reply: PaymentReply = post_json(&self.client, &self.url, &request).await?;

        let declined = reply
            .status
            .as_deref()
            .is_some_and(|status| matches!(status.to_ascii_uppercase().as_str(), "FAILED" | "DECLINED"));
        match reply.payment_id {
            Some(payment_id) if !declined => Ok(PaymentReceipt {
                order_id: request.order_id,
                payment_id,
            }),
            _ => Err(ServiceError::Rejected(
                reply.message.unwrap_or_else(|| "Payment was not completed".to_string()),
            )),
        }
    }
}
