use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use super::settings::Settings;
use crate::actor_framework::{ResourceActor, ResourceClient};
use crate::availability::{
    forward_cart_demand, use_availability, AvailabilityHandle, AvailabilityReconciler, BadgeAvailability, Demand,
};
use crate::cart_actor::Cart;
use crate::checkout::CheckoutService;
use crate::clients::{CartClient, CheckoutClient};
use crate::domain::{CartId, ProductId, VariantId};
use crate::error::CartError;
use crate::pricing::PricingRules;
use crate::services::{
    http_client, HttpInventory, HttpOrderService, HttpPaymentProcessor, InventoryService, MemoryInventory,
    MemoryOrderService, OrderService, PaymentProcessor, ScriptedPaymentProcessor, ServiceError,
};
use crate::submitter::OrderSubmitter;

/// The external services a storefront talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InventoryService>,
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentProcessor>,
}

impl Collaborators {
    /// HTTP JSON adapters for the URLs in `settings.services`.
    pub fn http(settings: &Settings) -> Result<Self, ServiceError> {
        let services = &settings.services;
        let (Some(inventory), Some(orders), Some(payments)) = (
            services.inventory_url.as_deref(),
            services.orders_url.as_deref(),
            services.payments_url.as_deref(),
        ) else {
            return Err(ServiceError::Transport(
                "inventory, orders and payments URLs are all required".to_string(),
            ));
        };
        let client = http_client(services.timeout())?;
        Ok(Self {
            inventory: Arc::new(HttpInventory::new(client.clone(), inventory)),
            orders: Arc::new(HttpOrderService::new(client.clone(), orders)),
            payments: Arc::new(HttpPaymentProcessor::new(client, payments)),
        })
    }
}

/// In-memory collaborators, spawned as actors.
#[derive(Clone)]
pub struct MemoryBackend {
    pub inventory: MemoryInventory,
    pub orders: MemoryOrderService,
    pub payments: ScriptedPaymentProcessor,
}

impl MemoryBackend {
    /// Payments are approved, or declined with `decline_reason`.
    pub fn spawn(buffer_size: usize, decline_reason: Option<String>) -> (Self, Vec<JoinHandle<()>>) {
        let (inventory, inventory_handle) = MemoryInventory::spawn(buffer_size);
        let (orders, orders_handle) = MemoryOrderService::spawn(buffer_size, inventory.clone());
        let payments = match decline_reason {
            Some(reason) => ScriptedPaymentProcessor::declining(reason),
            None => ScriptedPaymentProcessor::approving(),
        }
        .with_order_book(orders.clone());

        let backend = Self {
            inventory,
            orders,
            payments,
        };
        (backend, vec![inventory_handle, orders_handle])
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            inventory: Arc::new(self.inventory.clone()),
            orders: Arc::new(self.orders.clone()),
            payments: Arc::new(self.payments.clone()),
        }
    }
}

/// Starts the shared actors and opens checkout sessions against them.
pub struct StorefrontSystem {
    settings: Settings,
    rules: Arc<PricingRules>,
    carts: ResourceClient<Cart>,
    collaborators: Collaborators,
    submitter: OrderSubmitter,
    handles: Vec<JoinHandle<()>>,
}

impl StorefrontSystem {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let cart_id_counter = Arc::new(AtomicU64::new(1));
        let next_cart_id = move || {
            let id = cart_id_counter.fetch_add(1, Ordering::SeqCst);
            CartId::new(format!("cart_{}", id))
        };
        let (cart_actor, carts) = ResourceActor::<Cart>::new(settings.actors.mailbox_size, next_cart_id);
        let cart_handle = tokio::spawn(cart_actor.run());

        let submitter = OrderSubmitter::new(
            Arc::clone(&collaborators.orders),
            Arc::clone(&collaborators.payments),
        );
        Self {
            rules: Arc::new(settings.pricing.clone()),
            settings,
            carts,
            collaborators,
            submitter,
            handles: vec![cart_handle],
        }
    }

    /// A system backed by [`MemoryBackend`]. Its actors stop once the system
    /// is shut down and the returned backend is dropped.
    pub fn in_memory(settings: Settings, decline_reason: Option<String>) -> (Self, MemoryBackend) {
        let (backend, handles) = MemoryBackend::spawn(settings.actors.mailbox_size, decline_reason);
        let mut system = Self::new(settings, backend.collaborators());
        system.handles.extend(handles);
        (system, backend)
    }

    /// A system talking to the HTTP services configured in `settings`.
    pub fn with_http(settings: Settings) -> Result<Self, ServiceError> {
        let collaborators = Collaborators::http(&settings)?;
        Ok(Self::new(settings, collaborators))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens a cart with its own availability reconciler and checkout actor.
    #[instrument(skip(self))]
    pub async fn open_session(&self) -> Result<StorefrontSession, CartError> {
        let mailbox = self.settings.actors.mailbox_size;
        let cart = CartClient::open(self.carts.clone(), Arc::clone(&self.rules)).await?;
        let cart_rx = cart.watch().await?;

        let (demand_tx, demand_rx) = watch::channel(Demand::from_cart(&cart_rx.borrow()));
        let forwarder = tokio::spawn(forward_cart_demand(cart_rx.clone(), demand_tx));

        let (reconciler, availability) = AvailabilityReconciler::new(
            Arc::clone(&self.collaborators.inventory),
            demand_rx,
            self.settings.availability.cart_interval(),
            mailbox,
        );
        let reconciler_handle = tokio::spawn(reconciler.run());

        let (service, checkout) = CheckoutService::new(
            cart.clone(),
            cart_rx,
            availability.watch(),
            self.submitter.clone(),
            mailbox,
        );
        let checkout_handle = tokio::spawn(service.run());

        info!(cart_id = %cart.cart_id(), "Storefront session opened");
        Ok(StorefrontSession {
            cart,
            checkout,
            availability,
            handles: vec![forwarder, reconciler_handle, checkout_handle],
        })
    }

    /// Availability badges for a product listing, refreshed on the badge interval.
    pub fn badges(&self, product_ids: &[ProductId], variant_ids: &[VariantId]) -> BadgeAvailability {
        use_availability(
            Arc::clone(&self.collaborators.inventory),
            product_ids,
            variant_ids,
            self.settings.availability.badge_interval(),
        )
    }

    /// Stops the shared actors. Sessions must be closed, and any
    /// [`MemoryBackend`] or badge handles dropped, before this returns.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down storefront...");
        // The cart actor stops once its last client is gone.
        drop(self.carts);
        drop(self.submitter);
        drop(self.collaborators);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Actor task failed: {:?}", e);
                return Err(format!("Actor task failed: {:?}", e));
            }
        }

        info!("Storefront shutdown complete.");
        Ok(())
    }
}

/// One customer's cart and checkout. Passed explicitly to whatever drives
/// the UI; nothing about a session is global.
pub struct StorefrontSession {
    pub cart: CartClient,
    pub checkout: CheckoutClient,
    pub availability: AvailabilityHandle,
    handles: Vec<JoinHandle<()>>,
}

impl StorefrontSession {
    /// Deletes the cart and waits for the session's tasks to stop. Clones of
    /// the session's clients must be dropped first.
    #[instrument(skip(self), fields(cart_id = %self.cart.cart_id()))]
    pub async fn close(self) -> Result<(), String> {
        let Self {
            cart,
            checkout,
            availability,
            handles,
        } = self;

        if let Err(e) = cart.delete().await {
            error!(error = %e, "Could not delete the cart");
        }
        drop(checkout);
        drop(availability);
        drop(cart);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Session task failed: {:?}", e);
                return Err(format!("Session task failed: {:?}", e));
            }
        }
        info!("Storefront session closed");
        Ok(())
    }
}
