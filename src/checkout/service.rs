use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use super::machine::{CheckoutInput, CheckoutMachine, CheckoutStep, SubmittedPhase};
use super::messages::{CheckoutRequest, SubmitOutcome};
use crate::availability::AvailabilityReport;
use crate::cart_actor::Cart;
use crate::clients::{CartClient, CheckoutClient};
use crate::domain::{
    CheckoutData, CheckoutPatch, CreateOrderRequest, CreatedOrder, OrderCharge, OrderId,
    PaymentMethod, PaymentReceipt, PaymentRequest,
};
use crate::error::CheckoutError;
use crate::pricing::CartTotals;
use crate::submitter::{build_payment_request, OrderSubmitter, Submission, SubmissionGuard, SubmissionLatch};

const EVENT_CAPACITY: usize = 32;

const AWAITING_PAYMENT: CheckoutStep = CheckoutStep::Submitted(SubmittedPhase::AwaitingPayment);

/// Everything a checkout page renders, republished after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    /// Token of the current checkout session. Bumped by every reset.
    pub session: u64,
    pub step: CheckoutStep,
    pub data: CheckoutData,
    pub totals: CartTotals,
    pub submitting: bool,
    pub checkout_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutEvent {
    StepChanged { from: CheckoutStep, to: CheckoutStep },
    PaymentStarted { order_id: OrderId },
    /// Sent once the order id is stored in the checkout data.
    OrderPlaced { order_id: OrderId, order_number: String },
    SubmissionFailed { error: CheckoutError },
    SessionReset { session: u64 },
}

/// Results of submission tasks, tagged with the session that started them.
enum SubmissionUpdate {
    OrderCreated {
        session: u64,
        result: Result<CreatedOrder, CheckoutError>,
        charge: OrderCharge,
        guard: SubmissionGuard,
    },
    PaymentFinished {
        session: u64,
        result: Result<PaymentReceipt, CheckoutError>,
        guard: SubmissionGuard,
    },
}

/// Owns one checkout session: the state machine, the checkout data and the
/// submission latch.
///
/// Network calls run in spawned tasks holding the latch guard; their results
/// come back through an internal channel and are dropped when the session was
/// reset in the meantime.
pub struct CheckoutService {
    receiver: mpsc::Receiver<CheckoutRequest>,
    updates: mpsc::UnboundedSender<SubmissionUpdate>,
    update_rx: mpsc::UnboundedReceiver<SubmissionUpdate>,
    cart_client: CartClient,
    cart: watch::Receiver<Cart>,
    availability: watch::Receiver<AvailabilityReport>,
    submitter: OrderSubmitter,
    machine: CheckoutMachine,
    data: CheckoutData,
    session: u64,
    latch: SubmissionLatch,
    /// An order may exist upstream without an id we know of.
    unconfirmed_order: bool,
    view: watch::Sender<CheckoutView>,
    events: broadcast::Sender<CheckoutEvent>,
    last_step: CheckoutStep,
}

impl CheckoutService {
    pub fn new(
        cart_client: CartClient,
        cart: watch::Receiver<Cart>,
        availability: watch::Receiver<AvailabilityReport>,
        submitter: OrderSubmitter,
        buffer_size: usize,
    ) -> (Self, CheckoutClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (updates, update_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (view, view_rx) = watch::channel(CheckoutView {
            session: 0,
            step: CheckoutStep::Cart,
            data: CheckoutData::default(),
            totals: cart.borrow().totals(),
            submitting: false,
            checkout_enabled: false,
        });

        let client = CheckoutClient::new(sender, view_rx, events.clone());
        let service = Self {
            receiver,
            updates,
            update_rx,
            cart_client,
            cart,
            availability,
            submitter,
            machine: CheckoutMachine::new(),
            data: CheckoutData::default(),
            session: 0,
            latch: SubmissionLatch::new(),
            unconfirmed_order: false,
            view,
            events,
            last_step: CheckoutStep::Cart,
        };
        (service, client)
    }

    /// Runs until every [`CheckoutClient`] is dropped.
    #[instrument(name = "checkout_service", skip(self), fields(cart_id = %self.cart_client.cart_id()))]
    pub async fn run(mut self) {
        info!("Checkout service starting");
        let mut cart_open = true;
        let mut availability_open = true;
        self.publish();

        loop {
            tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                Some(update) = self.update_rx.recv() => self.apply_update(update).await,
                changed = self.cart.changed(), if cart_open => match changed {
                    Ok(()) => self.on_cart_changed(),
                    Err(_) => {
                        debug!("Cart closed");
                        cart_open = false;
                    }
                },
                changed = self.availability.changed(), if availability_open => {
                    if changed.is_err() {
                        availability_open = false;
                    }
                }
            }
            self.publish();
        }

        info!("Checkout service stopped");
    }

    async fn handle(&mut self, request: CheckoutRequest) {
        match request {
            CheckoutRequest::Begin { respond_to } => {
                let _ = respond_to.send(self.begin());
            }
            CheckoutRequest::GetCheckoutData { respond_to } => {
                let _ = respond_to.send(Ok(self.data.clone()));
            }
            CheckoutRequest::UpdateCheckoutData { patch, respond_to } => {
                let _ = respond_to.send(self.update_checkout_data(patch));
            }
            CheckoutRequest::IsStep1Complete { respond_to } => {
                let _ = respond_to.send(Ok(self.data.is_step1_complete()));
            }
            CheckoutRequest::IsStep2Complete { respond_to } => {
                let _ = respond_to.send(Ok(self.data.is_step2_complete()));
            }
            CheckoutRequest::IsCheckoutEnabled { respond_to } => {
                let _ = respond_to.send(Ok(self.checkout_enabled()));
            }
            CheckoutRequest::Advance { respond_to } => {
                let _ = respond_to.send(self.fire(CheckoutInput::Advance));
            }
            CheckoutRequest::Back { respond_to } => {
                let _ = respond_to.send(self.fire(CheckoutInput::Back));
            }
            CheckoutRequest::Submit { respond_to } => {
                let _ = respond_to.send(self.submit());
            }
            CheckoutRequest::PaymentCompleted { receipt, respond_to } => {
                let _ = respond_to.send(self.payment_completed(receipt).await);
            }
            CheckoutRequest::PaymentFailed { reason, respond_to } => {
                let _ = respond_to.send(self.payment_failed(reason));
            }
            CheckoutRequest::Reset { respond_to } => {
                let _ = respond_to.send(Ok(self.reset("requested")));
            }
            CheckoutRequest::History { respond_to } => {
                let _ = respond_to.send(Ok(self.machine.history().to_vec()));
            }
        }
    }

    fn fire(&mut self, input: CheckoutInput) -> Result<CheckoutStep, CheckoutError> {
        let cart_is_empty = self.cart.borrow().is_empty();
        self.machine.fire(input, &self.data, cart_is_empty)
    }

    fn begin(&mut self) -> Result<CheckoutStep, CheckoutError> {
        match self.machine.step() {
            CheckoutStep::Cart => self.fire(CheckoutInput::Begin),
            step => Ok(step),
        }
    }

    fn update_checkout_data(&mut self, patch: CheckoutPatch) -> Result<CheckoutData, CheckoutError> {
        let step = self.machine.step();
        if !step.is_editable() {
            return Err(CheckoutError::InvalidTransition {
                from: step,
                action: "update checkout data",
            });
        }
        self.data.apply(patch)?;
        Ok(self.data.clone())
    }

    /// Submit is possible right now.
    fn checkout_enabled(&self) -> bool {
        if self.machine.step() != CheckoutStep::Payment || self.latch.is_held() || self.unconfirmed_order {
            return false;
        }
        let cart = self.cart.borrow();
        let availability = self.availability.borrow();
        self.submitter.prepare(&cart, &self.data, &availability).is_ok()
    }

    #[instrument(skip(self), fields(session = self.session))]
    fn submit(&mut self) -> Result<SubmitOutcome, CheckoutError> {
        let Some(guard) = self.latch.try_acquire() else {
            debug!("Submission already in flight");
            return Ok(SubmitOutcome::AlreadyInFlight);
        };

        let step = self.machine.step();
        if step != CheckoutStep::Payment {
            return Err(CheckoutError::InvalidTransition { from: step, action: "submit" });
        }
        if self.unconfirmed_order {
            return Err(CheckoutError::UnknownOrderResponse);
        }

        let prepared = {
            let cart = self.cart.borrow();
            let availability = self.availability.borrow();
            self.submitter.prepare(&cart, &self.data, &availability)
        };
        let submission = match prepared {
            Ok(submission) => submission,
            Err(error) => {
                if matches!(error, CheckoutError::AvailabilityConflict { .. }) {
                    warn!(%error, "Refusing submission");
                    self.data.set_payment_error(Some(error.user_message()));
                    self.emit(CheckoutEvent::SubmissionFailed { error: error.clone() });
                }
                return Err(error);
            }
        };

        self.fire(CheckoutInput::Submit)?;
        self.data.set_payment_error(None);
        match submission {
            Submission::NewOrder { request, charge } => self.spawn_order(request, charge, guard),
            Submission::ExistingOrder(request) => {
                self.data.set_payment_started(true);
                self.emit(CheckoutEvent::PaymentStarted {
                    order_id: request.order_id.clone(),
                });
                self.spawn_payment(request, guard);
            }
        }
        Ok(SubmitOutcome::Started)
    }

    fn spawn_order(&self, request: CreateOrderRequest, charge: OrderCharge, guard: SubmissionGuard) {
        let submitter = self.submitter.clone();
        let updates = self.updates.clone();
        let session = self.session;
        tokio::spawn(
            async move {
                let result = submitter.create_order(request).await;
                // A closed channel drops the update and with it the guard.
                let _ = updates.send(SubmissionUpdate::OrderCreated {
                    session,
                    result,
                    charge,
                    guard,
                });
            }
            .instrument(info_span!("order_submission", session)),
        );
    }

    fn spawn_payment(&self, request: PaymentRequest, guard: SubmissionGuard) {
        let submitter = self.submitter.clone();
        let updates = self.updates.clone();
        let session = self.session;
        tokio::spawn(
            async move {
                let result = submitter.process_payment(request).await;
                let _ = updates.send(SubmissionUpdate::PaymentFinished { session, result, guard });
            }
            .instrument(info_span!("payment_submission", session)),
        );
    }

    async fn apply_update(&mut self, update: SubmissionUpdate) {
        match update {
            SubmissionUpdate::OrderCreated {
                session,
                result,
                charge,
                guard,
            } => {
                if session != self.session {
                    warn!(
                        session,
                        current = self.session,
                        order_id = ?result.as_ref().ok().map(|order| order.id.clone()),
                        "Ignoring order result of a reset session"
                    );
                    return;
                }
                match result.and_then(|order| self.data.record_order(&order, charge).map(|()| order)) {
                    Ok(order) => self.order_created(order, guard).await,
                    Err(error) => {
                        if error == CheckoutError::UnknownOrderResponse {
                            self.unconfirmed_order = true;
                        }
                        self.fail_submission(error);
                    }
                }
            }
            SubmissionUpdate::PaymentFinished { session, result, guard: _guard } => {
                if session != self.session {
                    warn!(session, current = self.session, "Ignoring payment result of a reset session");
                    return;
                }
                if self.machine.step() != AWAITING_PAYMENT {
                    debug!(step = %self.machine.step(), "Payment already settled");
                    return;
                }
                let outcome = match result {
                    Ok(receipt) => self.complete_payment(receipt).await.map(|_| ()),
                    Err(error) => Err(error),
                };
                if let Err(error) = outcome {
                    self.fail_submission(error);
                }
            }
        }
    }

    async fn order_created(&mut self, order: CreatedOrder, guard: SubmissionGuard) {
        let online = self.data.payment_method.as_ref().is_some_and(PaymentMethod::is_online);
        if let Err(error) = self.fire(CheckoutInput::OrderCreated { online }) {
            error!(%error, order_id = %order.id, "Order created outside of a submission");
            return;
        }
        if !online {
            self.complete_order().await;
            return;
        }

        self.data.set_payment_started(true);
        self.emit(CheckoutEvent::PaymentStarted {
            order_id: order.id.clone(),
        });
        let request = match self.data.order_charge() {
            Some(charge) => build_payment_request(&order.id, charge, &self.data),
            None => Err(CheckoutError::PaymentFailure(format!(
                "no amount recorded for order {}",
                order.id
            ))),
        };
        match request {
            Ok(request) => self.spawn_payment(request, guard),
            Err(error) => self.fail_submission(error),
        }
    }

    async fn payment_completed(&mut self, receipt: PaymentReceipt) -> Result<CheckoutStep, CheckoutError> {
        let step = self.machine.step();
        if step != AWAITING_PAYMENT {
            return Err(CheckoutError::InvalidTransition {
                from: step,
                action: "complete payment",
            });
        }
        self.complete_payment(receipt).await
    }

    async fn complete_payment(&mut self, receipt: PaymentReceipt) -> Result<CheckoutStep, CheckoutError> {
        if self.data.order_id() != Some(&receipt.order_id) {
            warn!(receipt_order = %receipt.order_id, "Payment receipt names a different order");
            return Err(CheckoutError::PaymentFailure(format!(
                "receipt for order {} does not belong to this checkout",
                receipt.order_id
            )));
        }
        let step = self.fire(CheckoutInput::PaymentCompleted)?;
        info!(payment_id = %receipt.payment_id, "Payment completed");
        self.complete_order().await;
        Ok(step)
    }

    /// The order id stays; a new attempt only repeats the payment.
    fn payment_failed(&mut self, reason: String) -> Result<CheckoutStep, CheckoutError> {
        let step = self.machine.step();
        if step != AWAITING_PAYMENT {
            return Err(CheckoutError::InvalidTransition {
                from: step,
                action: "fail payment",
            });
        }
        self.fail_submission(CheckoutError::PaymentFailure(reason));
        Ok(self.machine.step())
    }

    async fn complete_order(&mut self) {
        let Some(order_id) = self.data.order_id().cloned() else {
            error!("Checkout succeeded without an order id");
            return;
        };
        let order_number = self.data.order_number().unwrap_or(order_id.as_str()).to_string();
        self.data.set_payment_error(None);
        self.publish();

        info!(%order_id, %order_number, "Order placed");
        self.emit(CheckoutEvent::OrderPlaced { order_id, order_number });

        if let Err(error) = self.cart_client.clear().await {
            warn!(%error, "Could not clear the cart after placing the order");
        }
    }

    fn fail_submission(&mut self, error: CheckoutError) {
        warn!(%error, "Submission failed");
        self.data.set_payment_error(Some(error.user_message()));
        self.data.set_payment_started(false);
        if let Err(transition) = self.fire(CheckoutInput::Fail) {
            error!(error = %transition, "Could not leave the submitted step");
        }
        self.emit(CheckoutEvent::SubmissionFailed { error });
    }

    /// Starts a fresh session. Results of tasks started before the reset are
    /// ignored when they arrive.
    fn reset(&mut self, reason: &'static str) -> u64 {
        self.session += 1;
        self.machine = CheckoutMachine::new();
        self.data = CheckoutData::default();
        self.latch = SubmissionLatch::new();
        self.unconfirmed_order = false;
        info!(session = self.session, reason, "Checkout session reset");
        self.emit(CheckoutEvent::SessionReset { session: self.session });
        self.session
    }

    fn on_cart_changed(&mut self) {
        let empty = self.cart.borrow_and_update().is_empty();
        let step = self.machine.step();
        let untouched = step == CheckoutStep::Cart && self.data == CheckoutData::default();
        if empty && step.is_editable() && !untouched {
            self.reset("cart emptied");
        }
    }

    fn emit(&self, event: CheckoutEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&mut self) {
        let step = self.machine.step();
        if step != self.last_step {
            self.emit(CheckoutEvent::StepChanged {
                from: self.last_step,
                to: step,
            });
            self.last_step = step;
        }

        let view = CheckoutView {
            session: self.session,
            step,
            data: self.data.clone(),
            totals: self.cart.borrow().totals(),
            submitting: self.latch.is_held(),
            checkout_enabled: self.checkout_enabled(),
        };
        self.view.send_if_modified(move |current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}
