use tokio::sync::{broadcast, mpsc, watch};

use crate::checkout::{
    CheckoutEvent, CheckoutRequest, CheckoutStep, CheckoutView, SubmitOutcome, Transition,
};
use crate::domain::{CheckoutData, CheckoutPatch, PaymentReceipt};
use crate::error::CheckoutError;

/// Client for a running [`CheckoutService`](crate::checkout::CheckoutService).
#[derive(Debug, Clone)]
pub struct CheckoutClient {
    sender: mpsc::Sender<CheckoutRequest>,
    view: watch::Receiver<CheckoutView>,
    events: broadcast::Sender<CheckoutEvent>,
}

impl CheckoutClient {
    pub(crate) fn new(
        sender: mpsc::Sender<CheckoutRequest>,
        view: watch::Receiver<CheckoutView>,
        events: broadcast::Sender<CheckoutEvent>,
    ) -> Self {
        Self { sender, view, events }
    }

    /// The latest published view.
    pub fn view(&self) -> CheckoutView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<CheckoutView> {
        self.view.clone()
    }

    /// Events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.events.subscribe()
    }
}

client_method!(CheckoutClient => fn begin() -> CheckoutStep as CheckoutRequest::Begin, Error = CheckoutError);
client_method!(CheckoutClient => fn checkout_data() -> CheckoutData as CheckoutRequest::GetCheckoutData, Error = CheckoutError);
client_method!(CheckoutClient => fn update_checkout_data(patch: CheckoutPatch) -> CheckoutData as CheckoutRequest::UpdateCheckoutData, Error = CheckoutError);
client_method!(CheckoutClient => fn is_step1_complete() -> bool as CheckoutRequest::IsStep1Complete, Error = CheckoutError);
client_method!(CheckoutClient => fn is_step2_complete() -> bool as CheckoutRequest::IsStep2Complete, Error = CheckoutError);
client_method!(CheckoutClient => fn is_checkout_enabled() -> bool as CheckoutRequest::IsCheckoutEnabled, Error = CheckoutError);
client_method!(CheckoutClient => fn advance() -> CheckoutStep as CheckoutRequest::Advance, Error = CheckoutError);
client_method!(CheckoutClient => fn back() -> CheckoutStep as CheckoutRequest::Back, Error = CheckoutError);
client_method!(CheckoutClient => fn submit() -> SubmitOutcome as CheckoutRequest::Submit, Error = CheckoutError);
client_method!(CheckoutClient => fn payment_completed(receipt: PaymentReceipt) -> CheckoutStep as CheckoutRequest::PaymentCompleted, Error = CheckoutError);
client_method!(CheckoutClient => fn payment_failed(reason: String) -> CheckoutStep as CheckoutRequest::PaymentFailed, Error = CheckoutError);
client_method!(CheckoutClient => fn reset() -> u64 as CheckoutRequest::Reset, Error = CheckoutError);
client_method!(CheckoutClient => fn history() -> Vec<Transition> as CheckoutRequest::History, Error = CheckoutError);
