use tokio::sync::oneshot;

use super::machine::{CheckoutStep, Transition};
use crate::domain::{CheckoutData, CheckoutPatch, PaymentReceipt};
use crate::error::CheckoutError;

pub type CheckoutResponse<T> = oneshot::Sender<Result<T, CheckoutError>>;

/// Answer to a submit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The submission task was started; its outcome arrives as a
    /// [`CheckoutEvent`](super::CheckoutEvent) and in the view.
    Started,
    /// Another submission of this session is still running. Nothing was sent.
    AlreadyInFlight,
}

#[derive(Debug)]
pub enum CheckoutRequest {
    Begin {
        respond_to: CheckoutResponse<CheckoutStep>,
    },
    GetCheckoutData {
        respond_to: CheckoutResponse<CheckoutData>,
    },
    UpdateCheckoutData {
        patch: CheckoutPatch,
        respond_to: CheckoutResponse<CheckoutData>,
    },
    IsStep1Complete {
        respond_to: CheckoutResponse<bool>,
    },
    IsStep2Complete {
        respond_to: CheckoutResponse<bool>,
    },
    IsCheckoutEnabled {
        respond_to: CheckoutResponse<bool>,
    },
    Advance {
        respond_to: CheckoutResponse<CheckoutStep>,
    },
    Back {
        respond_to: CheckoutResponse<CheckoutStep>,
    },
    Submit {
        respond_to: CheckoutResponse<SubmitOutcome>,
    },
    PaymentCompleted {
        receipt: PaymentReceipt,
        respond_to: CheckoutResponse<CheckoutStep>,
    },
    PaymentFailed {
        reason: String,
        respond_to: CheckoutResponse<CheckoutStep>,
    },
    Reset {
        respond_to: CheckoutResponse<u64>,
    },
    History {
        respond_to: CheckoutResponse<Vec<Transition>>,
    },
}
