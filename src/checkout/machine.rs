//! Checkout State Machine: steps, guarded transitions and their history.
//!
//! The machine is pure. It owns no data; guards read the [`CheckoutData`] and
//! the cart state passed in with each input.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::domain::CheckoutData;
use crate::error::CheckoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmittedPhase {
    CreatingOrder,
    /// Order created for an online method; waiting for the payment processor.
    AwaitingPayment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "step", content = "phase", rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Cart,
    Information,
    Payment,
    Submitted(SubmittedPhase),
    Success,
    /// Transient: recorded in the history, then immediately left for `Payment`.
    Failed,
}

impl CheckoutStep {
    /// The customer can still edit the cart and the checkout forms.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Cart | Self::Information | Self::Payment)
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cart => f.write_str("cart"),
            Self::Information => f.write_str("information"),
            Self::Payment => f.write_str("payment"),
            Self::Submitted(SubmittedPhase::CreatingOrder) => f.write_str("submitted/creating-order"),
            Self::Submitted(SubmittedPhase::AwaitingPayment) => f.write_str("submitted/awaiting-payment"),
            Self::Success => f.write_str("success"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutInput {
    Begin,
    Advance,
    Back,
    Submit,
    OrderCreated { online: bool },
    PaymentCompleted,
    Fail,
}

impl CheckoutInput {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Advance => "advance",
            Self::Back => "go back",
            Self::Submit => "submit",
            Self::OrderCreated { .. } => "record order",
            Self::PaymentCompleted => "complete payment",
            Self::Fail => "fail submission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: CheckoutStep,
    pub to: CheckoutStep,
    pub input: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutMachine {
    step: CheckoutStep,
    history: Vec<Transition>,
}

impl CheckoutMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Applies one input. On error the step is unchanged.
    ///
    /// `Submit` goes straight to awaiting payment when the checkout already
    /// holds an order id. `Fail` passes through `Failed` back to `Payment`.
    pub fn fire(
        &mut self,
        input: CheckoutInput,
        data: &CheckoutData,
        cart_is_empty: bool,
    ) -> Result<CheckoutStep, CheckoutError> {
        use CheckoutInput as In;
        use CheckoutStep as S;

        let next = match (self.step, input) {
            (S::Cart, In::Begin | In::Advance) => {
                if cart_is_empty {
                    return Err(CheckoutError::EmptyCart);
                }
                S::Information
            }
            (S::Information, In::Advance) => {
                let fields = data.missing_step1_fields();
                if !fields.is_empty() {
                    return Err(CheckoutError::Validation { fields });
                }
                S::Payment
            }
            (S::Information, In::Back) => S::Cart,
            (S::Payment, In::Back) => S::Information,
            (S::Payment, In::Submit) => {
                let mut fields = data.missing_step1_fields();
                fields.extend(data.missing_step2_fields());
                if !fields.is_empty() {
                    return Err(CheckoutError::Validation { fields });
                }
                if cart_is_empty {
                    return Err(CheckoutError::EmptyCart);
                }
                match data.order_id() {
                    Some(_) => S::Submitted(SubmittedPhase::AwaitingPayment),
                    None => S::Submitted(SubmittedPhase::CreatingOrder),
                }
            }
            (S::Submitted(SubmittedPhase::CreatingOrder), In::OrderCreated { online: false }) => S::Success,
            (S::Submitted(SubmittedPhase::CreatingOrder), In::OrderCreated { online: true }) => {
                S::Submitted(SubmittedPhase::AwaitingPayment)
            }
            (S::Submitted(SubmittedPhase::AwaitingPayment), In::PaymentCompleted) => S::Success,
            (S::Submitted(_), In::Fail) => {
                self.record(S::Failed, input);
                S::Payment
            }
            (from, input) => {
                return Err(CheckoutError::InvalidTransition {
                    from,
                    action: input.name(),
                })
            }
        };

        self.record(next, input);
        Ok(next)
    }

    fn record(&mut self, to: CheckoutStep, input: CheckoutInput) {
        let from = self.step;
        info!(%from, %to, input = input.name(), "Checkout transition");
        self.history.push(Transition {
            from,
            to,
            input: input.name(),
        });
        self.step = to;
    }
}
