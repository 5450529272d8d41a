//! Checkout: the step machine and the actor owning one checkout session.

mod machine;
mod messages;
mod service;

pub use machine::*;
pub use messages::*;
pub use service::*;
