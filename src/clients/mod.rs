#[macro_use]
mod macros;

pub mod cart_client;
pub mod checkout_client;

pub use cart_client::CartClient;
pub use checkout_client::CheckoutClient;
