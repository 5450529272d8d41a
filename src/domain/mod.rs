//! Plain domain data, free of actor and transport concerns.

pub mod address;
pub mod availability;
pub mod cart;
pub mod checkout;
pub mod money;
pub mod order;

pub use address::*;
pub use availability::*;
pub use cart::*;
pub use checkout::*;
pub use money::*;
pub use order::*;
