//! Cart Store: the cart entity and the mutations its actor accepts.

mod actions;
pub mod entity;

pub use actions::*;
pub use entity::*;
