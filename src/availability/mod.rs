//! Availability Reconciler: a mirror of external stock for the subjects a
//! cart (or a product listing) references, refreshed on a timer and on demand.

mod demand;
mod reconciler;
mod report;

pub use demand::*;
pub use reconciler::*;
pub use report::*;
