//! Cart-to-order pipeline of an online storefront.
//!
//! A [`StorefrontSystem`](app_system::StorefrontSystem) owns the cart actor
//! and the external collaborators. Each customer gets a
//! [`StorefrontSession`](app_system::StorefrontSession): a cart, a reconciler
//! keeping its stock information fresh and a checkout actor that turns the
//! cart into at most one order.

pub mod actor_framework;
pub mod app_system;
pub mod availability;
pub mod cart_actor;
pub mod checkout;
pub mod clients;
pub mod domain;
pub mod error;
pub mod pricing;
pub mod services;
pub mod submitter;

#[cfg(test)]
mod mock_framework;
#[cfg(test)]
mod integration_tests;
