//! Flower-shop order backend
//!
//! Order placement with row-locked stock reservation, a tiered discount
//! engine and the payment lifecycle for cash, bank transfer and PayPal orders.
//!
//! ## Layout
//! - [`domain`] pure types: cart, order state machine, discount resolver
//! - [`store`] persistence behind the [`store::Store`] trait (Postgres and in-memory)
//! - [`services`] checkout, lifecycle, discount catalog and customers
//! - [`api`] axum routes

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod proof;
pub mod publisher;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{ShopError, ShopResult};
