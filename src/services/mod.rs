//! Application services sitting between the HTTP layer and the store.

pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod lifecycle;

pub use catalog::DiscountCatalog;
pub use checkout::{Checkout, PlacedOrder};
pub use customers::Customers;
pub use lifecycle::Lifecycle;
