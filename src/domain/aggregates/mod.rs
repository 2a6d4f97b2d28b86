//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod customer;

pub use product::{Product, ProductDiscount, ProductError};
pub use order::{Order, OrderDetail, OrderError, OrderLine, OrderLineDetail, OrderStatus, OrderSummary, PaymentMethod, Transition};
pub use cart::{Cart, CartError, CartLine, PricedLine};
pub use customer::{ContactDetails, Customer};
