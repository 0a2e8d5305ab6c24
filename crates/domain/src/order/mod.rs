//! Orders: the immutable purchase record, its status and its repository.

mod address;
mod aggregate;
mod service;
mod status;

pub use address::ShippingAddress;
pub use aggregate::{Order, OrderItem};
pub use service::{ORDERS, OrderPage, OrderService};
pub use status::OrderStatus;
