//! Ordering handlers: one request mutates an order, its notification
//! mutates a buyer, whose notification mutates another buyer.
//!
//! `work` holds the background job's request, which publishes its
//! notification directly instead of queueing it on an aggregate.

mod notifications;
mod requests;
mod work;

pub use notifications::{BuyerUpdatedHandler, OrderCreatedHandler};
pub use requests::{AcknowledgeOrderHandler, CreateOrderHandler, PlaceOrderHandler};
pub use work::{DoWork, DoWorkHandler, WorkDone, WorkDoneHandler};
