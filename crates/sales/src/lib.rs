//! Sales domain: the `Order` aggregate, its notifications and the requests
//! that drive it.
//!
//! Pure domain logic (no IO, no storage). Persistence and dispatch live in
//! `mediary-infra`.

pub mod order;

pub use order::{AcknowledgeOrder, CreateOrder, Order, OrderCreated, OrderDetail, PlaceOrder};
