//! Parties domain: the `Buyer` aggregate and its notifications.
//!
//! Pure domain logic (no IO, no storage).

pub mod buyer;

pub use buyer::{Address, Buyer, BuyerDetail, BuyerUpdated};
