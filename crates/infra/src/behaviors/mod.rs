//! Pipeline behaviors bound to the persistence session.

mod transaction;

pub use mediary_events::PassThroughBehavior;
pub use transaction::{TransactionBehavior, TransactionCounts, TransactionGuard, TransactionStats};
