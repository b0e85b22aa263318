//! Background jobs that drive the mediator from outside a request.

mod runner;

pub use runner::{JobConfig, JobHandle, JobStats, RecurringJob};
