//! Infrastructure layer: persistence session, unit of work, pipeline
//! behaviors, the ordering handlers and the background job runner.

pub mod behaviors;
pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod jobs;
pub mod repository;
pub mod session;
pub mod store;
pub mod tracked;
pub mod unit_of_work;

pub use behaviors::{TransactionBehavior, TransactionCounts, TransactionGuard, TransactionStats};
pub use bootstrap::{OrderingPipeline, register_ordering, seed_demo_data};
pub use config::{ConfigError, HandlerConfig, PublishPolicy, UnitOfWorkConfig};
pub use jobs::{JobConfig, JobHandle, JobStats, RecurringJob};
pub use repository::Repository;
pub use session::{Session, SessionFactory};
pub use store::{Database, InMemoryDatabase, Record, RecordKey, StoreError, WriteBatch};
pub use tracked::Tracked;
pub use unit_of_work::UnitOfWork;
