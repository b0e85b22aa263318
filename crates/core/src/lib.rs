//! `mediary-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identities, entities with their pending event queues, aggregate roots and
//! the domain error model.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use event::{AsAny, EventQueue, Notification, PendingEvent};
pub use id::EntityId;
pub use value_object::ValueObject;
