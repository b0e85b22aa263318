//! `mediary-events`: in-process request/notification dispatch.
//!
//! A [`Mediator`] routes each [`Request`] to exactly one handler through the
//! registered [`PipelineBehavior`] chain, and fans each [`Notification`] out to
//! every handler registered for its type. The table is built once at startup
//! by [`MediatorBuilder`] and is immutable afterwards.

pub mod behavior;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod mediator;
pub mod request;

pub use behavior::{BoxedResponse, Next, PassThroughBehavior, PipelineBehavior};
pub use envelope::RequestEnvelope;
pub use error::{MediatorError, MediatorResult};
pub use handler::{NotificationHandler, RequestHandler};
pub use mediator::{Mediator, MediatorBuilder};
pub use request::Request;

pub use mediary_core::Notification;
pub use tokio_util::sync::CancellationToken;
