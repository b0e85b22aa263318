use std::any::Any;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MediatorError;
use crate::request::Request;

/// Envelope for a request travelling through the behavior chain.
///
/// This is the unit every behavior receives and forwards to `next`.
///
/// Notes:
/// - `request_id` is time-ordered (UUIDv7) and correlates the log lines of one `send`.
/// - The payload is type-erased; behaviors that care about a specific request
///   type use [`RequestEnvelope::downcast_ref`].
/// - Behaviors must forward the envelope unchanged.
#[derive(Debug)]
pub struct RequestEnvelope {
    request_id: Uuid,
    request_type: &'static str,
    received_at: DateTime<Utc>,

    payload: Box<dyn Any + Send + Sync>,
}

impl RequestEnvelope {
    pub fn new<R: Request>(request: R) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            request_type: R::request_type(),
            received_at: Utc::now(),
            payload: Box::new(request),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Borrow the payload if it is an `R`.
    pub fn downcast_ref<R: Request>(&self) -> Option<&R> {
        self.payload.downcast_ref::<R>()
    }

    /// Take the payload back out as an `R` (used by the terminal handler).
    pub fn into_request<R: Request>(self) -> Result<R, MediatorError> {
        let found = self.request_type;
        self.payload
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| MediatorError::PayloadMismatch {
                expected: R::request_type(),
                found,
            })
    }
}
