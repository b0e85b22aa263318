//! Request/notification dispatcher.
//!
//! ## Dispatch Flow
//!
//! ```text
//! send(request)
//!   ↓
//! 1. Resolve exactly one handler for the request type (else NoHandlerFound)
//!   ↓
//! 2. Wrap the request in a RequestEnvelope
//!   ↓
//! 3. Run the behavior chain (first registered = outermost)
//!   ↓
//! 4. Terminal handler → typed response
//!
//! publish(notification)
//!   ↓
//! every handler registered for the type, in registration order;
//! a failure does not stop the others, the first error is returned
//! ```
//!
//! The registration table is built once by [`MediatorBuilder`] and shared
//! read-only (`Arc`) afterwards; cloning a [`Mediator`] is cheap.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

use mediary_core::Notification;

use crate::behavior::{Next, PipelineBehavior};
use crate::envelope::RequestEnvelope;
use crate::error::{MediatorError, MediatorResult};
use crate::handler::{
    ErasedNotificationHandler, ErasedRequestHandler, NotificationHandler,
    NotificationHandlerEntry, RequestHandler, RequestHandlerEntry,
};
use crate::request::Request;

type RequestHandlers<Cx> = HashMap<TypeId, Vec<Arc<dyn ErasedRequestHandler<Cx>>>>;
type NotificationHandlers<Cx> = HashMap<TypeId, Vec<Arc<dyn ErasedNotificationHandler<Cx>>>>;

struct Registry<Cx> {
    requests: RequestHandlers<Cx>,
    notifications: NotificationHandlers<Cx>,
    behaviors: Vec<Arc<dyn PipelineBehavior<Cx>>>,
}

/// Startup-time registration of handlers and behaviors.
///
/// Consumed by [`MediatorBuilder::build`]; there is no way to register
/// anything on a built [`Mediator`].
pub struct MediatorBuilder<Cx> {
    registry: Registry<Cx>,
}

impl<Cx> Default for MediatorBuilder<Cx> {
    fn default() -> Self {
        Self {
            registry: Registry {
                requests: HashMap::new(),
                notifications: HashMap::new(),
                behaviors: Vec::new(),
            },
        }
    }
}

impl<Cx> MediatorBuilder<Cx>
where
    Cx: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `R`.
    ///
    /// Registering a second handler for the same request type is accepted
    /// here; `send` then fails with `NoHandlerFound` for that type.
    pub fn register_handler<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R, Cx> + 'static,
    {
        self.registry
            .requests
            .entry(TypeId::of::<R>())
            .or_default()
            .push(Arc::new(RequestHandlerEntry::<R, H>::new(handler)));
        self
    }

    /// Add a handler for `N`; handlers run in registration order.
    pub fn register_notification_handler<N, H>(&mut self, handler: H) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N, Cx> + 'static,
    {
        self.registry
            .notifications
            .entry(TypeId::of::<N>())
            .or_default()
            .push(Arc::new(NotificationHandlerEntry::<N, H>::new(handler)));
        self
    }

    /// Append a behavior; the first one registered is the outermost wrapper.
    pub fn register_behavior<B>(&mut self, behavior: B) -> &mut Self
    where
        B: PipelineBehavior<Cx> + 'static,
    {
        self.registry.behaviors.push(Arc::new(behavior));
        self
    }

    pub fn build(self) -> Mediator<Cx> {
        let registry = self.registry;
        debug!(
            request_types = registry.requests.len(),
            notification_types = registry.notifications.len(),
            behaviors = registry.behaviors.len(),
            "mediator built"
        );
        Mediator {
            registry: Arc::new(registry),
        }
    }
}

/// Immutable, shareable dispatcher.
///
/// `Cx` is the per-call scope handed to every behavior and handler (the
/// infra layer uses its persistence session). The mediator itself holds no
/// per-call state, so one instance serves concurrent `send`s that each bring
/// their own scope.
pub struct Mediator<Cx> {
    registry: Arc<Registry<Cx>>,
}

impl<Cx> Clone for Mediator<Cx> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<Cx> core::fmt::Debug for Mediator<Cx> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mediator")
            .field("request_types", &self.registry.requests.len())
            .field("notification_types", &self.registry.notifications.len())
            .field("behaviors", &self.registry.behaviors.len())
            .finish()
    }
}

impl<Cx> Mediator<Cx>
where
    Cx: Send + Sync + 'static,
{
    pub fn builder() -> MediatorBuilder<Cx> {
        MediatorBuilder::new()
    }

    /// Send a request to its single handler through the behavior chain.
    ///
    /// Fails with `NoHandlerFound` (without running anything) unless exactly
    /// one handler is registered for `R`. The handler's error is returned
    /// unchanged.
    pub async fn send<R: Request>(
        &self,
        request: R,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<R::Response> {
        let request_type = R::request_type();
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }

        let handler = match self
            .registry
            .requests
            .get(&TypeId::of::<R>())
            .map(Vec::as_slice)
        {
            Some([handler]) => handler,
            other => {
                let registered = other.map_or(0, <[_]>::len);
                warn!(request = request_type, registered, "no unique request handler");
                return Err(MediatorError::NoHandlerFound {
                    request: request_type,
                    registered,
                });
            }
        };

        let envelope = RequestEnvelope::new(request);
        let span = debug_span!(
            "send",
            request = request_type,
            request_id = %envelope.request_id(),
        );
        debug!(
            parent: &span,
            handler = handler.handler_type(),
            behaviors = self.registry.behaviors.len(),
            "dispatching request"
        );

        let next = Next::new(&self.registry.behaviors, handler.as_ref(), cx);
        let response = next.run(envelope, ct).instrument(span).await;

        match response {
            Ok(boxed) => boxed
                .downcast::<R::Response>()
                .map(|response| *response)
                .map_err(|_| MediatorError::ResponseTypeMismatch {
                    request: request_type,
                }),
            Err(err) => {
                debug!(request = request_type, error = %err, "request failed");
                Err(err)
            }
        }
    }

    /// Publish a notification to every handler registered for `N`.
    pub async fn publish<N: Notification>(
        &self,
        notification: &N,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        self.publish_dyn(notification, cx, ct).await
    }

    /// Type-erased [`publish`](Self::publish), used for queued events.
    ///
    /// Zero handlers is a no-op. A failing handler does not prevent the
    /// remaining handlers from running; the first error is returned once all
    /// have run. Cancellation stops the fan-out before the next handler.
    pub async fn publish_dyn(
        &self,
        notification: &dyn Notification,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }

        let notification_type = notification.notification_type();
        let handlers = self
            .registry
            .notifications
            .get(&notification.as_any().type_id())
            .map(Vec::as_slice)
            .unwrap_or_default();
        debug!(
            notification = notification_type,
            handlers = handlers.len(),
            "publishing notification"
        );

        let mut first_error = None;
        for handler in handlers {
            if ct.is_cancelled() {
                first_error.get_or_insert(MediatorError::Cancelled);
                break;
            }
            if let Err(err) = handler.handle_erased(notification, cx, ct).await {
                warn!(
                    notification = notification_type,
                    handler = handler.handler_type(),
                    error = %err,
                    "notification handler failed"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether `send::<R>` would find exactly one handler.
    pub fn has_request_handler<R: Request>(&self) -> bool {
        self.registry
            .requests
            .get(&TypeId::of::<R>())
            .is_some_and(|handlers| handlers.len() == 1)
    }

    pub fn notification_handler_count<N: Notification>(&self) -> usize {
        self.registry
            .notifications
            .get(&TypeId::of::<N>())
            .map_or(0, Vec::len)
    }

    pub fn behavior_count(&self) -> usize {
        self.registry.behaviors.len()
    }
}
