use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mediary_core::Notification;

use crate::behavior::BoxedResponse;
use crate::envelope::RequestEnvelope;
use crate::error::{MediatorError, MediatorResult};
use crate::request::Request;

/// Handles one request type and produces its response.
///
/// `Cx` is the per-call scope the caller hands to `send` (in infra: the
/// persistence session, which is also the unit of work). Handlers reach their
/// repositories through it and call its save when they are done mutating.
///
/// Handlers must pass `ct` to every I/O they perform and return
/// [`MediatorError::Cancelled`] once it fires.
#[async_trait]
pub trait RequestHandler<R: Request, Cx>: Send + Sync {
    async fn handle(&self, request: R, cx: &Cx, ct: &CancellationToken)
    -> MediatorResult<R::Response>;
}

/// Handles one notification type. Any number of these may be registered per type.
#[async_trait]
pub trait NotificationHandler<N: Notification, Cx>: Send + Sync {
    async fn handle(&self, notification: &N, cx: &Cx, ct: &CancellationToken)
    -> MediatorResult<()>;
}

/// Registration-table view of a request handler with its request type erased.
#[async_trait]
pub(crate) trait ErasedRequestHandler<Cx>: Send + Sync {
    fn handler_type(&self) -> &'static str;

    async fn handle_erased(
        &self,
        request: RequestEnvelope,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse>;
}

/// Registration-table view of a notification handler with its type erased.
#[async_trait]
pub(crate) trait ErasedNotificationHandler<Cx>: Send + Sync {
    fn handler_type(&self) -> &'static str;

    async fn handle_erased(
        &self,
        notification: &dyn Notification,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<()>;
}

pub(crate) struct RequestHandlerEntry<R, H> {
    handler: H,
    _request: PhantomData<fn() -> R>,
}

impl<R, H> RequestHandlerEntry<R, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R, H, Cx> ErasedRequestHandler<Cx> for RequestHandlerEntry<R, H>
where
    R: Request,
    H: RequestHandler<R, Cx>,
    Cx: Send + Sync + 'static,
{
    fn handler_type(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    async fn handle_erased(
        &self,
        request: RequestEnvelope,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse> {
        let request = request.into_request::<R>()?;
        let response = self.handler.handle(request, cx, ct).await?;
        Ok(Box::new(response))
    }
}

pub(crate) struct NotificationHandlerEntry<N, H> {
    handler: H,
    _notification: PhantomData<fn(&N)>,
}

impl<N, H> NotificationHandlerEntry<N, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _notification: PhantomData,
        }
    }
}

#[async_trait]
impl<N, H, Cx> ErasedNotificationHandler<Cx> for NotificationHandlerEntry<N, H>
where
    N: Notification,
    H: NotificationHandler<N, Cx>,
    Cx: Send + Sync + 'static,
{
    fn handler_type(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    async fn handle_erased(
        &self,
        notification: &dyn Notification,
        cx: &Cx,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        let Some(typed) = notification.as_any().downcast_ref::<N>() else {
            return Err(MediatorError::PayloadMismatch {
                expected: std::any::type_name::<N>(),
                found: notification.notification_type(),
            });
        };
        self.handler.handle(typed, cx, ct).await
    }
}
