//! Pipeline behaviors: ordered decorators around the terminal request handler.
//!
//! Behaviors compose like nested scopes. With `B1` registered before `B2`,
//! a `send` runs `B1`-before, `B2`-before, the handler, `B2`-after, `B1`-after.
//! A behavior only ever talks to the rest of the pipeline through [`Next`].

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::envelope::RequestEnvelope;
use crate::error::{MediatorError, MediatorResult};
use crate::handler::ErasedRequestHandler;

/// Handler response with its type erased while it travels back up the chain.
pub type BoxedResponse = Box<dyn Any + Send>;

/// Cross-cutting decorator applied to every request.
///
/// Implementations must:
/// - forward the envelope to `next` unchanged (or fail without calling it)
/// - return the inner error unchanged, or wrap it without losing the cause
/// - release anything they acquired on every exit path, including cancellation
#[async_trait]
pub trait PipelineBehavior<Cx>: Send + Sync {
    async fn handle(
        &self,
        request: RequestEnvelope,
        cx: &Cx,
        next: Next<'_, Cx>,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse>;
}

/// Continuation: the remaining behaviors plus the terminal handler.
///
/// Consumed by [`Next::run`], so a behavior can invoke the rest of the chain
/// at most once.
pub struct Next<'a, Cx> {
    behaviors: &'a [Arc<dyn PipelineBehavior<Cx>>],
    handler: &'a dyn ErasedRequestHandler<Cx>,
    cx: &'a Cx,
}

impl<'a, Cx> Next<'a, Cx>
where
    Cx: Send + Sync + 'static,
{
    pub(crate) fn new(
        behaviors: &'a [Arc<dyn PipelineBehavior<Cx>>],
        handler: &'a dyn ErasedRequestHandler<Cx>,
        cx: &'a Cx,
    ) -> Self {
        Self {
            behaviors,
            handler,
            cx,
        }
    }

    /// Run the rest of the chain.
    pub async fn run(
        self,
        request: RequestEnvelope,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse> {
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }

        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                let next = Next::new(rest, self.handler, self.cx);
                behavior.handle(request, self.cx, next, ct).await
            }
            None => self.handler.handle_erased(request, self.cx, ct).await,
        }
    }
}

/// Forwards to `next` unchanged.
///
/// No side effect and no failure mode of its own; useful to check that the
/// chain composes when several decorators wrap the same handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughBehavior;

#[async_trait]
impl<Cx> PipelineBehavior<Cx> for PassThroughBehavior
where
    Cx: Send + Sync + 'static,
{
    async fn handle(
        &self,
        request: RequestEnvelope,
        _cx: &Cx,
        next: Next<'_, Cx>,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse> {
        next.run(request, ct).await
    }
}
