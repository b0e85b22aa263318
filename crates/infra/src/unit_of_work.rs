use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mediary_events::MediatorResult;

/// Save boundary handed to handlers.
///
/// `save` runs, in order:
///
/// 1. scan tracked aggregates (first-tracked first; root, then owned entities)
/// 2. collect their queued events into one ordered list
/// 3. clear every scanned queue
/// 4. publish the collected events through the mediator
/// 5. persist all tracked aggregates
///
/// Steps 4 and 5 swap under [`PublishPolicy::PersistThenPublish`](crate::PublishPolicy).
/// A notification handler may call `save` again from step 4; that nested
/// call finishes its own five steps before the outer one continues, so
/// writes land innermost first.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn save(&self, ct: &CancellationToken) -> MediatorResult<()>;
}
