//! Aggregate root trait: the consistency boundary that repositories load and save.

use crate::entity::Entity;
use crate::event::PendingEvent;

/// Aggregate root marker + traversal of the entities it owns.
///
/// Ownership is a strict tree: the root exclusively owns its detail entities
/// (and each entity its own event queue). Details never point back at the
/// root, so collecting events is a plain walk over `owned_entities`.
pub trait AggregateRoot: Entity {
    /// Stable aggregate type identifier (e.g. "sales.order").
    const AGGREGATE_TYPE: &'static str;

    /// Owned entities in a stable order (collection order).
    fn owned_entities(&self) -> Vec<&dyn Entity> {
        Vec::new()
    }

    fn owned_entities_mut(&mut self) -> Vec<&mut dyn Entity> {
        Vec::new()
    }

    /// Whether the root or any owned entity has queued notifications.
    fn has_pending_events(&self) -> bool {
        !self.events().is_empty()
            || self
                .owned_entities()
                .iter()
                .any(|entity| !entity.events().is_empty())
    }

    /// Detach every queued notification: root first, then owned entities in order.
    ///
    /// Every queue visited is empty afterwards.
    fn take_pending_events(&mut self) -> Vec<PendingEvent> {
        let mut events = self.events_mut().drain();
        for entity in self.owned_entities_mut() {
            events.extend(entity.events_mut().drain());
        }
        events
    }
}
