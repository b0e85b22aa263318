//! Entity trait: identity + continuity across state changes, plus the
//! notifications the entity raised and nobody has published yet.

use crate::event::EventQueue;
use crate::id::EntityId;

/// Entity marker + minimal interface.
///
/// Every entity owns its pending notifications exclusively. Only the unit of
/// work drains them; domain code appends through [`EventQueue::raise`].
pub trait Entity {
    /// Returns the entity identifier (`EntityId::UNSET` until persisted).
    fn id(&self) -> EntityId;

    /// Called by the persistence layer when the entity is first stored.
    fn assign_id(&mut self, id: EntityId);

    /// Stable type name, used as the identity sequence for new entities.
    fn entity_type(&self) -> &'static str;

    fn events(&self) -> &EventQueue;

    fn events_mut(&mut self) -> &mut EventQueue;
}

/// Implement [`Entity`] for a struct with `id: EntityId` and `events: EventQueue` fields.
///
/// ```ignore
/// pub struct OrderDetail { id: EntityId, quantity: i32, events: EventQueue }
/// impl_entity!(OrderDetail, "sales.order_detail");
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($t:ty, $name:literal) => {
        impl $crate::Entity for $t {
            fn id(&self) -> $crate::EntityId {
                self.id
            }

            fn assign_id(&mut self, id: $crate::EntityId) {
                self.id = id;
            }

            fn entity_type(&self) -> &'static str {
                $name
            }

            fn events(&self) -> &$crate::EventQueue {
                &self.events
            }

            fn events_mut(&mut self) -> &mut $crate::EventQueue {
                &mut self.events
            }
        }
    };
}
