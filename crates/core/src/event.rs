//! Notifications (domain events) and the per-entity pending queue.

use std::any::Any;
use std::sync::Arc;

/// Access to the concrete value behind a trait object.
///
/// Blanket-implemented for every `'static` type; it exists so `dyn Notification`
/// can be downcast without trait upcasting.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fact that already happened.
///
/// Notifications are:
/// - **immutable** (treat them as facts)
/// - consumed by **zero or more** handlers
/// - carry **no result**
///
/// The trait is object safe: aggregates queue notifications of different
/// types side by side as [`PendingEvent`]s.
pub trait Notification: AsAny + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name used in logs (defaults to the Rust type name).
    fn notification_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl dyn Notification {
    /// Borrow the concrete notification if it is an `N`.
    pub fn downcast_ref<N: Notification>(&self) -> Option<&N> {
        self.as_any().downcast_ref::<N>()
    }

    pub fn is<N: Notification>(&self) -> bool {
        self.as_any().is::<N>()
    }
}

/// A queued notification, shared so it can be published after it left its entity.
pub type PendingEvent = Arc<dyn Notification>;

/// Ordered queue of notifications raised by an entity and not yet published.
///
/// Domain code only appends (`raise`); the unit of work is the only reader
/// that empties it (`drain`), once per save cycle.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: Vec<PendingEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification at the end of the queue.
    pub fn raise<N: Notification>(&mut self, notification: N) {
        self.pending.push(Arc::new(notification));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Notification + 'static)> + '_ {
        self.pending.iter().map(|e| e.as_ref())
    }

    /// Borrow the notification at `index`, if it is an `N`.
    pub fn get<N: Notification>(&self, index: usize) -> Option<&N> {
        self.pending.get(index).and_then(|e| e.as_ref().downcast_ref::<N>())
    }

    /// Detach every queued notification, preserving order.
    pub fn drain(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.pending)
    }
}
