use serde::{Deserialize, Serialize};

use mediary_core::{
    AggregateRoot, DomainError, DomainResult, Entity, EntityId, EventQueue, Notification,
    impl_entity,
};
use mediary_events::Request;

/// Order line owned by an [`Order`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDetail {
    id: EntityId,
    quantity: i32,
    #[serde(skip)]
    events: EventQueue,
}

impl OrderDetail {
    pub fn new(quantity: i32) -> DomainResult<Self> {
        ensure_positive(quantity)?;
        Ok(Self {
            id: EntityId::UNSET,
            quantity,
            events: EventQueue::new(),
        })
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }
}

impl_entity!(OrderDetail, "sales.order_detail");

/// Aggregate root: Order.
///
/// Owns its details exclusively. Notifications raised here wait in the
/// order's queue until the unit of work that saves it drains them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: EntityId,
    number: String,
    details: Vec<OrderDetail>,
    #[serde(skip)]
    events: EventQueue,
}

impl Order {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNSET,
            number: number.into(),
            details: Vec::new(),
            events: EventQueue::new(),
        }
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn details(&self) -> &[OrderDetail] {
        &self.details
    }

    pub fn renumber(&mut self, number: impl Into<String>) {
        self.number = number.into();
    }

    pub fn add_detail(&mut self, quantity: i32) -> DomainResult<()> {
        self.details.push(OrderDetail::new(quantity)?);
        Ok(())
    }

    pub fn set_detail_quantity(&mut self, index: usize, quantity: i32) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let detail = self.details.get_mut(index).ok_or_else(|| {
            DomainError::invariant(format!(
                "order {} has no detail at position {index}",
                self.id
            ))
        })?;
        detail.quantity = quantity;
        Ok(())
    }

    /// Queue a notification; it is published when the order is saved.
    pub fn raise<N: Notification>(&mut self, notification: N) {
        self.events.raise(notification);
    }
}

impl_entity!(Order, "sales.order");

impl AggregateRoot for Order {
    const AGGREGATE_TYPE: &'static str = "sales.order";

    fn owned_entities(&self) -> Vec<&dyn Entity> {
        self.details.iter().map(|d| d as &dyn Entity).collect()
    }

    fn owned_entities_mut(&mut self) -> Vec<&mut dyn Entity> {
        self.details
            .iter_mut()
            .map(|d| d as &mut dyn Entity)
            .collect()
    }
}

fn ensure_positive(quantity: i32) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub name: String,
}

impl Notification for OrderCreated {
    fn notification_type(&self) -> &'static str {
        "sales.order.created"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Rework the demo order and announce it. Responds `true` once saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub number: String,
}

impl Request for CreateOrder {
    type Response = bool;
}

/// Create a new order with one detail per quantity. Responds with the new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub number: String,
    pub quantities: Vec<i32>,
}

impl Request for PlaceOrder {
    type Response = EntityId;
}

/// Slow, read-only request used to exercise cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeOrder {
    pub number: String,
}

impl Request for AcknowledgeOrder {
    type Response = bool;
}
