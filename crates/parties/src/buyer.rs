use serde::{Deserialize, Serialize};

use mediary_core::{
    AggregateRoot, DomainError, DomainResult, Entity, EntityId, EventQueue, Notification,
    ValueObject, impl_entity,
};

/// Postal location of a buyer detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: String,
    pub state: String,
}

impl Address {
    pub fn new(country: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            state: state.into(),
        }
    }
}

impl ValueObject for Address {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyerDetail {
    id: EntityId,
    address: Address,
    #[serde(skip)]
    events: EventQueue,
}

impl BuyerDetail {
    pub fn new(address: Address) -> Self {
        Self {
            id: EntityId::UNSET,
            address,
            events: EventQueue::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl_entity!(BuyerDetail, "parties.buyer_detail");

/// Aggregate root: Buyer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buyer {
    id: EntityId,
    name: String,
    details: Vec<BuyerDetail>,
    #[serde(skip)]
    events: EventQueue,
}

impl Buyer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNSET,
            name: name.into(),
            details: Vec::new(),
            events: EventQueue::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn details(&self) -> &[BuyerDetail] {
        &self.details
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn add_detail(&mut self, address: Address) {
        self.details.push(BuyerDetail::new(address));
    }

    /// Change the country of one detail's address, keeping its state.
    pub fn relocate_detail(&mut self, index: usize, country: impl Into<String>) -> DomainResult<()> {
        let id = self.id;
        let detail = self.details.get_mut(index).ok_or_else(|| {
            DomainError::invariant(format!("buyer {id} has no detail at position {index}"))
        })?;
        detail.address.country = country.into();
        Ok(())
    }

    /// Queue a notification; it is published when the buyer is saved.
    pub fn raise<N: Notification>(&mut self, notification: N) {
        self.events.raise(notification);
    }
}

impl_entity!(Buyer, "parties.buyer");

impl AggregateRoot for Buyer {
    const AGGREGATE_TYPE: &'static str = "parties.buyer";

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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerUpdated {
    pub name: String,
}

impl Notification for BuyerUpdated {
    fn notification_type(&self) -> &'static str {
        "parties.buyer.updated"
    }
}
