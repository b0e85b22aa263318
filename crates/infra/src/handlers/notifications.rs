use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mediary_core::{DomainResult, EntityId};
use mediary_events::{MediatorResult, NotificationHandler};
use mediary_parties::{Address, Buyer, BuyerUpdated};
use mediary_sales::OrderCreated;

use crate::config::HandlerConfig;
use crate::session::Session;

/// Updates the configured buyer when an order is created, then announces
/// the change with `BuyerUpdated`.
#[derive(Debug, Clone)]
pub struct OrderCreatedHandler {
    buyer_id: EntityId,
}

impl OrderCreatedHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            buyer_id: config.buyer_id,
        }
    }
}

#[async_trait]
impl NotificationHandler<OrderCreated, Session> for OrderCreatedHandler {
    async fn handle(
        &self,
        notification: &OrderCreated,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        let buyers = session.repository::<Buyer>();
        let buyer = buyers.get(self.buyer_id, ct).await?;

        buyer.update(|buyer| -> DomainResult<()> {
            buyer.rename("-- new 76-- ");
            buyer.relocate_detail(0, "-- UK")?;
            buyer.add_detail(Address::new("India2--", "WB2--"));
            buyer.raise(BuyerUpdated {
                name: "new 76--".to_string(),
            });
            Ok(())
        })?;

        buyers.unit_of_work().save(ct).await?;
        info!(buyer_id = %self.buyer_id, order = %notification.name, "buyer updated for new order");
        Ok(())
    }
}

/// Last link of the cascade: updates a second buyer and raises nothing.
#[derive(Debug, Clone)]
pub struct BuyerUpdatedHandler {
    buyer_id: EntityId,
}

impl BuyerUpdatedHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            buyer_id: config.cascade_buyer_id,
        }
    }
}

#[async_trait]
impl NotificationHandler<BuyerUpdated, Session> for BuyerUpdatedHandler {
    async fn handle(
        &self,
        notification: &BuyerUpdated,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        let buyers = session.repository::<Buyer>();
        let buyer = buyers.get(self.buyer_id, ct).await?;

        buyer.update(|buyer| -> DomainResult<()> {
            buyer.rename("new 76");
            buyer.relocate_detail(0, "UK")?;
            buyer.add_detail(Address::new("India2", "WB2"));
            Ok(())
        })?;

        buyers.unit_of_work().save(ct).await?;
        info!(buyer_id = %self.buyer_id, source = %notification.name, "buyer updated");
        Ok(())
    }
}
