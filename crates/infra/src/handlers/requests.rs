use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use mediary_core::{DomainResult, EntityId};
use mediary_events::{MediatorError, MediatorResult, RequestHandler};
use mediary_sales::{AcknowledgeOrder, CreateOrder, Order, OrderCreated, PlaceOrder};

use crate::config::HandlerConfig;
use crate::session::Session;

/// Reworks the configured order and announces it with `OrderCreated`.
#[derive(Debug, Clone)]
pub struct CreateOrderHandler {
    order_id: EntityId,
}

impl CreateOrderHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            order_id: config.order_id,
        }
    }
}

#[async_trait]
impl RequestHandler<CreateOrder, Session> for CreateOrderHandler {
    async fn handle(
        &self,
        request: CreateOrder,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<bool> {
        let orders = session.repository::<Order>();
        let order = orders.get(self.order_id, ct).await?;

        order.update(|order| -> DomainResult<()> {
            order.renumber("-- new data --");
            order.add_detail(12)?;
            order.set_detail_quantity(1, 12)?;
            order.raise(OrderCreated {
                name: request.number.clone(),
            });
            Ok(())
        })?;

        orders.unit_of_work().save(ct).await?;
        info!(order_id = %self.order_id, number = %request.number, "order reworked");
        Ok(true)
    }
}

/// Creates a new order with one detail per requested quantity.
#[derive(Debug, Clone, Default)]
pub struct PlaceOrderHandler;

#[async_trait]
impl RequestHandler<PlaceOrder, Session> for PlaceOrderHandler {
    async fn handle(
        &self,
        request: PlaceOrder,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<EntityId> {
        let mut order = Order::new(request.number.clone());
        for quantity in &request.quantities {
            order.add_detail(*quantity)?;
        }
        order.raise(OrderCreated {
            name: request.number.clone(),
        });

        let orders = session.repository::<Order>();
        let order = orders.add(order);
        orders.unit_of_work().save(ct).await?;

        let id = order.id();
        info!(order_id = %id, number = %request.number, "order placed");
        Ok(id)
    }
}

/// Slow acknowledgement; gives up as soon as the request is cancelled.
#[derive(Debug, Clone)]
pub struct AcknowledgeOrderHandler {
    delay: Duration,
}

impl AcknowledgeOrderHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            delay: config.acknowledge_delay,
        }
    }
}

#[async_trait]
impl RequestHandler<AcknowledgeOrder, Session> for AcknowledgeOrderHandler {
    async fn handle(
        &self,
        request: AcknowledgeOrder,
        _session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<bool> {
        tokio::select! {
            _ = ct.cancelled() => {
                debug!(number = %request.number, "acknowledgement cancelled");
                Err(MediatorError::Cancelled)
            }
            _ = tokio::time::sleep(self.delay) => Ok(true),
        }
    }
}
