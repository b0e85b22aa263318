//! Startup wiring for the ordering handlers.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use mediary_events::{Mediator, MediatorBuilder, PassThroughBehavior};
use mediary_parties::{Address, Buyer, BuyerUpdated};
use mediary_sales::{AcknowledgeOrder, CreateOrder, Order, OrderCreated, PlaceOrder};

use crate::behaviors::{TransactionBehavior, TransactionStats};
use crate::config::{HandlerConfig, UnitOfWorkConfig};
use crate::handlers::{
    AcknowledgeOrderHandler, BuyerUpdatedHandler, CreateOrderHandler, DoWork, DoWorkHandler,
    OrderCreatedHandler, PlaceOrderHandler, WorkDone, WorkDoneHandler,
};
use crate::session::{Session, SessionFactory};
use crate::store::{Database, InMemoryDatabase};

/// Register the ordering behaviors and handlers.
///
/// Behaviors go first (pass-through outermost, then the transaction), then
/// every handler. Returns the transaction counters.
pub fn register_ordering(
    builder: &mut MediatorBuilder<Session>,
    config: &HandlerConfig,
) -> Arc<TransactionStats> {
    let transactions = TransactionBehavior::new();
    let stats = transactions.stats();

    builder
        .register_behavior(PassThroughBehavior)
        .register_behavior(transactions)
        .register_handler::<CreateOrder, _>(CreateOrderHandler::new(config))
        .register_handler::<PlaceOrder, _>(PlaceOrderHandler)
        .register_handler::<AcknowledgeOrder, _>(AcknowledgeOrderHandler::new(config))
        .register_notification_handler::<OrderCreated, _>(OrderCreatedHandler::new(config))
        .register_notification_handler::<BuyerUpdated, _>(BuyerUpdatedHandler::new(config))
        .register_handler::<DoWork, _>(DoWorkHandler::new(config))
        .register_notification_handler::<WorkDone, _>(WorkDoneHandler::new(config));

    info!(
        order_id = %config.order_id,
        buyer_id = %config.buyer_id,
        cascade_buyer_id = %config.cascade_buyer_id,
        "ordering handlers registered"
    );
    stats
}

/// A ready-to-use ordering pipeline.
#[derive(Debug, Clone)]
pub struct OrderingPipeline {
    pub sessions: SessionFactory,
    pub transactions: Arc<TransactionStats>,
}

impl OrderingPipeline {
    pub fn new(
        database: Arc<dyn Database>,
        unit_of_work: UnitOfWorkConfig,
        handlers: &HandlerConfig,
    ) -> Self {
        let mut builder = Mediator::builder();
        let transactions = register_ordering(&mut builder, handlers);
        Self {
            sessions: SessionFactory::new(builder.build(), database, unit_of_work),
            transactions,
        }
    }
}

/// Store the order and the two buyers the handlers expect to find.
pub fn seed_demo_data(database: &InMemoryDatabase, config: &HandlerConfig) -> anyhow::Result<()> {
    let mut order = Order::new("O - 003");
    order.add_detail(10)?;
    order.add_detail(20)?;
    database
        .insert(order, config.order_id)
        .context("seeding order")?;

    for (id, name) in [
        (config.buyer_id, "buyer"),
        (config.cascade_buyer_id, "cascade buyer"),
    ] {
        let mut buyer = Buyer::new(name);
        buyer.add_detail(Address::new("India", "WB"));
        database
            .insert(buyer, id)
            .with_context(|| format!("seeding buyer {id}"))?;
    }
    Ok(())
}
