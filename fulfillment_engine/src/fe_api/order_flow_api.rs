use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewOrder, OrderNumber, OrderStatusType},
    events::{EventProducers, NewOrderEvent, StatusChangedEvent},
    fe_api::event_snapshot,
    helpers::AnomalyRules,
    order_objects::OrderSnapshot,
    traits::{CustomerReceipt, FulfillmentDatabase, FulfillmentError, StatusChange},
};

/// `OrderFlowApi` is the order intake entry point. It also drives the order status state machine on behalf of staff.
///
/// Every change is committed before the matching event is published, and publishing never fails the call.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    rules: AnomalyRules,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, rules: AnomalyRules::default() }
    }

    pub fn with_anomaly_rules(mut self, rules: AnomalyRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: FulfillmentDatabase
{
    /// Validates and submits a new order.
    ///
    /// Stock is reserved, the customer is created or refreshed, the order is numbered and stored, and the anomaly rules
    /// are applied, all in one transaction. A `new_order` event is published once the order is committed.
    pub async fn create_order(&self, order: NewOrder) -> Result<OrderSnapshot, FulfillmentError> {
        order.validate().map_err(FulfillmentError::ValidationError)?;
        let (order, items) = self.db.create_order(order, &self.rules).await?;
        let snapshot = OrderSnapshot::new(order, &items);
        info!(
            "🔄️📦️ Order {} created for {} ({}). Status: {}",
            snapshot.order_number, snapshot.customer_name, snapshot.total, snapshot.status
        );
        self.producers.publish(NewOrderEvent::new(snapshot.clone()).into()).await;
        Ok(snapshot)
    }

    /// Moves the order to `new_status`, following the order state machine.
    pub async fn update_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatusType,
        actor: &str,
    ) -> Result<StatusChange, FulfillmentError> {
        let change = self.db.update_order_status(order_number, new_status, actor).await?;
        if change.auto_received {
            debug!("🔄️📦️ Order {order_number} was delivered. Customer receipt recorded automatically.");
        }
        let snapshot = event_snapshot(&self.db, change.order.clone()).await;
        self.producers.publish(StatusChangedEvent::new(snapshot, change.old_status, actor).into()).await;
        Ok(change)
    }

    /// Records that the customer physically received the goods. Calling this again has no further effect.
    pub async fn mark_customer_received(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CustomerReceipt, FulfillmentError> {
        let receipt = self.db.mark_customer_received(order_number, actor, notes).await?;
        if receipt.already_received {
            debug!("🔄️📦️ Order {order_number} was already marked as received");
        }
        Ok(receipt)
    }
}
