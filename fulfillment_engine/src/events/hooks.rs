use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    NewOrderEvent,
    OrderEvent,
    PaymentConfirmedEvent,
    StatusChangedEvent,
};

/// The publishing side of the registered hooks. Cloned into every API object that emits events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub new_order_producer: Vec<EventProducer<NewOrderEvent>>,
    pub status_changed_producer: Vec<EventProducer<StatusChangedEvent>>,
    pub payment_confirmed_producer: Vec<EventProducer<PaymentConfirmedEvent>>,
}

impl EventProducers {
    /// Sends the event to every producer of its kind.
    pub async fn publish(&self, event: OrderEvent) {
        trace!("📬️ Publishing {} event for order {}", event.event_type(), event.order().order_number);
        match event {
            OrderEvent::NewOrder(ev) => publish_all(&self.new_order_producer, ev).await,
            OrderEvent::StatusChanged(ev) => publish_all(&self.status_changed_producer, ev).await,
            OrderEvent::PaymentConfirmed(ev) => publish_all(&self.payment_confirmed_producer, ev).await,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_order_producer.is_empty() &&
            self.status_changed_producer.is_empty() &&
            self.payment_confirmed_producer.is_empty()
    }

    /// Combines the producers of two sets of handlers, so that events reach both.
    pub fn merge(mut self, other: EventProducers) -> Self {
        self.new_order_producer.extend(other.new_order_producer);
        self.status_changed_producer.extend(other.status_changed_producer);
        self.payment_confirmed_producer.extend(other.payment_confirmed_producer);
        self
    }
}

async fn publish_all<E: Clone + Send + Sync>(producers: &[EventProducer<E>], event: E) {
    for producer in producers {
        producer.publish_event(event.clone()).await;
    }
}

pub struct EventHandlers {
    pub on_new_order: Option<EventHandler<NewOrderEvent>>,
    pub on_status_changed: Option<EventHandler<StatusChangedEvent>>,
    pub on_payment_confirmed: Option<EventHandler<PaymentConfirmedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_new_order = hooks.on_new_order.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_confirmed = hooks.on_payment_confirmed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_new_order, on_status_changed, on_payment_confirmed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_new_order {
            result.new_order_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_confirmed {
            result.payment_confirmed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_new_order {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_confirmed {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_new_order: Option<Handler<NewOrderEvent>>,
    pub on_status_changed: Option<Handler<StatusChangedEvent>>,
    pub on_payment_confirmed: Option<Handler<PaymentConfirmedEvent>>,
}

impl EventHooks {
    pub fn on_new_order<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NewOrderEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_new_order = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StatusChangedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentConfirmedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payment_confirmed = Some(Arc::new(f));
        self
    }

    /// Registers the same handler for all three event kinds, receiving them as an [`OrderEvent`].
    pub fn on_any_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> BoxedFuture) + Send + Sync + 'static {
        let f = Arc::new(f);
        let g = Arc::clone(&f);
        let h = Arc::clone(&f);
        self.on_new_order(move |ev| f(ev.into()));
        self.on_status_changed(move |ev| g(ev.into()));
        self.on_payment_confirmed(move |ev| h(ev.into()))
    }
}
