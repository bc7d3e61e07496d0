use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use fulfillment_engine::{
    db_types::OrderStatusType,
    events::{EventHandlers, EventHooks},
    OrderFlowApi,
    PaymentApi,
};
use futures_util::FutureExt;
use log::*;
use support::{cod_order, setup, tear_down};
use tokio::runtime::Runtime;

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

/// Handlers run on their own tasks, so give them a moment to catch up.
async fn wait_for(hook: &HookCalled, expected: i32) {
    for _ in 0..50 {
        if hook.count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[test]
fn order_lifecycle_hooks() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let new_orders = HookCalled::default();
    let status_changes = HookCalled::default();
    let payments = HookCalled::default();
    let (n, s, p) = (new_orders.clone(), status_changes.clone(), payments.clone());
    rt.block_on(async {
        let db = setup().await;
        let mut hooks = EventHooks::default();
        hooks
            .on_new_order(move |ev| {
                info!("🪝️ New order {}", ev.order.order_number);
                n.called();
                async {}.boxed()
            })
            .on_status_changed(move |ev| {
                info!("🪝️ {} moved from {} to {}", ev.order.order_number, ev.old_status, ev.new_status);
                s.called();
                async {}.boxed()
            })
            .on_payment_confirmed(move |ev| {
                info!("🪝️ Payment for {} confirmed by {}", ev.order.order_number, ev.confirmed_by);
                p.called();
                async {}.boxed()
            });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let flow = OrderFlowApi::new(db.clone(), producers.clone());
        let api = PaymentApi::new(db.clone(), producers);
        let a = flow.create_order(cod_order("Dara", "012345678", &[("P1", 1)])).await.unwrap().order_number;
        let b = flow.create_order(cod_order("Sokha", "099888777", &[("P2", 1)])).await.unwrap().order_number;
        wait_for(&new_orders, 2).await;

        // pending -> confirmed is reported as a status change as well
        api.confirm_cod_payment(&a, "Driver", None).await.unwrap();
        api.confirm_cod_payment(&a, "Driver", None).await.unwrap();
        flow.update_status(&b, OrderStatusType::Cancelled, "staff").await.unwrap();
        // Failed transitions are silent
        assert!(flow.update_status(&b, OrderStatusType::Confirmed, "staff").await.is_err());

        wait_for(&payments, 1).await;
        wait_for(&status_changes, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        tear_down(db).await;
    });
    assert_eq!(new_orders.count(), 2);
    assert_eq!(payments.count(), 1);
    assert_eq!(status_changes.count(), 2);
    info!("🪝️ test complete");
}

#[test]
fn any_event_hook_sees_every_kind() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    let events = HookCalled::default();
    let kinds = Arc::new(std::sync::Mutex::new(Vec::new()));
    let (e, k) = (events.clone(), Arc::clone(&kinds));
    rt.block_on(async {
        let db = setup().await;
        let mut hooks = EventHooks::default();
        hooks.on_any_event(move |ev| {
            if let Ok(mut kinds) = k.lock() {
                kinds.push(ev.event_type());
            }
            e.called();
            async {}.boxed()
        });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let flow = OrderFlowApi::new(db.clone(), producers.clone());
        let api = PaymentApi::new(db.clone(), producers);
        let n = flow.create_order(cod_order("Dara", "012345678", &[("P1", 1)])).await.unwrap().order_number;
        api.confirm_cod_payment(&n, "Driver", None).await.unwrap();
        wait_for(&events, 3).await;
        tear_down(db).await;
    });
    assert_eq!(events.count(), 3);
    let mut kinds = kinds.lock().unwrap().clone();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["new_order", "payment_confirmed", "status_changed"]);
}
