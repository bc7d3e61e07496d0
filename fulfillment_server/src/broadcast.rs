//! Real-time order updates for staff dashboards.
//!
//! Dashboards connect to `GET /ws/orders` and join the `orders_updates` group. Every order event is serialized once
//! and fanned out to all members over a tokio broadcast channel. Membership is capped, and the count lives in the
//! database so that every server process sharing it enforces the same cap.
//!
//! Delivery is best-effort. A member that falls behind skips the events it missed, and a disconnected member must
//! re-sync by pulling the order list.
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures::{future::BoxFuture, StreamExt};
use fulfillment_engine::{
    events::{EventHandlers, EventHooks, OrderEvent},
    FulfillmentError,
    SubscriberCounter,
};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

pub const ORDERS_GROUP: &str = "orders_updates";
/// Close code sent to a client that connects while the group is full
pub const CAPACITY_CLOSE_CODE: u16 = 4003;
pub const BROADCAST_EVENT_BUFFER_SIZE: usize = 25;
const CHANNEL_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A member that has sent nothing, not even a pong, for this long is disconnected
const CLIENT_TIMEOUT: Duration = Duration::from_secs(75);

/// Messages that clients may send. Anything unrecognised is logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(Self::Unknown)
    }
}

/// Control messages from the server. Order events are sent as serialized [`OrderEvent`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished,
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct OrderBroadcaster {
    sender: broadcast::Sender<String>,
    max_subscribers: i64,
    heartbeat: Duration,
    client_timeout: Duration,
}

impl OrderBroadcaster {
    pub fn new(max_subscribers: i64) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, max_subscribers, heartbeat: HEARTBEAT_INTERVAL, client_timeout: CLIENT_TIMEOUT }
    }

    /// Overrides how often members are pinged and how long a silent member is kept.
    pub fn with_heartbeat(mut self, interval: Duration, client_timeout: Duration) -> Self {
        self.heartbeat = interval;
        self.client_timeout = client_timeout;
        self
    }

    pub fn max_subscribers(&self) -> i64 {
        self.max_subscribers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Sends the event to every connected member. Returns the number of members it was queued for.
    pub fn publish(&self, event: &OrderEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("📡️ Could not serialize the {} event. {e}", event.event_type());
                return 0;
            },
        };
        // An error only means that nobody is listening
        let n = self.sender.send(json).unwrap_or(0);
        trace!("📡️ {} event for {} sent to {n} subscribers", event.event_type(), event.order().order_number);
        n
    }
}

/// Hooks every order event into the broadcaster.
pub fn create_broadcast_event_handlers(broadcaster: OrderBroadcaster) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_any_event(move |event| {
        broadcaster.publish(&event);
        done()
    });
    EventHandlers::new(BROADCAST_EVENT_BUFFER_SIZE, hooks)
}

fn done() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

/// Zeroes the membership count of the group. Run at start-up, before any session is admitted, so that members of a
/// previous run that never left cleanly do not hold slots.
pub async fn reset_memberships<C: SubscriberCounter>(counter: &C) -> Result<(), FulfillmentError> {
    counter.reset_subscribers(ORDERS_GROUP).await?;
    info!("📡️ {ORDERS_GROUP} memberships have been reset");
    Ok(())
}

/// Admits a new websocket session to the group, or turns it away if the group is full.
///
/// The session runs on its own task; this returns as soon as the outcome of admission is known.
pub async fn start_session<C>(
    broadcaster: &OrderBroadcaster,
    counter: C,
    session: Session,
    stream: MessageStream,
) where
    C: SubscriberCounter + 'static,
{
    match counter.try_join(ORDERS_GROUP, broadcaster.max_subscribers()).await {
        Ok(Some(n)) => {
            info!("📡️ New {ORDERS_GROUP} subscriber. {n} connected.");
            let events = broadcaster.subscribe();
            let timing = (broadcaster.heartbeat, broadcaster.client_timeout);
            actix_web::rt::spawn(run_session(session, stream, events, counter, timing));
        },
        Ok(None) => {
            let max = broadcaster.max_subscribers();
            warn!("📡️ {ORDERS_GROUP} is full ({max} subscribers). Turning a connection away.");
            let reason = CloseReason {
                code: CloseCode::Other(CAPACITY_CLOSE_CODE),
                description: Some("capacity".to_string()),
            };
            let _ = session.close(Some(reason)).await;
        },
        Err(e) => {
            error!("📡️ Could not register a {ORDERS_GROUP} subscriber. {e}");
            let _ = session.close(Some(CloseReason::from(CloseCode::Error))).await;
        },
    }
}

async fn run_session<C: SubscriberCounter>(
    mut session: Session,
    mut stream: MessageStream,
    mut events: broadcast::Receiver<String>,
    counter: C,
    (interval, client_timeout): (Duration, Duration),
) {
    let mut heartbeat = tokio::time::interval(interval);
    heartbeat.tick().await;
    let mut last_heard = Instant::now();
    let reason = if session.text(ServerMessage::ConnectionEstablished.to_json()).await.is_err() {
        None
    } else {
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if last_heard.elapsed() > client_timeout {
                        debug!("📡️ No word from a subscriber in {}s. Disconnecting it.", client_timeout.as_secs_f32());
                        break Some(CloseReason { code: CloseCode::Away, description: Some("timeout".to_string()) });
                    }
                    if session.ping(b"").await.is_err() {
                        break None;
                    }
                }
                event = events.recv() => match event {
                    Ok(json) => {
                        if session.text(json).await.is_err() {
                            break None;
                        }
                    },
                    Err(RecvError::Lagged(n)) => warn!("📡️ A subscriber fell behind and missed {n} events"),
                    Err(RecvError::Closed) => break Some(CloseReason::from(CloseCode::Away)),
                },
                msg = stream.next() => {
                    if let Some(Ok(_)) = msg {
                        last_heard = Instant::now();
                    }
                    match msg {
                        Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                            ClientMessage::Ping => {
                                if session.text(ServerMessage::Pong.to_json()).await.is_err() {
                                    break None;
                                }
                            },
                            ClientMessage::Unknown => debug!("📡️ Ignoring client message: {text}"),
                        },
                        Some(Ok(Message::Ping(bytes))) => {
                            if session.pong(&bytes).await.is_err() {
                                break None;
                            }
                        },
                        Some(Ok(Message::Close(reason))) => break reason,
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            debug!("📡️ Websocket protocol error. {e}");
                            break None;
                        },
                        None => break None,
                    }
                },
            }
        }
    };
    let _ = session.close(reason).await;
    match counter.leave(ORDERS_GROUP).await {
        Ok(n) => info!("📡️ {ORDERS_GROUP} subscriber left. {n} connected."),
        Err(e) => error!("📡️ Could not release a {ORDERS_GROUP} membership. {e}"),
    }
}
