//! In-memory message broker.
//!
//! A queue is exhausted when it holds no messages and nothing can add more:
//! the connection has no open producer, or the connection is closed. Until
//! then a consumer waiting on an empty queue blocks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use reana_fixtures_core::config::QueueConfig;
use reana_fixtures_core::error::{FixtureError, Result};

use super::exchange::{exchange_from_config, Exchange, Queue};

/// Broker URL of the in-memory transport.
pub const MEMORY_URL: &str = "memory:///";

/// Broker-assigned message identifier, unique per connection.
pub type DeliveryTag = u64;

#[derive(Debug, Clone)]
struct Envelope {
    body: Value,
    exchange: String,
    routing_key: String,
    content_type: String,
    published_at: DateTime<Utc>,
    redelivered: bool,
}

#[derive(Debug)]
struct Binding {
    exchange: Exchange,
    queue: String,
    binding_key: String,
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    envelope: Envelope,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<String, Exchange>,
    bindings: Vec<Binding>,
    queues: HashMap<String, VecDeque<Envelope>>,
    unacked: HashMap<DeliveryTag, Unacked>,
    next_tag: DeliveryTag,
    open_producers: usize,
    closed: bool,
}

impl BrokerState {
    fn declare(&mut self, queue: &Queue) -> Result<()> {
        let exchange = queue.exchange();
        match self.exchanges.get(exchange.name()) {
            Some(existing) if existing.kind() != exchange.kind() => {
                return Err(FixtureError::Queue(format!(
                    "exchange '{}' already declared as {}",
                    exchange.name(),
                    existing.kind().as_str()
                )));
            }
            Some(_) => {}
            None => {
                self.exchanges
                    .insert(exchange.name().to_string(), exchange.clone());
            }
        }

        self.queues.entry(queue.name().to_string()).or_default();

        let bound = self.bindings.iter().any(|b| {
            b.exchange.name() == exchange.name()
                && b.queue == queue.name()
                && b.binding_key == queue.routing_key()
        });
        if !bound {
            self.bindings.push(Binding {
                exchange: exchange.clone(),
                queue: queue.name().to_string(),
                binding_key: queue.routing_key().to_string(),
            });
        }
        Ok(())
    }

    fn route(&mut self, envelope: Envelope) -> usize {
        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| {
                b.exchange.name() == envelope.exchange
                    && b.exchange.routes(&b.binding_key, &envelope.routing_key)
            })
            .map(|b| b.queue.clone())
            .collect();

        let mut delivered = 0;
        for queue in dedup(targets) {
            if let Some(messages) = self.queues.get_mut(&queue) {
                messages.push_back(envelope.clone());
                delivered += 1;
            }
        }
        delivered
    }

    fn exhausted(&self) -> bool {
        self.closed || self.open_producers == 0
    }
}

fn dedup(mut names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    names
}

#[derive(Debug, Default)]
struct Broker {
    state: Mutex<BrokerState>,
    changed: Notify,
}

impl Broker {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection to an in-memory broker.
///
/// Clones share the same broker, so a connection handed to a producer and a
/// consumer lets them exchange messages.
#[derive(Debug, Clone)]
pub struct InMemoryConnection {
    url: String,
    broker: Arc<Broker>,
}

impl Default for InMemoryConnection {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            broker: Arc::new(Broker::default()),
        }
    }
}

impl InMemoryConnection {
    /// Open a fresh in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a broker at `url`. Only `memory://` URLs are accepted.
    pub fn open(url: &str) -> Result<Self> {
        if !url.starts_with("memory://") {
            return Err(FixtureError::Queue(format!(
                "unsupported broker url '{}', only memory:// is available",
                url
            )));
        }
        tracing::debug!(url, "Opened in-memory queue connection");
        Ok(Self {
            url: url.to_string(),
            broker: Arc::new(Broker::default()),
        })
    }

    /// Open the configured broker.
    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        Self::open(&config.url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Declare a queue, its exchange and the binding between them.
    pub fn declare(&self, queue: &Queue) -> Result<()> {
        let mut state = self.broker.lock();
        if state.closed {
            return Err(FixtureError::Queue("connection is closed".to_string()));
        }
        state.declare(queue)
    }

    /// Create a producer publishing to `exchange`.
    ///
    /// The queue stays open for waiting consumers while the producer lives.
    pub fn producer(
        &self,
        exchange: Exchange,
        routing_key: impl Into<String>,
        serializer: &str,
    ) -> Result<Producer> {
        if serializer != "json" {
            return Err(FixtureError::Queue(format!(
                "unsupported serializer '{}'",
                serializer
            )));
        }

        let mut state = self.broker.lock();
        if state.closed {
            return Err(FixtureError::Queue("connection is closed".to_string()));
        }
        state.open_producers += 1;
        drop(state);

        Ok(Producer {
            connection: self.clone(),
            exchange,
            routing_key: routing_key.into(),
        })
    }

    /// Producer on the configured exchange with the configured routing key.
    pub fn default_producer(&self, config: &QueueConfig) -> Result<Producer> {
        self.producer(
            exchange_from_config(config),
            config.routing_key.clone(),
            &config.serializer,
        )
    }

    /// Number of ready messages in a queue.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.broker
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Number of delivered messages not yet acknowledged.
    pub fn unacked_count(&self) -> usize {
        self.broker.lock().unacked.len()
    }

    /// Number of live producers.
    pub fn open_producers(&self) -> usize {
        self.broker.lock().open_producers
    }

    /// Remove every ready message from a queue. Returns how many were removed.
    pub fn purge(&self, queue: &str) -> usize {
        let mut state = self.broker.lock();
        state
            .queues
            .get_mut(queue)
            .map_or(0, |messages| messages.drain(..).count())
    }

    /// Close the connection. Waiting consumers see their queues exhausted.
    pub fn close(&self) {
        self.broker.lock().closed = true;
        self.broker.changed.notify_waiters();
        tracing::debug!(url = %self.url, "Closed in-memory queue connection");
    }

    pub fn is_closed(&self) -> bool {
        self.broker.lock().closed
    }

    /// Take the next message from the first non-empty queue.
    ///
    /// Waits while every queue is empty and a producer is still open.
    /// Returns `None` once the queues are exhausted.
    pub async fn next_delivery(&self, queues: &[String]) -> Result<Option<Message>> {
        loop {
            let changed = self.broker.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            {
                let mut state = self.broker.lock();
                if let Some(message) = self.take(&mut state, queues)? {
                    return Ok(Some(message));
                }
                if state.exhausted() {
                    return Ok(None);
                }
            }

            changed.await;
        }
    }

    fn take(&self, state: &mut BrokerState, queues: &[String]) -> Result<Option<Message>> {
        for name in queues {
            let messages = state
                .queues
                .get_mut(name)
                .ok_or_else(|| FixtureError::Queue(format!("queue '{}' is not declared", name)))?;

            if let Some(envelope) = messages.pop_front() {
                state.next_tag += 1;
                let tag = state.next_tag;
                state.unacked.insert(
                    tag,
                    Unacked {
                        queue: name.clone(),
                        envelope: envelope.clone(),
                    },
                );
                return Ok(Some(Message {
                    delivery_tag: tag,
                    queue: name.clone(),
                    envelope,
                    state: MessageState::Received,
                    connection: self.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn publish(&self, envelope: Envelope, declare: &[Queue]) -> Result<usize> {
        let mut state = self.broker.lock();
        if state.closed {
            return Err(FixtureError::Queue("connection is closed".to_string()));
        }
        for queue in declare {
            state.declare(queue)?;
        }
        let delivered = state.route(envelope);
        drop(state);

        self.broker.changed.notify_waiters();
        Ok(delivered)
    }

    fn settle(&self, tag: DeliveryTag, requeue: bool) -> Result<()> {
        let mut state = self.broker.lock();
        let unacked = state.unacked.remove(&tag).ok_or_else(|| {
            FixtureError::Queue(format!("unknown delivery tag {}", tag))
        })?;

        if requeue {
            let mut envelope = unacked.envelope;
            envelope.redelivered = true;
            state
                .queues
                .entry(unacked.queue)
                .or_default()
                .push_front(envelope);
            drop(state);
            self.broker.changed.notify_waiters();
        }
        Ok(())
    }

    fn release_producer(&self) {
        let mut state = self.broker.lock();
        state.open_producers = state.open_producers.saturating_sub(1);
        drop(state);
        self.broker.changed.notify_waiters();
    }
}

/// Publishes JSON messages to one exchange.
///
/// Dropping the producer releases its hold on the queues.
#[derive(Debug)]
pub struct Producer {
    connection: InMemoryConnection,
    exchange: Exchange,
    routing_key: String,
}

impl Producer {
    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Publish with the producer's routing key, declaring `declare` first.
    ///
    /// Returns the number of queues the message was routed to.
    pub fn publish<T: Serialize + ?Sized>(&self, body: &T, declare: &[Queue]) -> Result<usize> {
        self.publish_with_routing_key(body, &self.routing_key, declare)
    }

    /// Publish with an explicit routing key.
    pub fn publish_with_routing_key<T: Serialize + ?Sized>(
        &self,
        body: &T,
        routing_key: &str,
        declare: &[Queue],
    ) -> Result<usize> {
        let envelope = Envelope {
            body: serde_json::to_value(body)?,
            exchange: self.exchange.name().to_string(),
            routing_key: routing_key.to_string(),
            content_type: "application/json".to_string(),
            published_at: Utc::now(),
            redelivered: false,
        };

        let delivered = self.connection.publish(envelope, declare)?;
        tracing::trace!(
            exchange = %self.exchange.name(),
            routing_key,
            delivered,
            "Published message"
        );
        Ok(delivered)
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.connection.release_producer();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    Received,
    Acked,
    Requeued,
    Rejected,
}

impl MessageState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Acked => "acknowledged",
            Self::Requeued => "requeued",
            Self::Rejected => "rejected",
        }
    }
}

/// A delivered message.
///
/// Until it is acknowledged, requeued or rejected the broker counts it as
/// unacknowledged.
#[derive(Debug)]
pub struct Message {
    delivery_tag: DeliveryTag,
    queue: String,
    envelope: Envelope,
    state: MessageState,
    connection: InMemoryConnection,
}

impl Message {
    pub fn delivery_tag(&self) -> DeliveryTag {
        self.delivery_tag
    }

    /// Decoded JSON body.
    pub fn body(&self) -> &Value {
        &self.envelope.body
    }

    /// Deserialize the body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.envelope.body.clone())?)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn exchange(&self) -> &str {
        &self.envelope.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.envelope.routing_key
    }

    pub fn content_type(&self) -> &str {
        &self.envelope.content_type
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.envelope.published_at
    }

    /// Whether the message was requeued before this delivery.
    pub fn redelivered(&self) -> bool {
        self.envelope.redelivered
    }

    /// Whether the message has been acknowledged, requeued or rejected.
    pub fn is_settled(&self) -> bool {
        self.state != MessageState::Received
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state == MessageState::Acked
    }

    /// Acknowledge the message.
    pub fn ack(&mut self) -> Result<()> {
        self.settle(MessageState::Acked, false)
    }

    /// Put the message back at the head of its queue.
    pub fn requeue(&mut self) -> Result<()> {
        self.settle(MessageState::Requeued, true)
    }

    /// Discard the message.
    pub fn reject(&mut self) -> Result<()> {
        self.settle(MessageState::Rejected, false)
    }

    fn settle(&mut self, next: MessageState, requeue: bool) -> Result<()> {
        if self.is_settled() {
            return Err(FixtureError::Queue(format!(
                "message {} already {}",
                self.delivery_tag,
                self.state.as_str()
            )));
        }
        self.connection.settle(self.delivery_tag, requeue)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::exchange::{default_exchange, default_queue, ExchangeKind};
    use serde_json::json;

    fn queue_names(queue: &Queue) -> Vec<String> {
        vec![queue.name().to_string()]
    }

    #[test]
    fn test_open_rejects_other_transports() {
        assert!(InMemoryConnection::open("memory:///").is_ok());
        assert!(InMemoryConnection::open("amqp://localhost").is_err());
    }

    #[test]
    fn test_producer_rejects_unknown_serializer() {
        let conn = InMemoryConnection::new();
        let result = conn.producer(default_exchange(), "key", "pickle");
        assert!(matches!(result, Err(FixtureError::Queue(_))));
        assert_eq!(conn.open_producers(), 0);
    }

    #[test]
    fn test_publish_declares_and_routes() {
        let conn = InMemoryConnection::new();
        let queue = default_queue();
        let producer = conn
            .default_producer(&QueueConfig::default())
            .unwrap();

        let delivered = producer.publish(&json!({"id": 1}), &[queue.clone()]).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(conn.queue_len("test-queue"), 1);

        // Unbound routing keys go nowhere.
        let delivered = producer
            .publish_with_routing_key(&json!({"id": 2}), "other-key", &[])
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(conn.queue_len("test-queue"), 1);
    }

    #[test]
    fn test_fanout_reaches_every_queue() {
        let conn = InMemoryConnection::new();
        let exchange = Exchange::new("events", ExchangeKind::Fanout);
        let a = Queue::new("a", exchange.clone(), "");
        let b = Queue::new("b", exchange.clone(), "");
        conn.declare(&a).unwrap();
        conn.declare(&b).unwrap();

        let producer = conn.producer(exchange, "whatever", "json").unwrap();
        assert_eq!(producer.publish(&json!("hi"), &[]).unwrap(), 2);
        assert_eq!(conn.queue_len("a"), 1);
        assert_eq!(conn.queue_len("b"), 1);
    }

    #[test]
    fn test_redeclare_with_other_kind_fails() {
        let conn = InMemoryConnection::new();
        conn.declare(&default_queue()).unwrap();
        // Declaring twice is fine.
        conn.declare(&default_queue()).unwrap();

        let fanout = Queue::new(
            "other",
            Exchange::new("test-exchange", ExchangeKind::Fanout),
            "",
        );
        assert!(conn.declare(&fanout).is_err());
    }

    #[tokio::test]
    async fn test_ack_and_requeue() {
        let conn = InMemoryConnection::new();
        let queue = default_queue();
        let producer = conn.default_producer(&QueueConfig::default()).unwrap();
        producer.publish(&json!({"n": 1}), &[queue.clone()]).unwrap();
        drop(producer);

        let mut message = conn
            .next_delivery(&queue_names(&queue))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.body(), &json!({"n": 1}));
        assert_eq!(message.content_type(), "application/json");
        assert!(!message.redelivered());
        assert_eq!(conn.unacked_count(), 1);

        message.requeue().unwrap();
        assert_eq!(conn.unacked_count(), 0);
        assert_eq!(conn.queue_len("test-queue"), 1);
        assert!(message.ack().is_err());

        let mut again = conn
            .next_delivery(&queue_names(&queue))
            .await
            .unwrap()
            .unwrap();
        assert!(again.redelivered());
        assert_ne!(again.delivery_tag(), message.delivery_tag());
        again.ack().unwrap();
        assert!(again.is_acknowledged());
        assert_eq!(conn.unacked_count(), 0);

        assert!(conn
            .next_delivery(&queue_names(&queue))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_undeclared_queue_is_an_error() {
        let conn = InMemoryConnection::new();
        let result = conn.next_delivery(&["missing".to_string()]).await;
        assert!(matches!(result, Err(FixtureError::Queue(_))));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let conn = InMemoryConnection::new();
        let queue = default_queue();
        conn.declare(&queue).unwrap();
        let _producer = conn.default_producer(&QueueConfig::default()).unwrap();

        let waiter = {
            let conn = conn.clone();
            let names = queue_names(&queue);
            tokio::spawn(async move { conn.next_delivery(&names).await })
        };

        tokio::task::yield_now().await;
        conn.close();

        let delivery = waiter.await.unwrap().unwrap();
        assert!(delivery.is_none());
        assert!(conn.is_closed());
        assert!(conn.declare(&queue).is_err());
    }

    #[test]
    fn test_purge() {
        let conn = InMemoryConnection::new();
        let queue = default_queue();
        let producer = conn.default_producer(&QueueConfig::default()).unwrap();
        for n in 0..3 {
            producer.publish(&json!(n), &[queue.clone()]).unwrap();
        }
        assert_eq!(conn.purge("test-queue"), 3);
        assert_eq!(conn.queue_len("test-queue"), 0);
        assert_eq!(conn.purge("missing"), 0);
    }

    #[test]
    fn test_decode_body() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Status {
            workflow_uuid: String,
            status: i32,
        }

        let conn = InMemoryConnection::new();
        let queue = default_queue();
        let producer = conn.default_producer(&QueueConfig::default()).unwrap();
        producer
            .publish(&json!({"workflow_uuid": "w1", "status": 2}), &[queue.clone()])
            .unwrap();
        drop(producer);

        let message = tokio_test::block_on(conn.next_delivery(&queue_names(&queue)))
            .unwrap()
            .unwrap();
        let status: Status = message.decode().unwrap();
        assert_eq!(
            status,
            Status {
                workflow_uuid: "w1".to_string(),
                status: 2
            }
        );
    }
}
