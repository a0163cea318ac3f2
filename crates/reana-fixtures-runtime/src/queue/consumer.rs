//! Message consumers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use reana_fixtures_core::error::Result;

use super::exchange::Queue;
use super::memory::{DeliveryTag, InMemoryConnection, Message};

/// Something that processes messages one at a time.
///
/// `consume_one` handles a single message and returns its delivery tag, or
/// `None` once no more messages will arrive.
pub trait Consume: Send {
    fn consume_one(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeliveryTag>>> + Send + '_>>;
}

/// Callback invoked for every delivered message.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, body: &Value, message: &mut Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&Value, &mut Message) + Send + Sync,
{
    fn on_message(&self, body: &Value, message: &mut Message) {
        self(body, message)
    }
}

/// Acknowledges every message it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckingHandler;

impl MessageHandler for AckingHandler {
    fn on_message(&self, _body: &Value, message: &mut Message) {
        if let Err(e) = message.ack() {
            tracing::warn!(
                delivery_tag = message.delivery_tag(),
                error = %e,
                "Failed to acknowledge message"
            );
        }
    }
}

/// A message seen by a [`RecordingHandler`].
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub body: Value,
    pub delivery_tag: DeliveryTag,
    pub routing_key: String,
    pub received_at: DateTime<Utc>,
}

/// Records every message without acknowledging it.
///
/// Clones share the same record, so a test can keep one while the consumer
/// owns another.
///
/// # Example
///
/// ```ignore
/// let handler = RecordingHandler::new();
/// let mut consumer = Consumer::new(&conn, vec![default_queue()], handler.clone())?;
/// consume_queue(&mut consumer, Some(1)).await?;
///
/// handler.assert_called_once_with(&json!({"id": 1}));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<RwLock<Vec<RecordedMessage>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded message, oldest first.
    pub fn calls(&self) -> Vec<RecordedMessage> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bodies of every recorded message.
    pub fn bodies(&self) -> Vec<Value> {
        self.calls().into_iter().map(|call| call.body).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Assert exactly `expected` messages were handled.
    pub fn assert_call_count(&self, expected: usize) {
        let count = self.call_count();
        assert_eq!(
            count, expected,
            "Expected {} handled messages, got {}",
            expected, count
        );
    }

    /// Assert some handled message had `body`.
    pub fn assert_called_with(&self, body: &Value) {
        let bodies = self.bodies();
        assert!(
            bodies.iter().any(|b| b == body),
            "Expected a message with body {}, got {:?}",
            body,
            bodies
        );
    }

    /// Assert exactly one message was handled and it had `body`.
    pub fn assert_called_once_with(&self, body: &Value) {
        let bodies = self.bodies();
        assert_eq!(
            bodies.len(),
            1,
            "Expected exactly one handled message, got {:?}",
            bodies
        );
        assert_eq!(&bodies[0], body, "Handled message body differs");
    }
}

impl MessageHandler for RecordingHandler {
    fn on_message(&self, body: &Value, message: &mut Message) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedMessage {
                body: body.clone(),
                delivery_tag: message.delivery_tag(),
                routing_key: message.routing_key().to_string(),
                received_at: Utc::now(),
            });
    }
}

/// Takes messages from one or more queues and hands them to a handler.
pub struct Consumer<H> {
    connection: InMemoryConnection,
    queues: Vec<Queue>,
    queue_names: Vec<String>,
    handler: H,
}

impl<H: MessageHandler> Consumer<H> {
    /// Declare `queues` and consume from them, in order.
    pub fn new(connection: &InMemoryConnection, queues: Vec<Queue>, handler: H) -> Result<Self> {
        for queue in &queues {
            connection.declare(queue)?;
        }
        let queue_names = queues.iter().map(|q| q.name().to_string()).collect();

        Ok(Self {
            connection: connection.clone(),
            queues,
            queue_names,
            handler,
        })
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn connection(&self) -> &InMemoryConnection {
        &self.connection
    }
}

impl<H: MessageHandler> Consume for Consumer<H> {
    fn consume_one(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DeliveryTag>>> + Send + '_>> {
        Box::pin(async move {
            let Some(mut message) = self.connection.next_delivery(&self.queue_names).await? else {
                return Ok(None);
            };

            let tag = message.delivery_tag();
            let body = message.body().clone();
            self.handler.on_message(&body, &mut message);
            tracing::trace!(delivery_tag = tag, queue = message.queue(), "Handled message");
            Ok(Some(tag))
        })
    }
}

/// Consumer that acknowledges every message.
pub fn consumer_base(
    connection: &InMemoryConnection,
    queues: Vec<Queue>,
) -> Result<Consumer<AckingHandler>> {
    Consumer::new(connection, queues, AckingHandler)
}

/// Consumer that records every message instead of handling it.
///
/// Inspect what it received through [`Consumer::handler`].
pub fn consumer_base_on_message_mock(
    connection: &InMemoryConnection,
    queues: Vec<Queue>,
) -> Result<Consumer<RecordingHandler>> {
    Consumer::new(connection, queues, RecordingHandler::new())
}
