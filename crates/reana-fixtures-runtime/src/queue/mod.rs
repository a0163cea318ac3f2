//! In-memory message queue fixtures.
//!
//! A broker with exchanges, queues and producers, consumers that either
//! acknowledge or record what they receive, and the bounded drainer that
//! pumps messages through them.

mod consumer;
mod drain;
mod exchange;
mod memory;

pub use consumer::{
    consumer_base, consumer_base_on_message_mock, AckingHandler, Consume, Consumer,
    MessageHandler, RecordedMessage, RecordingHandler,
};
pub use drain::{consume_queue, drain_queue, DrainReport, StopReason};
pub use exchange::{
    default_exchange, default_queue, exchange_from_config, queue_from_config, topic_matches,
    Exchange, ExchangeKind, Queue,
};
pub use memory::{DeliveryTag, InMemoryConnection, Message, Producer, MEMORY_URL};

use reana_fixtures_core::config::QueueConfig;
use reana_fixtures_core::error::Result;

/// A fresh in-memory broker connection.
pub fn in_memory_queue_connection() -> InMemoryConnection {
    InMemoryConnection::new()
}

/// JSON producer on `exchange` with the default routing key.
pub fn default_in_memory_producer(
    connection: &InMemoryConnection,
    exchange: &Exchange,
) -> Result<Producer> {
    let config = QueueConfig::default();
    connection.producer(exchange.clone(), config.routing_key, &config.serializer)
}
