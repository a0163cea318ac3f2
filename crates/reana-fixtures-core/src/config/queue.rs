use serde::{Deserialize, Serialize};

/// Message queue fixture configuration.
///
/// The defaults name the exchange, queue and routing key the platform
/// components use in their own test suites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Broker URL. Only the in-memory transport is supported.
    #[serde(default = "default_url")]
    pub url: String,

    /// Default exchange name.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Default queue name.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Routing key binding the default queue to the default exchange.
    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    /// Serializer used by the default producer.
    #[serde(default = "default_serializer")]
    pub serializer: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            exchange: default_exchange(),
            queue: default_queue(),
            routing_key: default_routing_key(),
            serializer: default_serializer(),
        }
    }
}

fn default_url() -> String {
    "memory:///".to_string()
}

fn default_exchange() -> String {
    "test-exchange".to_string()
}

fn default_queue() -> String {
    "test-queue".to_string()
}

fn default_routing_key() -> String {
    "test-routing-key".to_string()
}

fn default_serializer() -> String {
    "json".to_string()
}
