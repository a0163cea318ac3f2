use reana_fixtures_core::config::QueueConfig;

/// How an exchange routes messages to bound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routing key must equal the binding key.
    Direct,
    /// Every bound queue receives every message.
    Fanout,
    /// Binding keys are dot-separated patterns with `*` and `#`.
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }
}

/// A named message exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
}

impl Exchange {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// A direct exchange.
    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Direct)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Whether a message published with `routing_key` reaches a queue bound
    /// with `binding_key`.
    pub fn routes(&self, binding_key: &str, routing_key: &str) -> bool {
        match self.kind {
            ExchangeKind::Direct => binding_key == routing_key,
            ExchangeKind::Fanout => true,
            ExchangeKind::Topic => topic_matches(binding_key, routing_key),
        }
    }
}

/// A queue bound to an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Queue {
    name: String,
    exchange: Exchange,
    routing_key: String,
}

impl Queue {
    pub fn new(name: impl Into<String>, exchange: Exchange, routing_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exchange,
            routing_key: routing_key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Binding key of the queue.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }
}

/// The default direct exchange, `test-exchange`.
pub fn default_exchange() -> Exchange {
    exchange_from_config(&QueueConfig::default())
}

/// The default queue, `test-queue`, bound with `test-routing-key`.
pub fn default_queue() -> Queue {
    queue_from_config(&QueueConfig::default())
}

/// The configured default exchange.
pub fn exchange_from_config(config: &QueueConfig) -> Exchange {
    Exchange::direct(&config.exchange)
}

/// The configured default queue, bound to the configured exchange.
pub fn queue_from_config(config: &QueueConfig) -> Queue {
    Queue::new(
        &config.queue,
        exchange_from_config(config),
        &config.routing_key,
    )
}

/// Match a routing key against a topic pattern.
///
/// `*` matches exactly one word, `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((first, key_rest)) => (word == "*" || word == *first) && match_words(rest, key_rest),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exchange_and_queue() {
        let exchange = default_exchange();
        assert_eq!(exchange.name(), "test-exchange");
        assert_eq!(exchange.kind(), ExchangeKind::Direct);

        let queue = default_queue();
        assert_eq!(queue.name(), "test-queue");
        assert_eq!(queue.routing_key(), "test-routing-key");
        assert_eq!(queue.exchange(), &exchange);
    }

    #[test]
    fn test_direct_routing() {
        let exchange = Exchange::direct("jobs");
        assert!(exchange.routes("jobs.status", "jobs.status"));
        assert!(!exchange.routes("jobs.status", "jobs.submit"));
    }

    #[test]
    fn test_fanout_routing() {
        let exchange = Exchange::new("events", ExchangeKind::Fanout);
        assert!(exchange.routes("anything", "something-else"));
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("workflow.*", "workflow.status"));
        assert!(!topic_matches("workflow.*", "workflow.status.update"));
        assert!(topic_matches("workflow.#", "workflow.status.update"));
        assert!(topic_matches("workflow.#", "workflow"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("*.status", "job.status"));
        assert!(!topic_matches("*.status", "status"));
        assert!(topic_matches("#.status", "a.b.status"));
    }

    #[test]
    fn test_queue_from_config() {
        let config = QueueConfig {
            exchange: "jobs".to_string(),
            queue: "jobs-queue".to_string(),
            routing_key: "jobs-key".to_string(),
            ..Default::default()
        };
        let queue = queue_from_config(&config);
        assert_eq!(queue.name(), "jobs-queue");
        assert_eq!(queue.exchange().name(), "jobs");
        assert_eq!(queue.routing_key(), "jobs-key");
    }
}
