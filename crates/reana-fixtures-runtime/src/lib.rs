pub mod db;
pub mod queue;
pub mod secret_store;
pub mod teardown;

pub use db::{IsolatedTestDb, Session, TestApp, TestDatabase, WorkflowRecord};
pub use queue::{
    consume_queue, default_exchange, default_in_memory_producer, default_queue,
    in_memory_queue_connection, Consume, Consumer, Exchange, InMemoryConnection, Message,
    MessageHandler, Producer, Queue, RecordingHandler,
};
pub use secret_store::{
    corev1_api_client_with_user_secrets, CoreV1ClientFactory, MockCoreV1Client,
    SecretStoreClient,
};
pub use teardown::TeardownStack;
