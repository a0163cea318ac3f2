//! Bounded queue draining.

use reana_fixtures_core::error::Result;

use super::consumer::Consume;

/// Why a drain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of messages was consumed.
    LimitReached,
    /// The queues are empty and nothing can publish more.
    Exhausted,
}

/// Outcome of [`drain_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages handed to the consumer's callbacks.
    pub consumed: usize,
    pub reason: StopReason,
}

/// Consume messages until `limit` is reached or the queue is exhausted.
///
/// `None` drains until exhaustion, `Some(0)` consumes nothing. Waits while
/// the queue is empty but a producer may still publish. Errors from the
/// consumer are returned as is.
///
/// A queue with a live [`Producer`](super::Producer) is never exhausted: drop
/// every producer before `consume_queue(.., None)`, or the drain never returns.
pub async fn consume_queue<C>(consumer: &mut C, limit: Option<usize>) -> Result<()>
where
    C: Consume + ?Sized,
{
    drain_queue(consumer, limit).await.map(|_| ())
}

/// Same as [`consume_queue`], reporting how many messages were consumed.
pub async fn drain_queue<C>(consumer: &mut C, limit: Option<usize>) -> Result<DrainReport>
where
    C: Consume + ?Sized,
{
    let mut consumed = 0;

    let reason = loop {
        if limit.is_some_and(|limit| consumed >= limit) {
            break StopReason::LimitReached;
        }
        match consumer.consume_one().await? {
            Some(_) => consumed += 1,
            None => break StopReason::Exhausted,
        }
    };

    tracing::debug!(consumed, ?limit, ?reason, "Stopped draining queue");
    Ok(DrainReport { consumed, reason })
}
