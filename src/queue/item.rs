//! Queue items and their single-use result channels.

use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Write half of an item's result channel.
#[derive(Debug)]
pub struct Reply<R> {
    sender: oneshot::Sender<R>,
    processed: Arc<AtomicU64>,
}

impl<R> Reply<R> {
    /// Deliver the result. Counts the item as processed even when the
    /// producer has stopped waiting; returns whether anyone received it.
    pub fn send(self, result: R) -> bool {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.sender.send(result).is_ok()
    }

    /// True once the producer dropped its [`ResultHandle`].
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A pending backend call: the caller's context, the payload, and where to
/// send the result.
#[derive(Debug)]
pub struct QueueItem<P, R> {
    pub id: Uuid,
    pub payload: P,
    pub enqueued_at: Instant,
    context: CancellationToken,
    reply: Reply<R>,
}

impl<P, R> QueueItem<P, R> {
    pub(crate) fn new(
        payload: P,
        context: CancellationToken,
        processed: Arc<AtomicU64>,
    ) -> (Self, ResultHandle<R>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        let item = Self {
            id,
            payload,
            enqueued_at: Instant::now(),
            context,
            reply: Reply { sender, processed },
        };
        (item, ResultHandle { id, receiver })
    }

    /// The producer's cancellation context.
    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    /// The producer cancelled or stopped waiting; the work can be skipped.
    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled() || self.reply.is_closed()
    }

    /// Time spent in the queue so far.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn complete(self, result: R) -> bool {
        self.reply.send(result)
    }

    pub fn into_parts(self) -> (P, Reply<R>) {
        (self.payload, self.reply)
    }
}

/// Read half of an item's result channel, returned by enqueue.
#[derive(Debug)]
pub struct ResultHandle<R> {
    id: Uuid,
    receiver: oneshot::Receiver<R>,
}

impl<R> ResultHandle<R> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the worker's result. If the item is dropped without a reply
    /// (queue shut down), resolves to [`Error::QueueClosed`].
    pub async fn wait(self) -> Result<R> {
        self.receiver.await.map_err(|_| Error::QueueClosed)
    }

    /// Like [`wait`](Self::wait) but gives up with [`Error::Cancelled`] when
    /// `cancel` fires first.
    pub async fn wait_with_cancel(self, cancel: &CancellationToken) -> Result<R> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.receiver => res.map_err(|_| Error::QueueClosed),
        }
    }

    /// Non-blocking poll for a result.
    pub fn try_take(&mut self) -> Option<Result<R>> {
        match self.receiver.try_recv() {
            Ok(v) => Some(Ok(v)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::QueueClosed)),
        }
    }
}
