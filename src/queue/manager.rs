//! Bounded work queue.

use super::item::{QueueItem, ResultHandle};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
    /// Size of the (external) worker pool; reported, not enforced.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            workers: 5,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_size(mut self, s: usize) -> Self {
        self.max_size = s;
        self
    }
    pub fn with_workers(mut self, w: usize) -> Self {
        self.workers = w;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let field = if self.max_size == 0 {
            "max_size"
        } else if self.workers == 0 {
            "workers"
        } else {
            return Ok(());
        };
        Err(Error::configuration_with_context(
            format!("invalid queue {}", field),
            ErrorContext::new()
                .with_field_path(format!("queue.{}", field))
                .with_source("queue_config"),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub processed_count: u64,
    pub max_queue_size: usize,
    pub workers: usize,
    pub closed: bool,
}

struct State<P, R> {
    items: VecDeque<QueueItem<P, R>>,
    closed: bool,
}

/// Bounded FIFO of pending backend calls.
///
/// Producers enqueue without blocking (or with
/// [`enqueue_wait`](Self::enqueue_wait) when they can afford to wait); a
/// worker pool drains it with [`recv`](Self::recv), [`try_pop`](Self::try_pop)
/// or [`drain`](Self::drain).
pub struct WorkQueue<P, R> {
    config: QueueConfig,
    state: Mutex<State<P, R>>,
    /// Woken when capacity frees up or the queue closes.
    space: Notify,
    /// Woken when an item arrives or the queue closes.
    available: Notify,
    processed: Arc<AtomicU64>,
}

impl<P, R> WorkQueue<P, R> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(config.max_size),
                closed: false,
            }),
            config,
            space: Notify::new(),
            available: Notify::new(),
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State<P, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_push(
        &self,
        payload: P,
        context: &CancellationToken,
    ) -> std::result::Result<ResultHandle<R>, (Error, P)> {
        let mut st = self.lock();
        if st.closed {
            return Err((Error::QueueClosed, payload));
        }
        if st.items.len() >= self.config.max_size {
            return Err((
                Error::QueueFull {
                    capacity: self.config.max_size,
                },
                payload,
            ));
        }
        let (item, handle) =
            QueueItem::new(payload, context.clone(), Arc::clone(&self.processed));
        st.items.push_back(item);
        let queue_length = st.items.len();
        drop(st);

        self.available.notify_waiters();
        tracing::debug!(
            item_id = %handle.id(),
            queue_length,
            max_queue_size = self.config.max_size,
            "request enqueued"
        );
        Ok(handle)
    }

    /// Append `payload` without waiting. Fails with `QueueFull` at capacity
    /// and `QueueClosed` after [`close`](Self::close).
    pub fn enqueue(&self, payload: P) -> Result<ResultHandle<R>> {
        self.enqueue_with_context(payload, CancellationToken::new())
    }

    /// Like [`enqueue`](Self::enqueue), attaching the caller's cancellation
    /// context so workers can skip abandoned work.
    pub fn enqueue_with_context(
        &self,
        payload: P,
        context: CancellationToken,
    ) -> Result<ResultHandle<R>> {
        self.try_push(payload, &context).map_err(|(e, _)| {
            if let Error::QueueFull { capacity } = e {
                tracing::warn!(capacity, "work queue full");
            }
            e
        })
    }

    /// Wait for capacity. Returns `Cancelled` as soon as `cancel` fires and
    /// `QueueClosed` if the queue closes while waiting.
    pub async fn enqueue_wait(
        &self,
        payload: P,
        cancel: &CancellationToken,
    ) -> Result<ResultHandle<R>> {
        let mut payload = payload;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // Register interest before checking so a slot freed in between
            // is not missed.
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(payload, cancel) {
                Ok(handle) => return Ok(handle),
                Err((Error::QueueFull { .. }, p)) => payload = p,
                Err((e, _)) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    pub fn try_pop(&self) -> Option<QueueItem<P, R>> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.space.notify_waiters();
        }
        item
    }

    /// Take every pending item in FIFO order.
    pub fn drain(&self) -> Vec<QueueItem<P, R>> {
        let items: Vec<_> = self.lock().items.drain(..).collect();
        if !items.is_empty() {
            self.space.notify_waiters();
        }
        items
    }

    /// Wait for the next item. Returns `None` once the queue is closed and
    /// empty; items queued before close are still handed out.
    pub async fn recv(&self) -> Option<QueueItem<P, R>> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.lock();
                if let Some(item) = st.items.pop_front() {
                    drop(st);
                    self.space.notify_waiters();
                    return Some(item);
                }
                if st.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting items and release blocked producers and idle consumers.
    pub fn close(&self) {
        let pending = {
            let mut st = self.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            st.items.len()
        };
        self.space.notify_waiters();
        self.available.notify_waiters();
        tracing::info!(
            pending,
            processed = self.processed.load(Ordering::Relaxed),
            "work queue closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.max_size
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> QueueStatus {
        let st = self.lock();
        QueueStatus {
            queue_length: st.items.len(),
            processed_count: self.processed.load(Ordering::Relaxed),
            max_queue_size: self.config.max_size,
            workers: self.config.workers,
            closed: st.closed,
        }
    }
}
