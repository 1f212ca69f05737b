//! Work queue driven by a worker pool

use ai_gate::queue::{QueueConfig, WorkQueue};
use ai_gate::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn spawn_workers(
    queue: &Arc<WorkQueue<u64, u64>>,
    count: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let queue = Arc::clone(queue);
            tokio::spawn(async move {
                while let Some(item) = queue.recv().await {
                    if item.is_cancelled() {
                        continue;
                    }
                    let n = item.payload;
                    item.complete(n * n);
                }
            })
        })
        .collect()
}

#[tokio::test]
async fn test_worker_pool_answers_every_item() {
    let config = QueueConfig::new().with_max_size(64).with_workers(4);
    let queue: Arc<WorkQueue<u64, u64>> = Arc::new(WorkQueue::new(config.clone()));
    let workers = spawn_workers(&queue, config.workers);

    let handles: Vec<_> = (0..32u64)
        .map(|n| queue.enqueue(n).unwrap())
        .collect();
    for (n, handle) in (0..32u64).zip(handles) {
        assert_eq!(handle.wait().await.unwrap(), n * n);
    }
    assert_eq!(queue.processed_count(), 32);

    queue.close();
    for w in workers {
        w.await.unwrap();
    }
    let status = queue.status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.processed_count, 32);
    assert_eq!(status.workers, 4);
    assert!(status.closed);
}

#[tokio::test]
async fn test_full_queue_rejects_then_accepts_after_drain() {
    let queue: WorkQueue<u64, u64> = WorkQueue::new(QueueConfig::new().with_max_size(2));
    let _a = assert_ok!(queue.enqueue(1));
    let _b = assert_ok!(queue.enqueue(2));
    let err = assert_err!(queue.enqueue(3));
    assert!(matches!(err, Error::QueueFull { capacity: 2 }));
    assert_eq!(err.standard_code().code(), "E3001");

    let drained = queue.drain();
    assert_eq!(
        drained.iter().map(|i| i.payload).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_ok!(queue.enqueue(3));
}

#[tokio::test]
async fn test_blocked_producer_wakes_when_space_frees() {
    let queue: Arc<WorkQueue<u64, u64>> =
        Arc::new(WorkQueue::new(QueueConfig::new().with_max_size(1)));
    let _first = queue.enqueue(1).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            queue.enqueue_wait(2, &cancel).await.map(|h| h.id())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    let item = queue.try_pop().unwrap();
    assert_eq!(item.payload, 1);
    let waited = tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("producer should wake")
        .unwrap();
    assert_ok!(waited);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_blocked_producer_unblocks_on_cancel_and_close() {
    let queue: Arc<WorkQueue<u64, u64>> =
        Arc::new(WorkQueue::new(QueueConfig::new().with_max_size(1)));
    let _first = queue.enqueue(1).unwrap();

    let cancel = CancellationToken::new();
    let cancelled = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.enqueue_wait(2, &cancel).await.map(|_| ()) })
    };
    let closed = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue
                .enqueue_wait(3, &CancellationToken::new())
                .await
                .map(|_| ())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    cancel.cancel();
    assert!(matches!(cancelled.await.unwrap(), Err(Error::Cancelled)));

    queue.close();
    assert!(matches!(closed.await.unwrap(), Err(Error::QueueClosed)));

    // Already queued work survives close.
    assert_eq!(queue.try_pop().map(|i| i.payload), Some(1));
    assert!(queue.recv().await.is_none());
}

#[tokio::test]
async fn test_unanswered_item_reports_closed() {
    let queue: WorkQueue<u64, u64> = WorkQueue::new(QueueConfig::default());
    let handle = queue.enqueue(7).unwrap();
    queue.close();
    drop(queue.drain());
    assert!(matches!(handle.wait().await, Err(Error::QueueClosed)));
}
