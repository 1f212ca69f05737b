//! 工作队列模块：有界、线程安全的后端调用缓冲区。
//!
//! # Work Queue Module
//!
//! Holds pending backend calls between admission and the worker pool that
//! talks to the generation backend. The queue only stores and reports; the
//! worker pool itself lives with the caller.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`WorkQueue`] | Bounded FIFO with non-blocking and cancellation-aware enqueue |
//! | [`QueueItem`] | Payload, caller context and single-use reply channel |
//! | [`ResultHandle`] | Producer's side of the reply channel |
//! | [`QueueStatus`] | Occupancy and throughput snapshot |
//!
//! ## Example
//!
//! ```rust
//! use ai_gate::queue::{QueueConfig, WorkQueue};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> ai_gate::Result<()> {
//! let queue: Arc<WorkQueue<String, String>> =
//!     Arc::new(WorkQueue::new(QueueConfig::new().with_max_size(10)));
//!
//! let worker = {
//!     let queue = Arc::clone(&queue);
//!     tokio::spawn(async move {
//!         while let Some(item) = queue.recv().await {
//!             let answer = item.payload.to_uppercase();
//!             item.complete(answer);
//!         }
//!     })
//! };
//!
//! let handle = queue.enqueue("hello".to_string())?;
//! assert_eq!(handle.wait().await?, "HELLO");
//!
//! queue.close();
//! worker.await.unwrap();
//! # Ok(())
//! # }
//! ```

mod item;
mod manager;

pub use item::{QueueItem, Reply, ResultHandle};
pub use manager::{QueueConfig, QueueStatus, WorkQueue};
