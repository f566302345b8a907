//! Serialized asynchronous task queue.
//!
//! A [`SerialQueue`] funnels work submitted from any number of concurrent callers
//! through a single worker, so that tasks never overlap and always run in the
//! order they were admitted. State shared between tasks needs no further
//! coordination as long as every mutation of it is submitted to the same queue.
//!
//! ```no_run
//! # async fn demo() -> Result<(), lexi_queue::QueueError> {
//! use lexi_queue::{QueueConfig, SerialQueue};
//!
//! let queue = SerialQueue::new(QueueConfig::default())?;
//! let done = queue.enqueue(|| async { Ok::<_, std::io::Error>(()) });
//! queue.wait_until_empty().await;
//! assert!(done.await.is_ok());
//! # Ok(())
//! # }
//! ```

mod completion;
mod config;
mod drain;
mod error;
mod queue;

pub use completion::Completion;
pub use config::{config_schema_json, validate_toml, QueueConfig, ENV_QUEUE_NAME, ENV_SLOW_WARN_MS};
pub use drain::Drained;
pub use error::{QueueError, TaskError};
pub use queue::{QueueState, QueueStats, SerialQueue};
