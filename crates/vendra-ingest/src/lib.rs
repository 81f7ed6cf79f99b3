//! Webhook ingestion queue.
//!
//! Inbound marketplace notifications are persisted exactly once (dedup on
//! the event identity), then driven by a bounded-concurrency worker
//! through fetch, AI dispatch, and persisted result, with exponential
//! backoff and terminal-failure recording. Events that already carry a
//! result are never re-dispatched.

pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod worker;

pub use error::{HandlerError, IngestError};
pub use handlers::{ClaimHandler, QuestionHandler};
pub use pipeline::HttpAnswerPipeline;
pub use queue::{EnqueueOutcome, IngestQueue};
pub use registry::{HandlerRegistry, TopicHandler};
pub use worker::{IngestWorker, WorkerConfig};
