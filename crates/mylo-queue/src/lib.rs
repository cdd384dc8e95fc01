//! Redis Streams trigger transport.
//!
//! This crate provides:
//! - Trigger enqueueing with idempotency keys
//! - Consumer-group delivery with ack, retry counting and dead-lettering
//! - Claiming of triggers left pending by crashed workers

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
