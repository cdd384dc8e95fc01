//! Record store and step journal.
//!
//! This crate provides:
//! - `RecordStore`: job records, clip artifacts and owner credit balances
//! - `StepJournal`: durable per-instance step results for replay
//! - In-memory implementations for tests and single-process use
//! - Redis implementations for the worker binary

pub mod error;
pub mod journal;
pub mod memory;
pub mod records;
pub mod redis_journal;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use journal::{InstanceOutcome, MemoryJournal, StepJournal, StepRecord};
pub use memory::InMemoryRecordStore;
pub use records::{BalanceChange, JobUpdate, RecordStore};
pub use redis_journal::RedisStepJournal;
pub use redis_store::{RedisRecordStore, RedisStoreConfig};
