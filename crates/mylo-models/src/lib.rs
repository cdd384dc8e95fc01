//! Shared data models for the Mylo clip workflow engine.
//!
//! This crate provides Serde-serializable types for:
//! - Job records (uploaded source media) and their status projection
//! - Clip artifacts produced by processing
//! - Processing and edit options sent to the processing service
//! - Trigger payloads that start a workflow instance

pub mod clip;
pub mod edit;
pub mod error;
pub mod ids;
pub mod job;
pub mod options;
pub mod status;

// Re-export common types
pub use clip::{validate_segments, ClipArtifact, TranscriptSegment};
pub use edit::{EditClipRequest, EditSegment};
pub use error::{ModelError, ModelResult};
pub use ids::{ClipId, InstanceKey, JobId, OwnerId};
pub use job::{JobRecord, ProcessJobTrigger, ORIGINAL_MEDIA_SUFFIX};
pub use options::{CaptionStyle, ProcessingOptions, TransitionStyle};
pub use status::JobStatus;
