//! Media-side collaborators of the workflow engine.
//!
//! This crate provides:
//! - `ProcessingClient`: the external processing service (process + edit)
//! - `ClipDescriptor`: structured clip metadata returned by processing
//! - `MediaLibrary`: listing of derived media, backed by Cloudinary
//!   or held in memory

pub mod descriptor;
pub mod error;
pub mod library;
pub mod metrics;
pub mod processing;

pub use descriptor::ClipDescriptor;
pub use error::{MediaError, MediaResult};
pub use library::{CloudinaryLibrary, InMemoryLibrary, LibraryConfig, MediaLibrary};
pub use processing::{EditClipResponse, ProcessResponse, ProcessingClient, ProcessingConfig};
