//! Template defaults extraction and prompt graph construction for
//! batch-queueing ComfyUI image jobs.
//!
//! Pure transformations only: parsing of already-loaded JSON documents,
//! no file or network I/O.

pub mod asset;
pub mod error;
pub mod prompt;
pub mod template;
pub mod types;
