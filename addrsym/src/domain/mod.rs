//! Domain model for addrsym
//!
//! This module contains core domain types and errors that provide:
//! - Validated image metadata (`ImageInfo` → `BinaryImage`)
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{BinaryImage, ImageInfo, Pid, UNKNOWN_IMAGE};

pub use errors::{ImageError, LookupError, ObserverError};
