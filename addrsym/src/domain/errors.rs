//! Structured error types for addrsym
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of these ever escape `resolve()`; they are logged where they occur.

use super::types::Pid;
use thiserror::Error;

/// Malformed image metadata from a loader notification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image {identifier} at 0x{base_address:x} has an empty range")]
    EmptyRange { identifier: String, base_address: u64 },

    #[error("Image {identifier} at 0x{base_address:x} with size 0x{size:x} wraps the address space")]
    RangeOverflow { identifier: String, base_address: u64, size: u64 },

    #[error("Image {identifier} overlaps already loaded image {existing}")]
    Overlap { identifier: String, existing: String },
}

/// Failures of the platform's loader notification mechanism
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("Loader refused image notifications: {0}")]
    SubscriptionRefused(String),

    #[error("Failed to enumerate images of process {0}")]
    EnumerationFailed(Pid),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while preparing a symbol lookup capability
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Failed to read image file {path}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse image file {path}: {reason}")]
    ParseFailed { path: String, reason: String },
}
