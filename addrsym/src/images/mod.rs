//! Tracking of the binary images mapped into a process
//!
//! - **`cache`**: [`BinaryImageCache`] and its copy-on-write [`ImageSnapshot`]
//! - **`observer`**: the [`ImageLoadObserver`] / [`ImageSource`] seam the
//!   platform integrations in [`crate::platform`] plug into

pub mod cache;
pub mod observer;

pub use cache::{BinaryImageCache, ImageSnapshot};
pub use observer::{ImageLoadObserver, ImageSource, SubscriptionId};
