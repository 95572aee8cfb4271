//! Seam between the image cache and the platform's dynamic loader
//!
//! The platform side implements [`ImageSource`]: it can list the images that
//! are already mapped and it can push later load/unload events to an
//! [`ImageLoadObserver`]. The cache registers its own observer on `start()`.

use std::sync::Arc;

use crate::domain::{ImageInfo, ObserverError};

/// Receiver of loader notifications
///
/// Implementations must tolerate events for images they do not know about.
pub trait ImageLoadObserver: Send + Sync {
    fn on_image_loaded(&self, image: ImageInfo);

    /// `base_address` identifies the image being removed.
    fn on_image_unloaded(&self, base_address: u64);
}

/// Handle returned by [`ImageSource::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A platform's dynamic loader
pub trait ImageSource: Send + Sync {
    /// All images mapped right now, in no particular order
    fn enumerate(&self) -> Vec<ImageInfo>;

    /// Deliver future load/unload events to `observer`
    ///
    /// # Errors
    /// Returns [`ObserverError`] if the platform refuses to deliver notifications.
    fn subscribe(&self, observer: Arc<dyn ImageLoadObserver>) -> Result<SubscriptionId, ObserverError>;

    /// Stop delivering events to a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
