//! Host-driven loader notifications
//!
//! Used when the embedding runtime already receives loader callbacks (for
//! example dyld's add/remove image hooks on Apple platforms) and forwards them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{notify_loaded, notify_unloaded, Subscribers};
use crate::domain::{ImageInfo, ObserverError};
use crate::images::{ImageLoadObserver, ImageSource, SubscriptionId};

#[derive(Default)]
pub struct ManualLoader {
    images: Mutex<Vec<ImageInfo>>,
    subscribers: Mutex<Subscribers>,
    refuse_subscriptions: AtomicBool,
}

impl ManualLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader with images that are already mapped before anyone subscribes
    pub fn with_images(images: impl IntoIterator<Item = ImageInfo>) -> Self {
        Self { images: Mutex::new(images.into_iter().collect()), ..Self::default() }
    }

    /// Record a newly mapped image and notify subscribers
    pub fn load(&self, info: ImageInfo) {
        self.images.lock().push(info.clone());
        notify_loaded(&Subscribers::current(&self.subscribers), &info);
    }

    /// Remove the image at `base_address` and notify subscribers
    ///
    /// Returns whether an image was mapped there.
    pub fn unload(&self, base_address: u64) -> bool {
        let removed = {
            let mut images = self.images.lock();
            let before = images.len();
            images.retain(|image| image.base_address != base_address);
            images.len() != before
        };
        notify_unloaded(&Subscribers::current(&self.subscribers), base_address);
        removed
    }

    /// Make future `subscribe()` calls fail, as a platform without notifications would
    pub fn set_refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl ImageSource for ManualLoader {
    fn enumerate(&self) -> Vec<ImageInfo> {
        self.images.lock().clone()
    }

    fn subscribe(&self, observer: Arc<dyn ImageLoadObserver>) -> Result<SubscriptionId, ObserverError> {
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(ObserverError::SubscriptionRefused("notifications disabled".to_string()));
        }
        Ok(self.subscribers.lock().add(observer))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(id);
    }
}
