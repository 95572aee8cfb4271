//! Loader notifications synthesized by diffing enumerations
//!
//! Platforms without load/unload callbacks only let us list what is mapped
//! right now. `PollingLoader` remembers the previous listing and turns the
//! difference into events: unloads first, so an address range freed by an
//! unload is available to a load reported by the same poll.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use super::{notify_loaded, notify_unloaded, Subscribers};
use crate::domain::{ImageInfo, ObserverError};
use crate::images::{ImageLoadObserver, ImageSource, SubscriptionId};

/// Lists the images currently mapped into a process
pub trait ImageEnumerator: Send + Sync {
    /// # Errors
    /// Returns [`ObserverError`] if the image list cannot be read at all.
    fn enumerate_images(&self) -> Result<Vec<ImageInfo>, ObserverError>;
}

pub struct PollingLoader<E> {
    enumerator: E,
    known: Mutex<Vec<ImageInfo>>,
    subscribers: Mutex<Subscribers>,
}

impl<E: ImageEnumerator> PollingLoader<E> {
    pub fn new(enumerator: E) -> Self {
        Self { enumerator, known: Mutex::new(Vec::new()), subscribers: Mutex::new(Subscribers::default()) }
    }

    /// Re-enumerate and deliver the changes since the previous enumeration
    ///
    /// Returns the number of events delivered to each subscriber. A failed
    /// enumeration delivers nothing and keeps the previous listing.
    pub fn poll(&self) -> usize {
        let Some(current) = self.list() else {
            return 0;
        };
        let (unloaded, loaded) = {
            let mut known = self.known.lock();
            let unloaded: Vec<u64> = known
                .iter()
                .filter(|old| !current.contains(old))
                .map(|old| old.base_address)
                .collect();
            let loaded: Vec<ImageInfo> =
                current.iter().filter(|new| !known.contains(new)).cloned().collect();
            *known = current;
            (unloaded, loaded)
        };

        let observers = Subscribers::current(&self.subscribers);
        for base_address in &unloaded {
            notify_unloaded(&observers, *base_address);
        }
        for info in &loaded {
            notify_loaded(&observers, info);
        }

        let events = unloaded.len() + loaded.len();
        if events > 0 {
            debug!("Poll found {} unloaded and {} loaded images", unloaded.len(), loaded.len());
        }
        events
    }

    pub fn enumerator(&self) -> &E {
        &self.enumerator
    }

    fn list(&self) -> Option<Vec<ImageInfo>> {
        match self.enumerator.enumerate_images() {
            Ok(images) => Some(images),
            Err(e) => {
                warn!("Image enumeration failed: {e}");
                None
            }
        }
    }
}

impl<E: ImageEnumerator> ImageSource for PollingLoader<E> {
    fn enumerate(&self) -> Vec<ImageInfo> {
        let Some(images) = self.list() else {
            return Vec::new();
        };
        self.known.lock().clone_from(&images);
        images
    }

    fn subscribe(&self, observer: Arc<dyn ImageLoadObserver>) -> Result<SubscriptionId, ObserverError> {
        Ok(self.subscribers.lock().add(observer))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(id);
    }
}
