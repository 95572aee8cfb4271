//! Platform integrations that feed the image cache
//!
//! | Source | Where images come from | Notifications |
//! |--------|------------------------|---------------|
//! | [`ManualLoader`] | pushed by the host (e.g. forwarded dyld callbacks) | immediate |
//! | [`PollingLoader`] + [`ProcessImages`] | `dl_iterate_phdr` in this process | on `poll()` |
//! | [`PollingLoader`] + [`ProcMaps`] | `/proc/<pid>/maps` of any process | on `poll()` |
//!
//! Linux has no loader callbacks, so the Linux enumerators are wrapped in a
//! [`PollingLoader`] which diffs successive enumerations into load/unload events.

pub mod manual;
pub mod memory_maps;
pub mod polling;

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
pub mod dl_phdr;

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use object::Object;
use parking_lot::Mutex;

use crate::domain::ImageInfo;
use crate::images::{ImageLoadObserver, SubscriptionId};

pub use manual::ManualLoader;
pub use memory_maps::ProcMaps;
pub use polling::{ImageEnumerator, PollingLoader};

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
pub use dl_phdr::ProcessImages;

/// Read the GNU build id of an image file as lowercase hex
///
/// Returns `None` if the file is unreadable, not an object file, or has no build id.
pub fn read_code_id(path: &Path) -> Option<String> {
    let data = fs::read(path).ok()?;
    let file = object::File::parse(&*data).ok()?;
    let build_id = match file.build_id() {
        Ok(Some(id)) if !id.is_empty() => id,
        _ => {
            debug!("No build id in {}", path.display());
            return None;
        }
    };

    let mut hex = String::with_capacity(build_id.len() * 2);
    for byte in build_id {
        let _ = write!(hex, "{byte:02x}");
    }
    Some(hex)
}

/// Observers registered with a source
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn ImageLoadObserver>)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ImageLoadObserver>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) {
        self.observers.retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    /// Clone the observer list so events are delivered without holding the lock
    pub(crate) fn current(subscribers: &Mutex<Self>) -> Vec<Arc<dyn ImageLoadObserver>> {
        subscribers.lock().observers.iter().map(|(_, observer)| Arc::clone(observer)).collect()
    }
}

pub(crate) fn notify_loaded(observers: &[Arc<dyn ImageLoadObserver>], info: &ImageInfo) {
    for observer in observers {
        observer.on_image_loaded(info.clone());
    }
}

pub(crate) fn notify_unloaded(observers: &[Arc<dyn ImageLoadObserver>], base_address: u64) {
    for observer in observers {
        observer.on_image_unloaded(base_address);
    }
}
