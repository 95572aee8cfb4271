//! Address-range cache of the binary images loaded into a process
//!
//! Images are kept sorted by base address in an immutable, reference-counted
//! slice. Writers (loader notifications) build a new slice and swap it in;
//! readers clone the `Arc` under a short read lock and search without holding
//! any lock, so a lookup sees either the old or the new image set, never a mix.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use super::observer::{ImageLoadObserver, ImageSource, SubscriptionId};
use crate::domain::{BinaryImage, ImageError, ImageInfo};

/// Immutable view of the image set, sorted by base address
#[derive(Debug, Clone, Default)]
pub struct ImageSnapshot {
    images: Arc<[BinaryImage]>,
}

impl ImageSnapshot {
    /// Build a snapshot from unordered images, dropping any that overlap
    /// an image accepted before them.
    pub fn from_images(images: impl IntoIterator<Item = BinaryImage>) -> Self {
        let mut sorted: Vec<BinaryImage> = Vec::new();
        for image in images {
            if let Err(e) = insert_sorted(&mut sorted, image) {
                warn!("Skipping image: {e}");
            }
        }
        Self { images: sorted.into() }
    }

    /// Find the image whose range contains `addr`
    ///
    /// Binary search for the greatest base address `<= addr`, then a range check.
    pub fn image_by_address(&self, addr: u64) -> Option<&BinaryImage> {
        let index = match self.images.binary_search_by_key(&addr, BinaryImage::base_address) {
            Ok(i) => i,
            Err(0) => return None,
            Err(insertion_index) => insertion_index - 1,
        };
        let image = &self.images[index];
        image.contains(addr).then_some(image)
    }

    pub fn images(&self) -> &[BinaryImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// A new snapshot with `image` added; `Ok(None)` if it is already present
    fn with_image(&self, image: BinaryImage) -> Result<Option<Self>, ImageError> {
        if self.images.iter().any(|existing| *existing == image) {
            return Ok(None);
        }
        let mut images = self.images.to_vec();
        insert_sorted(&mut images, image)?;
        Ok(Some(Self { images: images.into() }))
    }

    /// A new snapshot without the image based at `base_address`
    fn without_image(&self, base_address: u64) -> Option<(Self, BinaryImage)> {
        let index = self.images.binary_search_by_key(&base_address, BinaryImage::base_address).ok()?;
        let mut images = self.images.to_vec();
        let removed = images.remove(index);
        Some((Self { images: images.into() }, removed))
    }
}

fn insert_sorted(images: &mut Vec<BinaryImage>, image: BinaryImage) -> Result<(), ImageError> {
    let index = match images.binary_search_by_key(&image.base_address(), BinaryImage::base_address) {
        Ok(i) => {
            return Err(ImageError::Overlap {
                identifier: image.identifier().to_string(),
                existing: images[i].to_string(),
            })
        }
        Err(i) => i,
    };

    // Only the neighbours can overlap in a sorted, overlap-free list
    let previous = index.checked_sub(1).map(|i| &images[i]);
    if let Some(existing) = previous.into_iter().chain(images.get(index)).find(|e| e.overlaps(&image)) {
        return Err(ImageError::Overlap {
            identifier: image.identifier().to_string(),
            existing: existing.to_string(),
        });
    }

    images.insert(index, image);
    Ok(())
}

#[derive(Debug, Default)]
struct State {
    /// Session whose observer may mutate `images`
    session: Option<u64>,
    /// False until the initial enumeration has been merged
    queryable: bool,
    images: ImageSnapshot,
}

#[derive(Debug, Default)]
struct Shared {
    /// Serializes writers so no update is lost between clone and swap
    writer: Mutex<()>,
    state: RwLock<State>,
}

impl Shared {
    fn snapshot(&self) -> ImageSnapshot {
        let state = self.state.read();
        if state.queryable {
            state.images.clone()
        } else {
            ImageSnapshot::default()
        }
    }

    fn add(&self, session: u64, image: BinaryImage) {
        let _writer = self.writer.lock();
        let current = {
            let state = self.state.read();
            if state.session != Some(session) {
                debug!("Ignoring load of {image} from a finished session");
                return;
            }
            state.images.clone()
        };

        match current.with_image(image) {
            Ok(Some(next)) => self.state.write().images = next,
            Ok(None) => {}
            Err(e) => warn!("Rejected image load: {e}"),
        }
    }

    fn remove(&self, session: u64, base_address: u64) {
        let _writer = self.writer.lock();
        let current = {
            let state = self.state.read();
            if state.session != Some(session) {
                return;
            }
            state.images.clone()
        };

        match current.without_image(base_address) {
            Some((next, removed)) => {
                debug!("Image unloaded: {removed}");
                self.state.write().images = next;
            }
            None => debug!("Unload of unknown image at 0x{base_address:x}"),
        }
    }

    fn open(&self, session: u64) {
        let _writer = self.writer.lock();
        *self.state.write() = State { session: Some(session), queryable: false, images: ImageSnapshot::default() };
    }

    /// Merge the initial enumeration and make the cache queryable
    fn publish(&self, session: u64, enumerated: Vec<BinaryImage>) {
        let _writer = self.writer.lock();
        let mut images = self.state.read().images.clone();
        for image in enumerated {
            match images.with_image(image) {
                Ok(Some(next)) => images = next,
                Ok(None) => {}
                Err(e) => warn!("Skipping enumerated image: {e}"),
            }
        }

        let mut state = self.state.write();
        if state.session == Some(session) {
            state.images = images;
            state.queryable = true;
        }
    }

    fn clear(&self) {
        let _writer = self.writer.lock();
        *self.state.write() = State::default();
    }
}

/// Observer registered with the platform for one `start()`..`stop()` session
struct CacheObserver {
    shared: Arc<Shared>,
    session: u64,
}

impl ImageLoadObserver for CacheObserver {
    fn on_image_loaded(&self, info: ImageInfo) {
        match BinaryImage::try_from(info) {
            Ok(image) => {
                debug!("Image loaded: {image}");
                self.shared.add(self.session, image);
            }
            Err(e) => warn!("Skipping malformed image: {e}"),
        }
    }

    fn on_image_unloaded(&self, base_address: u64) {
        self.shared.remove(self.session, base_address);
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    subscription: Option<SubscriptionId>,
    sessions: u64,
}

/// Cache of the binary images currently mapped into a process
///
/// Constructed once during SDK initialization and passed by reference to the
/// [`StackResolver`](crate::report::StackResolver). Lookups return `None`
/// unless the cache is started.
pub struct BinaryImageCache {
    source: Arc<dyn ImageSource>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl BinaryImageCache {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self { source, shared: Arc::new(Shared::default()), lifecycle: Mutex::new(Lifecycle::default()) }
    }

    /// Enumerate loaded images and start following loader notifications
    ///
    /// No-op if already started. If the platform refuses notifications the
    /// cache stays stopped and every lookup returns `None`.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.started {
            return;
        }

        lifecycle.sessions += 1;
        let session = lifecycle.sessions;
        self.shared.open(session);

        // Subscribe before enumerating so an unload racing the enumeration is not missed
        let observer = Arc::new(CacheObserver { shared: Arc::clone(&self.shared), session });
        let subscription = match self.source.subscribe(observer) {
            Ok(id) => id,
            Err(e) => {
                warn!("Image cache disabled: {e}");
                self.shared.clear();
                return;
            }
        };

        let enumerated: Vec<BinaryImage> = self
            .source
            .enumerate()
            .into_iter()
            .filter_map(|info| match BinaryImage::try_from(info) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Skipping malformed image: {e}");
                    None
                }
            })
            .collect();
        self.shared.publish(session, enumerated);

        lifecycle.subscription = Some(subscription);
        lifecycle.started = true;
        info!("Image cache started with {} images", self.shared.snapshot().len());
    }

    /// Stop following loader notifications and forget all images
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.started {
            return;
        }

        if let Some(id) = lifecycle.subscription.take() {
            self.source.unsubscribe(id);
        }
        self.shared.clear();
        lifecycle.started = false;
        info!("Image cache stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.lock().started
    }

    /// The image containing `address`, or `None` (always `None` while stopped)
    pub fn image_by_address(&self, address: u64) -> Option<BinaryImage> {
        self.shared.snapshot().image_by_address(address).cloned()
    }

    /// A consistent view of the current image set; empty while stopped
    pub fn snapshot(&self) -> ImageSnapshot {
        self.shared.snapshot()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Drop for BinaryImageCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, base: u64, size: u64) -> BinaryImage {
        BinaryImage::new(name, base, size).unwrap()
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = ImageSnapshot::from_images([image("libcore", 0x2000, 0x300), image("libapp", 0x1000, 0x500)]);

        assert_eq!(snapshot.image_by_address(0x1000).unwrap().identifier(), "libapp");
        assert_eq!(snapshot.image_by_address(0x14FF).unwrap().identifier(), "libapp");
        assert!(snapshot.image_by_address(0x1500).is_none());
        assert_eq!(snapshot.image_by_address(0x2000).unwrap().identifier(), "libcore");
        assert!(snapshot.image_by_address(0x2300).is_none());
        assert!(snapshot.image_by_address(0x0).is_none());
        assert!(snapshot.image_by_address(u64::MAX).is_none());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let snapshot = ImageSnapshot::from_images([
            image("c", 0x3000, 0x10),
            image("a", 0x1000, 0x10),
            image("b", 0x2000, 0x10),
        ]);
        let bases: Vec<u64> = snapshot.images().iter().map(BinaryImage::base_address).collect();
        assert_eq!(bases, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_overlapping_images_are_rejected() {
        let snapshot = ImageSnapshot::from_images([
            image("first", 0x1000, 0x1000),
            image("same-base", 0x1000, 0x10),
            image("tail-overlap", 0x1800, 0x1000),
            image("head-overlap", 0x800, 0x900),
            image("adjacent", 0x2000, 0x10),
        ]);

        let names: Vec<&str> = snapshot.images().iter().map(BinaryImage::identifier).collect();
        assert_eq!(names, vec!["first", "adjacent"]);
    }

    #[test]
    fn test_with_image_duplicate_is_noop() {
        let snapshot = ImageSnapshot::from_images([image("libapp", 0x1000, 0x500)]);
        assert!(snapshot.with_image(image("libapp", 0x1000, 0x500)).unwrap().is_none());
        assert!(snapshot.with_image(image("other", 0x1000, 0x500)).is_err());
    }

    #[test]
    fn test_without_image() {
        let snapshot = ImageSnapshot::from_images([image("libapp", 0x1000, 0x500), image("libcore", 0x2000, 0x300)]);

        let (next, removed) = snapshot.without_image(0x1000).unwrap();
        assert_eq!(removed.identifier(), "libapp");
        assert_eq!(next.len(), 1);
        assert!(next.image_by_address(0x1200).is_none());
        // The source snapshot is untouched
        assert!(snapshot.image_by_address(0x1200).is_some());

        assert!(snapshot.without_image(0x1200).is_none());
    }

    #[test]
    fn test_stale_session_events_are_ignored() {
        let shared = Shared::default();
        shared.open(1);
        shared.publish(1, vec![image("libapp", 0x1000, 0x500)]);

        shared.add(2, image("libcore", 0x2000, 0x300));
        shared.remove(2, 0x1000);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.image_by_address(0x1200).is_some());
    }

    #[test]
    fn test_not_queryable_before_publish() {
        let shared = Shared::default();
        shared.open(1);
        shared.add(1, image("libapp", 0x1000, 0x500));
        assert!(shared.snapshot().is_empty());

        shared.publish(1, Vec::new());
        assert_eq!(shared.snapshot().len(), 1);
    }
}
