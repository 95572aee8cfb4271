use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use addrsym::domain::{BinaryImage, ImageInfo, UNKNOWN_IMAGE};
use addrsym::images::BinaryImageCache;
use addrsym::platform::ManualLoader;

fn two_images() -> Arc<ManualLoader> {
    Arc::new(ManualLoader::with_images([
        ImageInfo::new("libapp", 0x1000, 0x500),
        ImageInfo::new("libcore", 0x2000, 0x300),
    ]))
}

fn identifier_at(cache: &BinaryImageCache, address: u64) -> Option<String> {
    cache.image_by_address(address).map(|image| image.identifier().to_string())
}

#[test]
fn test_lookup_after_start() {
    let cache = BinaryImageCache::new(two_images());
    cache.start();

    assert_eq!(identifier_at(&cache, 0x1200).as_deref(), Some("libapp"));
    assert_eq!(identifier_at(&cache, 0x2450).as_deref(), None);
    assert_eq!(identifier_at(&cache, 0x2250).as_deref(), Some("libcore"));
    assert_eq!(identifier_at(&cache, 0x600), None);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_lookup_matches_linear_scan() {
    let images = [
        ImageInfo::new("a", 0x1000, 0x500),
        ImageInfo::new("b", 0x2000, 0x300),
        ImageInfo::new("c", 0x2300, 0x100),
        ImageInfo::new("d", 0x8000, 0x1),
    ];
    let expected: Vec<BinaryImage> =
        images.iter().cloned().map(|info| BinaryImage::try_from(info).unwrap()).collect();

    let cache = BinaryImageCache::new(Arc::new(ManualLoader::with_images(images)));
    cache.start();

    for address in (0..0x9000).step_by(0x10).chain([0x14FF, 0x1500, 0x22FF, 0x23FF, 0x2400, 0x8000, 0x8001]) {
        let linear = expected.iter().find(|image| image.contains(address)).cloned();
        assert_eq!(cache.image_by_address(address), linear, "address 0x{address:x}");
    }
}

#[test]
fn test_lookups_before_start_and_after_stop() {
    let cache = BinaryImageCache::new(two_images());
    assert!(!cache.is_started());
    assert!(cache.image_by_address(0x1200).is_none());

    cache.start();
    assert!(cache.image_by_address(0x1200).is_some());

    cache.stop();
    assert!(!cache.is_started());
    assert!(cache.image_by_address(0x1200).is_none());
    assert!(cache.image_by_address(0x2100).is_none());
    assert!(cache.snapshot().is_empty());
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let loader = two_images();
    let cache = BinaryImageCache::new(loader.clone());

    cache.start();
    cache.start();
    assert_eq!(cache.len(), 2);
    assert_eq!(loader.subscriber_count(), 1);

    cache.stop();
    cache.stop();
    assert_eq!(cache.len(), 0);
    assert_eq!(loader.subscriber_count(), 0);

    // Restarting does not leak the previous subscription
    cache.start();
    assert_eq!(loader.subscriber_count(), 1);
    cache.stop();
    assert_eq!(loader.subscriber_count(), 0);
}

#[test]
fn test_load_and_unload_events() {
    let loader = two_images();
    let cache = BinaryImageCache::new(loader.clone());
    cache.start();

    loader.load(ImageInfo::new("libplugin", 0x4000, 0x1000));
    assert_eq!(identifier_at(&cache, 0x4800).as_deref(), Some("libplugin"));

    assert!(loader.unload(0x1000));
    assert!(cache.image_by_address(0x1200).is_none());
    assert_eq!(identifier_at(&cache, 0x2100).as_deref(), Some("libcore"));

    // A new image may reuse the freed range
    loader.load(ImageInfo::new("libapp2", 0x1000, 0x800));
    assert_eq!(identifier_at(&cache, 0x1700).as_deref(), Some("libapp2"));
}

#[test]
fn test_events_while_stopped_are_not_applied() {
    let loader = two_images();
    let cache = BinaryImageCache::new(loader.clone());
    loader.load(ImageInfo::new("early", 0x4000, 0x100));
    assert!(cache.image_by_address(0x4000).is_none());

    cache.start();
    cache.stop();
    loader.load(ImageInfo::new("late", 0x6000, 0x100));
    assert!(cache.image_by_address(0x6000).is_none());
}

#[test]
fn test_restart_only_restores_loaded_images() {
    let loader = two_images();
    let cache = BinaryImageCache::new(loader.clone());
    cache.start();
    cache.stop();

    // libapp goes away while nobody is listening
    loader.unload(0x1000);
    cache.start();

    assert!(cache.image_by_address(0x1200).is_none());
    assert_eq!(identifier_at(&cache, 0x2100).as_deref(), Some("libcore"));
}

#[test]
fn test_overlapping_load_is_rejected() {
    let loader = two_images();
    let cache = BinaryImageCache::new(loader.clone());
    cache.start();

    loader.load(ImageInfo::new("intruder", 0x1400, 0x200));
    loader.load(ImageInfo::new("same-base", 0x2000, 0x10));

    assert_eq!(identifier_at(&cache, 0x1450).as_deref(), Some("libapp"));
    assert!(cache.image_by_address(0x1550).is_none());
    assert_eq!(identifier_at(&cache, 0x2005).as_deref(), Some("libcore"));
    assert_eq!(cache.len(), 2);

    // Ranges stay disjoint
    let snapshot = cache.snapshot();
    for pair in snapshot.images().windows(2) {
        assert!(pair[0].end_address() <= pair[1].base_address());
    }
}

#[test]
fn test_malformed_images_do_not_stop_enumeration() {
    let loader = Arc::new(ManualLoader::with_images([
        ImageInfo { name: None, base_address: 0x1000, size: 0x100, code_id: None },
        ImageInfo::new("empty", 0x2000, 0),
        ImageInfo::new("wraps", u64::MAX - 0x10, 0x100),
        ImageInfo::new("libcore", 0x3000, 0x100),
    ]));
    let cache = BinaryImageCache::new(loader.clone());
    cache.start();

    assert_eq!(identifier_at(&cache, 0x1010).as_deref(), Some(UNKNOWN_IMAGE));
    assert!(cache.image_by_address(0x2000).is_none());
    assert_eq!(identifier_at(&cache, 0x3010).as_deref(), Some("libcore"));
    assert_eq!(cache.len(), 2);

    // Malformed notifications are skipped the same way
    loader.load(ImageInfo::new("empty-again", 0x5000, 0));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_refused_subscription_degrades_to_not_found() {
    let loader = two_images();
    loader.set_refuse_subscriptions(true);
    let cache = BinaryImageCache::new(loader.clone());

    cache.start();
    assert!(!cache.is_started());
    assert!(cache.image_by_address(0x1200).is_none());

    loader.set_refuse_subscriptions(false);
    cache.start();
    assert!(cache.is_started());
    assert!(cache.image_by_address(0x1200).is_some());
}

#[test]
fn test_drop_unsubscribes() {
    let loader = two_images();
    {
        let cache = BinaryImageCache::new(loader.clone());
        cache.start();
        assert_eq!(loader.subscriber_count(), 1);
    }
    assert_eq!(loader.subscriber_count(), 0);
}

#[test]
fn test_concurrent_lookups_never_see_torn_state() {
    let loader = two_images();
    let cache = Arc::new(BinaryImageCache::new(loader.clone()));
    cache.start();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    // Stable images are always visible
                    let app = cache.image_by_address(0x1200).expect("libapp stays loaded");
                    assert_eq!(app.size(), 0x500);

                    // The flapping image is either fully there or absent
                    if let Some(image) = cache.image_by_address(0x5100) {
                        assert_eq!(image.identifier(), "libflap");
                        assert_eq!(image.base_address(), 0x5000);
                        assert_eq!(image.size(), 0x200);
                    }

                    let snapshot = cache.snapshot();
                    for pair in snapshot.images().windows(2) {
                        assert!(pair[0].end_address() <= pair[1].base_address());
                    }
                }
            })
        })
        .collect();

    for _ in 0..2000 {
        loader.load(ImageInfo::new("libflap", 0x5000, 0x200));
        loader.unload(0x5000);
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(cache.image_by_address(0x5100).is_none());
}
