//! Stack trace resolution
//!
//! Entry point for error capture: a list of instruction addresses in, one
//! frame per address out, in the same order. Resolution never fails; an
//! address nobody knows about comes back as a frame with only its address.

use log::debug;

use super::debug_meta::{debug_images, NativeStackFrames};
use crate::images::{BinaryImageCache, ImageSnapshot};
use crate::symbolization::{StackFrame, SymbolLookup, Symbolicator};

/// Stack trace resolver - ties the image cache to the symbolicator
///
/// Holds no state of its own: resolving the same addresses against the same
/// cache contents and lookup yields the same frames.
pub struct StackResolver<'a> {
    cache: &'a BinaryImageCache,
    symbolicator: &'a Symbolicator,
}

impl<'a> StackResolver<'a> {
    pub fn new(cache: &'a BinaryImageCache, symbolicator: &'a Symbolicator) -> Self {
        Self { cache, symbolicator }
    }

    /// Resolve addresses into frames, one per address, in input order
    ///
    /// All addresses are resolved against a single snapshot of the image cache.
    pub fn resolve<L: SymbolLookup + ?Sized>(&self, addresses: &[u64], lookup: &L) -> Vec<StackFrame> {
        let snapshot = self.cache.snapshot();
        resolve_in_snapshot(&snapshot, self.symbolicator, addresses, lookup)
    }

    /// Resolve addresses and collect the debug images the frames reference
    pub fn resolve_with_images<L: SymbolLookup + ?Sized>(&self, addresses: &[u64], lookup: &L) -> NativeStackFrames {
        let snapshot = self.cache.snapshot();
        let frames = resolve_in_snapshot(&snapshot, self.symbolicator, addresses, lookup);
        let debug_meta_images = debug_images(&frames, &snapshot, lookup);
        NativeStackFrames { frames, debug_meta_images }
    }
}

/// Resolve addresses against a fixed image set
pub fn resolve_in_snapshot<L: SymbolLookup + ?Sized>(
    snapshot: &ImageSnapshot,
    symbolicator: &Symbolicator,
    addresses: &[u64],
    lookup: &L,
) -> Vec<StackFrame> {
    let frames: Vec<StackFrame> = addresses
        .iter()
        .map(|&address| symbolicator.symbolicate(address, snapshot.image_by_address(address), lookup))
        .collect();

    debug!(
        "Resolved {} addresses against {} images ({} unresolved)",
        frames.len(),
        snapshot.len(),
        frames.iter().filter(|frame| frame.is_unresolved()).count()
    );
    frames
}
