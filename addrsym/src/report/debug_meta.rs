//! Debug-meta section of an outgoing error report
//!
//! A report carries, next to its frames, the list of images those frames
//! point into so the server can fetch the right debug files.

use std::collections::HashSet;

use debugid::DebugId;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::BinaryImage;
use crate::images::ImageSnapshot;
use crate::symbolization::{StackFrame, SymbolLookup};
use crate::utils::hex;

#[cfg(target_vendor = "apple")]
const IMAGE_TYPE: &str = "macho";
#[cfg(not(target_vendor = "apple"))]
const IMAGE_TYPE: &str = "elf";

const UUID_SIZE: usize = 16;

/// One entry of the debug-meta image list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugImage {
    #[serde(rename = "type")]
    pub image_type: String,

    pub code_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_id: Option<DebugId>,

    #[serde(serialize_with = "hex::serialize")]
    pub image_addr: u64,

    pub image_size: u64,

    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "hex::serialize_option")]
    pub image_vmaddr: Option<u64>,
}

impl From<&BinaryImage> for DebugImage {
    fn from(image: &BinaryImage) -> Self {
        Self {
            image_type: IMAGE_TYPE.to_string(),
            code_file: image.identifier().to_string(),
            code_id: image.code_id().map(str::to_string),
            debug_id: image.code_id().and_then(debug_id_from_code_id),
            image_addr: image.base_address(),
            image_size: image.size(),
            image_vmaddr: None,
        }
    }
}

/// Debug id of an ELF image from its hex GNU build id
///
/// The first 16 bytes of the build id form a UUID. On little endian targets
/// its first three fields are byte-swapped to match what symbol servers
/// compute from the debug file.
pub fn debug_id_from_code_id(code_id: &str) -> Option<DebugId> {
    let identifier = ::hex::decode(code_id).ok()?;
    if identifier.is_empty() {
        return None;
    }

    let mut data = [0u8; UUID_SIZE];
    let len = identifier.len().min(UUID_SIZE);
    data[..len].copy_from_slice(&identifier[..len]);

    if cfg!(target_endian = "little") {
        data[0..4].reverse();
        data[4..6].reverse();
        data[6..8].reverse();
    }

    Some(DebugId::from_uuid(Uuid::from_bytes(data)))
}

/// Resolved frames plus the images they reference, as sent across the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeStackFrames {
    pub frames: Vec<StackFrame>,
    pub debug_meta_images: Vec<DebugImage>,
}

/// Images referenced by `frames`, deduplicated, in order of first reference
///
/// Only images present in `snapshot` are listed. `image_vmaddr` is filled in
/// when `lookup` knows the image file.
pub fn debug_images<L: SymbolLookup + ?Sized>(
    frames: &[StackFrame],
    snapshot: &ImageSnapshot,
    lookup: &L,
) -> Vec<DebugImage> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for frame in frames {
        let Some(base) = frame.image_base_address else {
            continue;
        };
        if !seen.insert(base) {
            continue;
        }
        if let Some(image) = snapshot.image_by_address(base).filter(|image| image.base_address() == base) {
            let mut debug_image = DebugImage::from(image);
            debug_image.image_vmaddr = lookup.image_vmaddr(base);
            images.push(debug_image);
        }
    }

    images
}
