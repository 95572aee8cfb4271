//! Domain types for loaded images
//!
//! `ImageInfo` is what the platform hands us; `BinaryImage` is what the cache
//! stores after validation. Keeping the two apart means a malformed loader
//! notification can never end up in the cache.

use std::fmt;

use super::errors::ImageError;

/// Identifier used for images the platform reports without a readable name
pub const UNKNOWN_IMAGE: &str = "<unknown>";

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// The current process
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Raw image metadata as delivered by a loader notification or enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: Option<String>,
    pub base_address: u64,
    pub size: u64,
    /// Hex-encoded build id, when the image file could be read
    pub code_id: Option<String>,
}

impl ImageInfo {
    pub fn new(name: impl Into<String>, base_address: u64, size: u64) -> Self {
        Self { name: Some(name.into()), base_address, size, code_id: None }
    }
}

/// A binary image (executable or shared library) mapped into the process
///
/// Covers the half-open range `[base_address, base_address + size)`.
/// Images are immutable; a changed image is an unload followed by a load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryImage {
    identifier: String,
    base_address: u64,
    size: u64,
    code_id: Option<String>,
}

impl BinaryImage {
    /// Create an image, rejecting empty or address-space-overflowing ranges
    ///
    /// # Errors
    /// Returns [`ImageError`] if `size` is zero or the range wraps past `u64::MAX`.
    pub fn new(identifier: impl Into<String>, base_address: u64, size: u64) -> Result<Self, ImageError> {
        let identifier = identifier.into();
        if size == 0 {
            return Err(ImageError::EmptyRange { identifier, base_address });
        }
        if base_address.checked_add(size).is_none() {
            return Err(ImageError::RangeOverflow { identifier, base_address, size });
        }
        Ok(Self { identifier, base_address, size, code_id: None })
    }

    #[must_use]
    pub fn with_code_id(mut self, code_id: Option<String>) -> Self {
        self.code_id = code_id;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn code_id(&self) -> Option<&str> {
        self.code_id.as_deref()
    }

    /// Exclusive end of the mapped range
    pub fn end_address(&self) -> u64 {
        // Checked at construction
        self.base_address + self.size
    }

    /// Check if an address falls within this image
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_address && addr < self.end_address()
    }

    #[must_use]
    pub fn overlaps(&self, other: &BinaryImage) -> bool {
        self.base_address < other.end_address() && other.base_address < self.end_address()
    }
}

impl TryFrom<ImageInfo> for BinaryImage {
    type Error = ImageError;

    /// Images without a usable name are kept under a placeholder identifier.
    fn try_from(info: ImageInfo) -> Result<Self, Self::Error> {
        let identifier = match info.name {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_IMAGE.to_string(),
        };
        Ok(BinaryImage::new(identifier, info.base_address, info.size)?.with_code_id(info.code_id))
    }
}

impl fmt::Display for BinaryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [0x{:x}-0x{:x})", self.identifier, self.base_address, self.end_address())
    }
}
