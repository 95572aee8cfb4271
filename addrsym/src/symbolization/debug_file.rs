//! Symbol lookup from the symbol tables of the image files on disk
//!
//! Works for any process whose images we can read, which makes it the lookup
//! for `--pid` symbolication. Everything is loaded up front in
//! [`DebugFileLookup::load`], so `lookup()` is an in-memory search. Debug
//! info sections are never read; only the symbol table is.
//!
//! Runtime addresses are translated to file addresses before searching:
//!
//! ```text
//! file address = runtime address - image base + image vmaddr
//! ```
//!
//! where `image vmaddr` is the page-aligned address of the first loadable
//! segment (0 for position independent images).

use std::fs;
use std::path::Path;

use log::{debug, warn};
use object::{Object, ObjectSegment};

use super::symbolizer::{SymbolInfo, SymbolLookup};
use crate::domain::{BinaryImage, LookupError};
use crate::images::ImageSnapshot;

const PAGE_SIZE: u64 = 0x1000;

/// Symbol table of one image file
#[derive(Debug, Clone)]
pub struct ImageDebugInfo {
    vmaddr: u64,
    /// (file address, raw name), sorted by address
    symbols: Vec<(u64, String)>,
}

impl ImageDebugInfo {
    /// Load the symbol table of an object file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed. An empty symbol table is not an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|source| LookupError::ReadFailed { path: path.display().to_string(), source })?;
        let obj_file = object::File::parse(&*data).map_err(|e| LookupError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let vmaddr = obj_file.segments().map(|segment| segment.address()).min().unwrap_or(0) & !(PAGE_SIZE - 1);

        let symbols: Vec<(u64, String)> = obj_file
            .symbol_map()
            .symbols()
            .iter()
            .map(|symbol| (symbol.address(), symbol.name().to_string()))
            .collect();

        debug!("Read {} symbols from {}", symbols.len(), path.display());
        Ok(Self { vmaddr, symbols })
    }

    /// Symbols from another source, as (file address, raw name) pairs
    pub fn from_symbols(vmaddr: u64, symbols: impl IntoIterator<Item = (u64, String)>) -> Self {
        let mut symbols: Vec<_> = symbols.into_iter().collect();
        symbols.sort_by_key(|(address, _)| *address);
        Self { vmaddr, symbols }
    }

    pub fn vmaddr(&self) -> u64 {
        self.vmaddr
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Nearest symbol at or below a file address
    pub fn symbol_at(&self, file_address: u64) -> Option<(u64, &str)> {
        let index = match self.symbols.binary_search_by_key(&file_address, |(address, _)| *address) {
            Ok(i) => i,
            Err(0) => return None,
            Err(insertion_index) => insertion_index - 1,
        };
        let (address, name) = &self.symbols[index];
        Some((*address, name.as_str()))
    }
}

/// [`SymbolLookup`] over the files of every image in a snapshot
pub struct DebugFileLookup {
    /// Sorted by base address, as in the snapshot
    images: Vec<(BinaryImage, ImageDebugInfo)>,
}

impl DebugFileLookup {
    /// Open every image of the snapshot; unreadable images are skipped
    pub fn load(snapshot: &ImageSnapshot) -> Self {
        let mut images = Vec::new();
        for image in snapshot.images() {
            match ImageDebugInfo::open(image.identifier()) {
                Ok(info) => images.push((image.clone(), info)),
                Err(e) => warn!("No symbols for {image}: {e}"),
            }
        }
        debug!("Loaded symbols for {} of {} images", images.len(), snapshot.len());
        Self { images }
    }

    /// Use already opened debug info
    pub fn from_parts(parts: impl IntoIterator<Item = (BinaryImage, ImageDebugInfo)>) -> Self {
        let mut images: Vec<_> = parts.into_iter().collect();
        images.sort_by_key(|(image, _)| image.base_address());
        Self { images }
    }

    pub fn loaded_images(&self) -> usize {
        self.images.len()
    }

    fn find(&self, address: u64) -> Option<&(BinaryImage, ImageDebugInfo)> {
        let index = match self.images.binary_search_by_key(&address, |(image, _)| image.base_address()) {
            Ok(i) => i,
            Err(0) => return None,
            Err(insertion_index) => insertion_index - 1,
        };
        let entry = &self.images[index];
        entry.0.contains(address).then_some(entry)
    }
}

impl SymbolLookup for DebugFileLookup {
    fn lookup(&self, address: u64) -> Option<SymbolInfo> {
        let (image, debug_info) = self.find(address)?;
        let base = image.base_address();
        let file_address = address - base + debug_info.vmaddr();

        let mut info = SymbolInfo {
            module_base: base,
            module_path: Some(image.identifier().to_string()),
            symbol_address: None,
            symbol_name: None,
        };

        if let Some((symbol_file_address, name)) = debug_info.symbol_at(file_address) {
            info.symbol_address =
                symbol_file_address.checked_sub(debug_info.vmaddr()).and_then(|offset| base.checked_add(offset));
            info.symbol_name = Some(name.to_string());
        }

        Some(info)
    }

    fn image_vmaddr(&self, base_address: u64) -> Option<u64> {
        let index = self.images.binary_search_by_key(&base_address, |(image, _)| image.base_address()).ok()?;
        Some(self.images[index].1.vmaddr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = ImageDebugInfo::open("/nonexistent/libnothing.so");
        assert!(matches!(result, Err(LookupError::ReadFailed { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), b"\x7fELF but not really").unwrap();
        let result = ImageDebugInfo::open(file.path());
        assert!(matches!(result, Err(LookupError::ParseFailed { .. })));
    }

    #[test]
    fn test_lookup_outside_images() {
        let lookup = DebugFileLookup::from_parts(Vec::new());
        assert!(lookup.lookup(0x1000).is_none());
        assert_eq!(lookup.loaded_images(), 0);
    }

    #[test]
    fn test_lookup_below_first_symbol_names_module_only() {
        let image = BinaryImage::new("/lib/libapp.so", 0x7000_0000, 0x10000).unwrap();
        let info = ImageDebugInfo::from_symbols(
            0x40_0000,
            [(0x40_2000, "app_main".to_string()), (0x40_1000, "app_init".to_string())],
        );
        let lookup = DebugFileLookup::from_parts([(image, info)]);

        let inside = lookup.lookup(0x7000_1010).unwrap();
        assert_eq!(inside.module_base, 0x7000_0000);
        assert_eq!(inside.symbol_address, Some(0x7000_1000));
        assert_eq!(inside.symbol_name.as_deref(), Some("app_init"));

        let before = lookup.lookup(0x7000_0010).unwrap();
        assert_eq!(before.module_path.as_deref(), Some("/lib/libapp.so"));
        assert!(before.symbol_address.is_none());
        assert!(before.symbol_name.is_none());

        assert_eq!(lookup.image_vmaddr(0x7000_0000), Some(0x40_0000));
    }
}
