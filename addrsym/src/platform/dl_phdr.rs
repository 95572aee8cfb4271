//! Images of the current process via `dl_iterate_phdr(3)`

#![allow(unsafe_code)] // dl_iterate_phdr is a C callback API

use std::ffi::CStr;
use std::path::Path;

use super::polling::ImageEnumerator;
use super::read_code_id;
use crate::domain::{ImageInfo, ObserverError};

const PAGE_SIZE: u64 = 0x1000;

/// Enumerates the executable and shared libraries mapped into this process
#[derive(Debug, Clone, Copy)]
pub struct ProcessImages {
    read_code_ids: bool,
}

impl ProcessImages {
    pub fn new() -> Self {
        Self { read_code_ids: true }
    }

    #[must_use]
    pub fn without_code_ids(mut self) -> Self {
        self.read_code_ids = false;
        self
    }

    /// List the loaded images
    ///
    /// The loader lock is held during iteration, so build ids are read only
    /// after it returns.
    pub fn loaded_images(&self) -> Vec<ImageInfo> {
        let mut images: Vec<ImageInfo> = Vec::new();
        unsafe {
            libc::dl_iterate_phdr(Some(callback), std::ptr::addr_of_mut!(images).cast());
        }

        if self.read_code_ids {
            for image in &mut images {
                image.code_id = image.name.as_deref().and_then(|name| read_code_id(Path::new(name)));
            }
        }
        images
    }
}

impl Default for ProcessImages {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEnumerator for ProcessImages {
    fn enumerate_images(&self) -> Result<Vec<ImageInfo>, ObserverError> {
        Ok(self.loaded_images())
    }
}

unsafe extern "C" fn callback(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut libc::c_void,
) -> libc::c_int {
    let images = &mut *data.cast::<Vec<ImageInfo>>();
    let info = &*info;

    // The main executable is reported first, with an empty name
    let name = if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
        if images.is_empty() {
            std::env::current_exe().ok().and_then(|exe| exe.to_str().map(str::to_string))
        } else {
            None
        }
    } else {
        Some(CStr::from_ptr(info.dlpi_name).to_string_lossy().into_owned())
    };

    let headers: &[libc::Elf64_Phdr] = if info.dlpi_phdr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum))
    };

    let mut start = u64::MAX;
    let mut end = 0u64;
    for header in headers.iter().filter(|h| h.p_type == libc::PT_LOAD) {
        start = start.min(header.p_vaddr);
        end = end.max(header.p_vaddr.saturating_add(header.p_memsz));
    }

    // Page-aligned like the first mapping in /proc/<pid>/maps
    start &= !(PAGE_SIZE - 1);

    // No loadable segment: reported with an empty range and rejected by the cache
    let (base_address, size) = if start < end {
        (info.dlpi_addr.wrapping_add(start), end - start)
    } else {
        (info.dlpi_addr, 0)
    };

    images.push(ImageInfo { name, base_address, size, code_id: None });
    0
}
