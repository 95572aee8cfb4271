//! In-process symbol lookup via `dladdr(3)`
//!
//! Only sees the dynamic symbol table, so static functions resolve to their
//! module without a name. Never allocates beyond the returned strings and
//! never blocks on I/O.

#![allow(unsafe_code)] // dladdr is a C API

use std::ffi::{c_char, CStr};

use super::symbolizer::{SymbolInfo, SymbolLookup};

#[derive(Debug, Clone, Copy, Default)]
pub struct DladdrLookup;

impl SymbolLookup for DladdrLookup {
    fn lookup(&self, address: u64) -> Option<SymbolInfo> {
        let address = usize::try_from(address).ok()?;
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };

        if unsafe { libc::dladdr(address as *const libc::c_void, &mut info) } == 0 {
            return None;
        }

        let symbol_address = (!info.dli_saddr.is_null()).then(|| info.dli_saddr as usize as u64);
        Some(SymbolInfo {
            module_base: info.dli_fbase as usize as u64,
            module_path: unsafe { owned_c_str(info.dli_fname) },
            symbol_address,
            symbol_name: unsafe { owned_c_str(info.dli_sname) },
        })
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn owned_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}
