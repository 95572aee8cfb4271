// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use log::debug;
use rustc_demangle::try_demangle;
use serde::{Deserialize, Serialize};

use crate::domain::BinaryImage;
use crate::utils::hex;

/// What a platform symbol lookup knows about an address
///
/// Mirrors `dladdr(3)`: the containing module is always known on success,
/// the symbol only sometimes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolInfo {
    pub module_base: u64,
    pub module_path: Option<String>,
    pub symbol_address: Option<u64>,
    pub symbol_name: Option<String>,
}

/// Symbol lookup capability supplied by the platform layer
///
/// Any `Fn(u64) -> Option<SymbolInfo>` closure is a lookup, which keeps
/// fixtures in tests short.
pub trait SymbolLookup {
    fn lookup(&self, address: u64) -> Option<SymbolInfo>;

    /// Preferred load address of the image file based at `base_address`
    ///
    /// Only lookups that read image files know it; it ends up as
    /// `image_vmaddr` in the report's debug-meta section.
    fn image_vmaddr(&self, _base_address: u64) -> Option<u64> {
        None
    }
}

impl<F> SymbolLookup for F
where
    F: Fn(u64) -> Option<SymbolInfo>,
{
    fn lookup(&self, address: u64) -> Option<SymbolInfo> {
        self(address)
    }
}

/// A lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl SymbolLookup for NoLookup {
    fn lookup(&self, _address: u64) -> Option<SymbolInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolicatorOptions {
    /// Demangle Rust symbol names; other names pass through unchanged
    pub demangle: bool,
}

impl Default for SymbolicatorOptions {
    fn default() -> Self {
        Self { demangle: true }
    }
}

/// Turns one instruction address into a [`StackFrame`]
///
/// Stateless: the same address, image and lookup always give the same frame.
#[derive(Debug, Clone, Default)]
pub struct Symbolicator {
    options: SymbolicatorOptions,
}

impl Symbolicator {
    pub fn new(options: SymbolicatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SymbolicatorOptions {
        self.options
    }

    /// Symbolicate `address`, which the image cache placed in `image`
    ///
    /// Always returns a frame for `address`. Without a containing image the
    /// lookup is not consulted and the frame is unresolved. Lookup results
    /// that contradict the image are dropped rather than reported.
    pub fn symbolicate<L: SymbolLookup + ?Sized>(
        &self,
        address: u64,
        image: Option<&BinaryImage>,
        lookup: &L,
    ) -> StackFrame {
        // Outside every known image the frame carries nothing but its address
        let Some(image) = image else {
            return StackFrame::unresolved(address);
        };

        let mut frame = StackFrame::unresolved(address);
        frame.image_identifier = Some(image.identifier().to_string());
        frame.image_base_address = Some(image.base_address());

        let Some(info) = lookup.lookup(address) else {
            return frame;
        };

        if info.module_base != image.base_address() {
            debug!("Lookup placed 0x{address:x} in module at 0x{:x}, cache says {image}", info.module_base);
        }
        let lower_bound = image.base_address();

        let name = info.symbol_name.filter(|n| !n.is_empty()).map(|n| self.symbol_name(&n));
        match info.symbol_address {
            Some(symbol_address) if (lower_bound..=address).contains(&symbol_address) => {
                frame.symbol_address = Some(symbol_address);
                frame.offset_in_symbol = Some(address - symbol_address);
                frame.symbol_name = name;
            }
            Some(symbol_address) => {
                debug!("Discarding symbol at 0x{symbol_address:x} for 0x{address:x}: outside image");
            }
            None => frame.symbol_name = name,
        }

        frame
    }

    fn symbol_name(&self, raw: &str) -> String {
        if !self.options.demangle {
            return raw.to_string();
        }
        match try_demangle(raw) {
            Ok(demangled) => format!("{demangled:#}"),
            Err(_) => raw.to_string(),
        }
    }
}

/// Platform tag carried by every native frame
#[cfg(target_vendor = "apple")]
pub const FRAME_PLATFORM: &str = "cocoa";
#[cfg(not(target_vendor = "apple"))]
pub const FRAME_PLATFORM: &str = "native";

/// One frame of a resolved stack, serialized in the native frame format
/// (`platform`, `instruction_addr`, `package`, `image_addr`, `function`, `symbol_addr`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub platform: &'static str,

    #[serde(rename = "instruction_addr", serialize_with = "hex::serialize")]
    pub instruction_address: u64,

    #[serde(rename = "function", skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,

    #[serde(rename = "package", skip_serializing_if = "Option::is_none")]
    pub image_identifier: Option<String>,

    #[serde(rename = "image_addr", skip_serializing_if = "Option::is_none", serialize_with = "hex::serialize_option")]
    pub image_base_address: Option<u64>,

    #[serde(rename = "symbol_addr", skip_serializing_if = "Option::is_none", serialize_with = "hex::serialize_option")]
    pub symbol_address: Option<u64>,

    #[serde(skip)]
    pub offset_in_symbol: Option<u64>,
}

impl StackFrame {
    /// A frame that carries nothing but its address
    pub fn unresolved(instruction_address: u64) -> Self {
        Self {
            platform: FRAME_PLATFORM,
            instruction_address,
            symbol_name: None,
            image_identifier: None,
            image_base_address: None,
            symbol_address: None,
            offset_in_symbol: None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.image_identifier.is_none() && self.symbol_name.is_none() && self.symbol_address.is_none()
    }

    /// Format the frame for display
    #[must_use]
    pub fn format(&self, frame_num: usize) -> String {
        let mut output = format!("#{frame_num:<2} 0x{:016x} ", self.instruction_address);

        match (&self.symbol_name, self.offset_in_symbol) {
            (Some(name), Some(offset)) => output.push_str(&format!("{name} + 0x{offset:x}")),
            (Some(name), None) => output.push_str(name),
            (None, _) => output.push_str("<unknown>"),
        }

        if let Some(ref image) = self.image_identifier {
            output.push_str(&format!(" ({image})"));
        }

        output
    }
}
