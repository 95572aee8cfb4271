//! # Symbol Resolution
//!
//! Turns a raw instruction address into a [`StackFrame`]: the containing
//! image (from the image cache) plus, when the platform can tell us, the
//! nearest symbol and the offset into it.
//!
//! The symbol lookup itself is a capability passed in by the caller
//! ([`SymbolLookup`]), so the same [`Symbolicator`] works with:
//!
//! - **`dladdr`**: [`DladdrLookup`], in-process and allocation-light, suitable
//!   for the error reporting path
//! - **`debug_file`**: [`DebugFileLookup`], reads the symbol tables of
//!   the image files up front; used to symbolicate another process
//! - any `Fn(u64) -> Option<SymbolInfo>` closure, e.g. fixtures in tests
//!
//! ## Address Translation
//!
//! ```text
//! 1. Address captured at the fault site        0x55f3a2b4c780
//! 2. Image cache: containing image             /usr/bin/app @ 0x55f3a2b4c000
//! 3. Lookup: nearest symbol                    app::handler @ 0x55f3a2b4c700
//! 4. Frame                                     app::handler + 0x80 (/usr/bin/app)
//! ```
//!
//! A lookup result that contradicts the image cache (a symbol below the image
//! base or above the address) is discarded; the frame keeps the image fields.

#[cfg(unix)]
pub mod dladdr;
pub mod debug_file;
pub mod symbolizer;

#[cfg(unix)]
pub use dladdr::DladdrLookup;
pub use debug_file::{DebugFileLookup, ImageDebugInfo};
pub use symbolizer::{
    NoLookup, StackFrame, SymbolInfo, SymbolLookup, Symbolicator, SymbolicatorOptions, FRAME_PLATFORM,
};
