//! # addrsym - Native Stack Address Resolution
//!
//! addrsym turns the raw instruction addresses captured at an error or crash
//! site into symbolicated stack frames. Each address is matched against the
//! binary images (executable and shared libraries) currently mapped into the
//! process, and a platform symbol lookup names the function it falls in.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐   load / unload    ┌──────────────────────┐
//! │  Platform loader     │───────────────────▶│  BinaryImageCache    │
//! │  (platform module)   │   notifications    │  (sorted snapshots)  │
//! └──────────────────────┘                    └──────────┬───────────┘
//!                                                        │ image_by_address
//!   addresses from the          ┌────────────────────────▼───────────┐
//!   error capture site  ───────▶│           StackResolver            │
//!                               └────────────────────────┬───────────┘
//!                                                        │ address + image
//!                               ┌────────────────────────▼───────────┐
//!   SymbolLookup capability ───▶│            Symbolicator            │
//!   (dladdr, debug files, ...)  └────────────────────────┬───────────┘
//!                                                        ▼
//!                                    frames + debug-meta images
//! ```
//!
//! ## Module Structure
//!
//! - [`images`]: the image cache and the observer seam it is fed through
//! - [`platform`]: loader integrations (`dl_iterate_phdr`, `/proc/<pid>/maps`,
//!   host-forwarded notifications)
//! - [`symbolization`]: [`Symbolicator`](symbolization::Symbolicator) and the
//!   symbol lookup capabilities
//! - [`report`]: [`StackResolver`](report::StackResolver) and the debug-meta
//!   section of outgoing reports
//! - [`domain`]: `BinaryImage`, `ImageInfo` and error types
//! - [`cli`]: command-line arguments of the `addrsym` binary
//! - [`utils`]: hex-string address values
//!
//! ## Typical Usage
//!
//! ```rust,ignore
//! // At SDK initialization
//! let cache = BinaryImageCache::new(Arc::new(PollingLoader::new(ProcessImages::new())));
//! cache.start();
//!
//! // When an error is reported
//! let symbolicator = Symbolicator::default();
//! let resolver = StackResolver::new(&cache, &symbolicator);
//! let report = resolver.resolve_with_images(&addresses, &DladdrLookup);
//! ```
//!
//! Resolution is synchronous, never fails, and returns exactly one frame per
//! input address in input order.

pub mod cli;
pub mod domain;
pub mod images;
pub mod platform;
pub mod report;
pub mod symbolization;
pub mod utils;
