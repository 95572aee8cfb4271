//! Assembling resolved stacks for outgoing error reports
//!
//! - `stack_resolver`: addresses → ordered [`StackFrame`](crate::symbolization::StackFrame)s
//! - `debug_meta`: the images those frames reference

pub mod debug_meta;
pub mod stack_resolver;

pub use debug_meta::{debug_id_from_code_id, debug_images, DebugImage, NativeStackFrames};
pub use stack_resolver::{resolve_in_snapshot, StackResolver};
