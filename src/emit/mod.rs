//! Device code emitters.
//!
//! Each emitter appends instructions through a [`DeviceBuilder`] and returns
//! the resulting value. Callers own the builder; emission is single-writer.
//!
//! [`DeviceBuilder`]: crate::ir::DeviceBuilder

pub mod device_call;
pub mod lane;
pub mod printf;
pub mod shuffle;

pub use device_call::emit_device_function_call;
pub use lane::is_block0_thread0;
pub use printf::emit_printf;
pub use shuffle::{emit_full_warp_shuffle_down, segment_count, ShufflePlan};
