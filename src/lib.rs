//! rocmlower - AMD GPU lowering decisions and device code emitters
//!
//! Decides which HLO operations are handed to vendor libraries (rocBLAS
//! GEMM, MIOpen convolution and batch norm) and which reductions lower to
//! the row-reduction kernel, and emits the small device code sequences the
//! AMDGPU backend needs: device library calls, full-wavefront shuffles,
//! `printf` and the single-lane predicate.

#![allow(clippy::needless_range_loop)] // Clearer for lane and segment loops
#![allow(clippy::collapsible_else_if)] // Sometimes clearer for control flow
#![allow(clippy::collapsible_if)] // Sometimes clearer for control flow
#![allow(clippy::let_and_return)] // Sometimes clearer for debugging
#![allow(clippy::type_complexity)] // Per-lane value tables

pub mod dispatch;
pub mod emit;
pub mod error;
pub mod hlo;
pub mod ir;
pub mod logging;
pub mod target;

pub use dispatch::{
    implemented_as_gemm, implemented_as_library_call, is_reduction_to_vector, DispatchPlan,
    DispatchPlanner, DispatchSummary, LoweringStrategy,
};
pub use emit::{emit_device_function_call, emit_full_warp_shuffle_down, emit_printf, is_block0_thread0};
pub use error::{ErrorCategory, LowerError, LowerResult};
pub use hlo::{HloGraph, InstrId, PrimitiveType, Shape};
pub use ir::{DeviceBuilder, DeviceModule, InstructionBuilder, IrType, WavefrontSimulator};
pub use target::{BackendConfig, GpuArchitecture};
