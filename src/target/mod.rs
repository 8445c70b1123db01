//! AMDGPU target description: architecture, intrinsic names and backend
//! configuration.

pub mod arch;
pub mod config;
pub mod features;

pub use arch::GpuArchitecture;
pub use config::{BackendConfig, CodegenOptLevel, InlinerPolicy, PassPipeline};
pub use features::{AmdgpuMachineFeatures, SimtIntrinsic, TargetMachineFeatures};
