//! Target-specific names for SIMT intrinsics.

/// Per-lane hardware coordinates the emitted code can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimtIntrinsic {
    ThreadIdX,
    ThreadIdY,
    ThreadIdZ,
    BlockIdX,
    BlockIdY,
    BlockIdZ,
}

impl SimtIntrinsic {
    pub const ALL: [SimtIntrinsic; 6] = [
        SimtIntrinsic::ThreadIdX,
        SimtIntrinsic::ThreadIdY,
        SimtIntrinsic::ThreadIdZ,
        SimtIntrinsic::BlockIdX,
        SimtIntrinsic::BlockIdY,
        SimtIntrinsic::BlockIdZ,
    ];

    pub fn is_thread_id(self) -> bool {
        matches!(
            self,
            SimtIntrinsic::ThreadIdX | SimtIntrinsic::ThreadIdY | SimtIntrinsic::ThreadIdZ
        )
    }

    /// Axis index, 0 for x through 2 for z.
    pub fn axis(self) -> usize {
        match self {
            SimtIntrinsic::ThreadIdX | SimtIntrinsic::BlockIdX => 0,
            SimtIntrinsic::ThreadIdY | SimtIntrinsic::BlockIdY => 1,
            SimtIntrinsic::ThreadIdZ | SimtIntrinsic::BlockIdZ => 2,
        }
    }
}

/// Target-specific names the emitters need.
pub trait TargetMachineFeatures: Send + Sync {
    /// Intrinsic returning the given coordinate as `i32`.
    fn simt_intrinsic(&self, kind: SimtIntrinsic) -> &'static str;

    /// Device-library routine `i32 (i32 value, i32 offset)` returning
    /// `value` as seen by lane `lane + offset`.
    fn lane_read_up_function(&self) -> &'static str;

    /// Device printf routine, `i32 (i8* format, i8* args)`.
    fn printf_function(&self) -> &'static str {
        "vprintf"
    }

    /// Reverse lookup of [`simt_intrinsic`](Self::simt_intrinsic).
    fn classify_intrinsic(&self, name: &str) -> Option<SimtIntrinsic> {
        SimtIntrinsic::ALL
            .into_iter()
            .find(|&kind| self.simt_intrinsic(kind) == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AmdgpuMachineFeatures;

impl TargetMachineFeatures for AmdgpuMachineFeatures {
    fn simt_intrinsic(&self, kind: SimtIntrinsic) -> &'static str {
        match kind {
            SimtIntrinsic::ThreadIdX => "llvm.amdgcn.workitem.id.x",
            SimtIntrinsic::ThreadIdY => "llvm.amdgcn.workitem.id.y",
            SimtIntrinsic::ThreadIdZ => "llvm.amdgcn.workitem.id.z",
            SimtIntrinsic::BlockIdX => "llvm.amdgcn.workgroup.id.x",
            SimtIntrinsic::BlockIdY => "llvm.amdgcn.workgroup.id.y",
            SimtIntrinsic::BlockIdZ => "llvm.amdgcn.workgroup.id.z",
        }
    }

    fn lane_read_up_function(&self) -> &'static str {
        "__ockl_readuplane_i32"
    }
}
