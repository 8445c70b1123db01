//! Device instruction model.
//!
//! Emitters write through the [`DeviceBuilder`] trait. The crate's own
//! implementation, [`InstructionBuilder`], records a typed SSA instruction
//! list that can be printed or run lane by lane in [`WavefrontSimulator`].

pub mod builder;
pub mod module;
pub mod sim;
pub mod types;

pub use builder::{DeviceBuilder, Instruction, InstructionBuilder, InstructionKind};
pub use module::{DeviceModule, FnAttribute, FunctionDecl, GlobalString};
pub use sim::{LaneId, LaunchDims, PrintRecord, SimValue, SimulationResult, WavefrontSimulator};
pub use types::{primitive_to_ir_type, FunctionType, IrType};

use std::fmt;

/// Handle to a value produced by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

/// A materialized value together with its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceValue {
    pub id: ValueId,
    pub ty: IrType,
}

impl DeviceValue {
    pub fn bit_width(&self) -> Option<u32> {
        self.ty.bit_width()
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.id)
    }
}
