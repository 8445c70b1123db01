//! HLO instructions.
//!
//! Each opcode the dispatch classifier cares about is its own `HloOp` case
//! carrying only the fields relevant to it. Everything else is `Other`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hlo::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(pub usize);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// How a fusion's body is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionKind {
    /// Elementwise loop over the output.
    Loop,
    /// Fused into the consumer of a reduction.
    Input,
    /// Elementwise epilogue fused onto a producer such as a dot.
    Output,
    Custom,
}

/// Contracting and batch dimensions of a dot product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DotDimensionNumbers {
    #[serde(default)]
    pub lhs_contracting_dimensions: Vec<usize>,
    #[serde(default)]
    pub rhs_contracting_dimensions: Vec<usize>,
    #[serde(default)]
    pub lhs_batch_dimensions: Vec<usize>,
    #[serde(default)]
    pub rhs_batch_dimensions: Vec<usize>,
}

impl DotDimensionNumbers {
    /// Plain (batched) matrix multiply: `batch` leading batch dimensions,
    /// then `[m, k] x [k, n]`.
    pub fn matmul(batch: usize) -> Self {
        Self {
            lhs_contracting_dimensions: vec![batch + 1],
            rhs_contracting_dimensions: vec![batch],
            lhs_batch_dimensions: (0..batch).collect(),
            rhs_batch_dimensions: (0..batch).collect(),
        }
    }

    pub fn batch_dimensions_size(&self) -> usize {
        self.lhs_batch_dimensions.len()
    }
}

/// Opcode plus opcode-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "opcode", rename_all = "kebab-case")]
pub enum HloOp {
    Parameter { number: usize },
    Constant,
    Add,
    Multiply,
    Dot(DotDimensionNumbers),
    Fusion { kind: FusionKind, fused_root: InstrId },
    Reduce { dimensions: Vec<usize> },
    CustomCall { target: String },
    /// Opcodes that are opaque to dispatch classification.
    Other { name: String },
}

impl HloOp {
    pub fn name(&self) -> &str {
        match self {
            HloOp::Parameter { .. } => "parameter",
            HloOp::Constant => "constant",
            HloOp::Add => "add",
            HloOp::Multiply => "multiply",
            HloOp::Dot(_) => "dot",
            HloOp::Fusion { .. } => "fusion",
            HloOp::Reduce { .. } => "reduce",
            HloOp::CustomCall { .. } => "custom-call",
            HloOp::Other { name } => name,
        }
    }

    pub fn is_dot(&self) -> bool {
        matches!(self, HloOp::Dot(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HloInstruction {
    pub id: InstrId,
    #[serde(flatten)]
    pub op: HloOp,
    #[serde(default)]
    pub operands: Vec<InstrId>,
    pub shape: Shape,
}

impl HloInstruction {
    pub fn operand_id(&self, index: usize) -> Option<InstrId> {
        self.operands.get(index).copied()
    }

    /// Call target string, for custom calls only.
    pub fn custom_call_target(&self) -> Option<&str> {
        match &self.op {
            HloOp::CustomCall { target } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for HloInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} {}(", self.id, self.shape, self.op.name())?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", operand)?;
        }
        write!(f, ")")?;
        match &self.op {
            HloOp::CustomCall { target } => write!(f, ", custom_call_target=\"{}\"", target),
            HloOp::Fusion { kind, fused_root } => {
                write!(f, ", kind={:?}, root={}", kind, fused_root)
            }
            HloOp::Reduce { dimensions } => write!(f, ", dimensions={:?}", dimensions),
            _ => Ok(()),
        }
    }
}
