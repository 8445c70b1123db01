//! HLO graph model consumed by the dispatch classifier.

pub mod graph;
pub mod instruction;
pub mod shape;

pub use graph::HloGraph;
pub use instruction::{DotDimensionNumbers, FusionKind, HloInstruction, HloOp, InstrId};
pub use shape::{Layout, PrimitiveType, Shape};
