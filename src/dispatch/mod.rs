//! Library-call dispatch classification.
//!
//! Decides, per HLO instruction, whether code generation hands the node to a
//! vendor routine (BLAS gemm, DNN batch norm or convolution), to the
//! dedicated reduction emitter, or to generic kernel generation.

pub mod custom_call;
pub mod gemm;
pub mod reduction;

pub use custom_call::{
    conv_kind, is_custom_call_to_dnn_batch_norm, is_custom_call_to_dnn_convolution, ConvKind,
};
pub use gemm::{are_valid_gemm_shapes, implemented_as_gemm, is_matrix_like};
pub use reduction::is_reduction_to_vector;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::LowerResult;
use crate::hlo::{HloGraph, HloInstruction, HloOp, InstrId};

/// True if `hlo` is lowered to a call into a vendor library rather than a
/// generated kernel.
pub fn implemented_as_library_call(graph: &HloGraph, hlo: &HloInstruction) -> bool {
    implemented_as_gemm(graph, hlo)
        || is_custom_call_to_dnn_batch_norm(hlo)
        || is_custom_call_to_dnn_convolution(hlo)
}

/// How code generation lowers a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoweringStrategy {
    /// BLAS gemm for a plain dot.
    Gemm,
    /// BLAS gemm with the fused multiply/add epilogue.
    FusedGemm,
    BatchNorm,
    Convolution(ConvKind),
    /// Dedicated row/column reduction kernel.
    ReductionToVector,
    /// Generated elementwise or loop kernel.
    Generic,
}

impl LoweringStrategy {
    pub fn is_library_call(self) -> bool {
        matches!(
            self,
            LoweringStrategy::Gemm
                | LoweringStrategy::FusedGemm
                | LoweringStrategy::BatchNorm
                | LoweringStrategy::Convolution(_)
        )
    }

    pub fn label(self) -> String {
        match self {
            LoweringStrategy::Gemm => "gemm".to_string(),
            LoweringStrategy::FusedGemm => "fused_gemm".to_string(),
            LoweringStrategy::BatchNorm => "batch_norm".to_string(),
            LoweringStrategy::Convolution(kind) => format!("convolution({})", kind),
            LoweringStrategy::ReductionToVector => "reduction_to_vector".to_string(),
            LoweringStrategy::Generic => "generic".to_string(),
        }
    }
}

impl fmt::Display for LoweringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Pick the lowering strategy for one instruction.
///
/// Library calls win over the reduction emitter, which wins over generic
/// code generation. Only the convolution kind conversion can fail.
///
/// # Panics
///
/// Same as [`implemented_as_gemm`].
pub fn classify_node(graph: &HloGraph, hlo: &HloInstruction) -> LowerResult<LoweringStrategy> {
    if implemented_as_gemm(graph, hlo) {
        return Ok(match hlo.op {
            HloOp::Fusion { .. } => LoweringStrategy::FusedGemm,
            _ => LoweringStrategy::Gemm,
        });
    }
    if is_custom_call_to_dnn_batch_norm(hlo) {
        return Ok(LoweringStrategy::BatchNorm);
    }
    if is_custom_call_to_dnn_convolution(hlo) {
        return Ok(LoweringStrategy::Convolution(conv_kind(hlo)?));
    }
    if is_reduction_to_vector(graph, hlo) {
        return Ok(LoweringStrategy::ReductionToVector);
    }
    Ok(LoweringStrategy::Generic)
}

/// One classified instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDecision {
    pub instr: InstrId,
    pub opcode: String,
    pub strategy: LoweringStrategy,
}

/// Counts of decisions per strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total_instructions: usize,
    pub library_calls: usize,
    pub generic: usize,
    pub by_strategy: BTreeMap<String, usize>,
}

impl DispatchSummary {
    fn record(&mut self, strategy: LoweringStrategy) {
        self.total_instructions += 1;
        if strategy.is_library_call() {
            self.library_calls += 1;
        }
        if strategy == LoweringStrategy::Generic {
            self.generic += 1;
        }
        *self.by_strategy.entry(strategy.label()).or_insert(0) += 1;
    }

    pub fn count(&self, strategy: LoweringStrategy) -> usize {
        self.by_strategy.get(&strategy.label()).copied().unwrap_or(0)
    }

    /// Fraction of instructions that became library calls, in percent.
    pub fn library_call_percent(&self) -> f64 {
        if self.total_instructions == 0 {
            return 0.0;
        }
        (self.library_calls as f64 / self.total_instructions as f64) * 100.0
    }
}

/// Result of planning a whole graph.
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    pub decisions: Vec<DispatchDecision>,
    pub summary: DispatchSummary,
}

impl DispatchPlan {
    pub fn strategy_of(&self, instr: InstrId) -> Option<LoweringStrategy> {
        self.decisions
            .iter()
            .find(|d| d.instr == instr)
            .map(|d| d.strategy)
    }

    pub fn library_calls(&self) -> impl Iterator<Item = &DispatchDecision> {
        self.decisions.iter().filter(|d| d.strategy.is_library_call())
    }
}

/// Classifies every top-level instruction of a graph.
///
/// Parameters and constants are skipped; they are never lowered on their own.
#[derive(Debug)]
pub struct DispatchPlanner {
    skip_trivial: bool,
}

impl Default for DispatchPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchPlanner {
    pub fn new() -> Self {
        Self { skip_trivial: true }
    }

    /// Also report parameters and constants (as `Generic`).
    pub fn with_trivial_nodes(mut self, include: bool) -> Self {
        self.skip_trivial = !include;
        self
    }

    pub fn plan(&self, graph: &HloGraph) -> LowerResult<DispatchPlan> {
        let mut plan = DispatchPlan::default();
        for hlo in graph.top_level() {
            if self.skip_trivial && matches!(hlo.op, HloOp::Parameter { .. } | HloOp::Constant) {
                continue;
            }
            let strategy = classify_node(graph, hlo)?;
            tracing::debug!(
                instr = %hlo.id,
                opcode = hlo.op.name(),
                strategy = %strategy,
                "dispatch decision"
            );
            plan.summary.record(strategy);
            plan.decisions.push(DispatchDecision {
                instr: hlo.id,
                opcode: hlo.op.name().to_string(),
                strategy,
            });
        }
        tracing::info!(
            total = plan.summary.total_instructions,
            library_calls = plan.summary.library_calls,
            "dispatch plan complete"
        );
        Ok(plan)
    }
}
