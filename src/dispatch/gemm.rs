//! GEMM eligibility: which dots (and dot-plus-epilogue fusions) can be
//! handed to the vendor BLAS instead of a generated kernel.

use crate::hlo::{DotDimensionNumbers, FusionKind, HloGraph, HloInstruction, HloOp, PrimitiveType, Shape};

/// A shape is matrix-like when it has exactly two dimensions beyond the
/// leading batch dimensions.
pub fn is_matrix_like(shape: &Shape, batch_dimensions_size: usize) -> bool {
    shape.rank() == batch_dimensions_size + 2
}

/// Output element types the BLAS entry points accept.
pub fn is_gemm_element_type(ty: PrimitiveType) -> bool {
    matches!(
        ty,
        PrimitiveType::F16
            | PrimitiveType::F32
            | PrimitiveType::F64
            | PrimitiveType::C64
            | PrimitiveType::C128
    )
}

/// In a gemm `output = lhs * rhs`, check whether the shapes are acceptable:
/// all three matrix-like for the same batch count, an allowed output type,
/// and no zero-element operand.
pub fn are_valid_gemm_shapes(
    lhs: &Shape,
    rhs: &Shape,
    output: &Shape,
    batch_dimensions_size: usize,
) -> bool {
    is_gemm_element_type(output.element_type())
        && is_matrix_like(lhs, batch_dimensions_size)
        && is_matrix_like(rhs, batch_dimensions_size)
        && is_matrix_like(output, batch_dimensions_size)
        && !lhs.is_zero_element()
        && !rhs.is_zero_element()
}

/// # Panics
///
/// Panics if the shapes are gemm-eligible but the contracting extents of the
/// two operands differ. Shape inference guarantees they match, so a mismatch
/// is a compiler bug and continuing would produce wrong numerics.
fn dot_implemented_as_gemm(graph: &HloGraph, dot: &HloInstruction, dnums: &DotDimensionNumbers) -> bool {
    let (lhs, rhs) = match (graph.operand(dot, 0), graph.operand(dot, 1)) {
        (Some(lhs), Some(rhs)) => (lhs, rhs),
        _ => return false,
    };

    if !are_valid_gemm_shapes(&lhs.shape, &rhs.shape, &dot.shape, dnums.batch_dimensions_size()) {
        return false;
    }

    let (lhs_contracting, rhs_contracting) = match (
        dnums.lhs_contracting_dimensions.first(),
        dnums.rhs_contracting_dimensions.first(),
    ) {
        (Some(&l), Some(&r)) => (l, r),
        // outer product: nothing for the BLAS call to contract
        _ => {
            tracing::trace!(instr = %dot.id, "dot without contracting dimension");
            return false;
        }
    };

    let (lhs_extent, rhs_extent) = match (
        lhs.shape.dimension(lhs_contracting),
        rhs.shape.dimension(rhs_contracting),
    ) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            tracing::trace!(
                instr = %dot.id,
                lhs_contracting,
                rhs_contracting,
                "contracting dimension out of range"
            );
            return false;
        }
    };
    assert_eq!(
        lhs_extent, rhs_extent,
        "contracting dimensions of {} disagree: lhs {} dim {} vs rhs {} dim {}",
        dot.id, lhs.shape, lhs_contracting, rhs.shape, rhs_contracting
    );
    true
}

/// The dot feeding an output fusion's multiply/add root.
///
/// Operand 0 of the root is checked before operand 1 and the scan stops at
/// the first dot, whether or not that dot turns out to be gemm-eligible.
pub fn find_fused_dot<'g>(graph: &'g HloGraph, fusion: &HloInstruction) -> Option<&'g HloInstruction> {
    let root = graph.fused_root(fusion)?;
    match root.op {
        HloOp::Multiply | HloOp::Add => {}
        _ => return None,
    }
    (0..2)
        .filter_map(|index| graph.operand(root, index))
        .find(|operand| operand.op.is_dot())
}

/// True if `hlo` is a dot, or an output fusion wrapping one, that can be
/// lowered to a BLAS gemm call.
///
/// # Panics
///
/// See [`dot_implemented_as_gemm`]: an eligible dot with mismatched
/// contracting extents aborts.
pub fn implemented_as_gemm(graph: &HloGraph, hlo: &HloInstruction) -> bool {
    match &hlo.op {
        HloOp::Dot(dnums) => dot_implemented_as_gemm(graph, hlo, dnums),
        HloOp::Fusion {
            kind: FusionKind::Output,
            ..
        } => match find_fused_dot(graph, hlo) {
            Some(dot) => match &dot.op {
                HloOp::Dot(dnums) => dot_implemented_as_gemm(graph, dot, dnums),
                _ => false,
            },
            None => false,
        },
        HloOp::Fusion { .. }
        | HloOp::Parameter { .. }
        | HloOp::Constant
        | HloOp::Add
        | HloOp::Multiply
        | HloOp::Reduce { .. }
        | HloOp::CustomCall { .. }
        | HloOp::Other { .. } => false,
    }
}
