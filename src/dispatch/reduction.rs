//! Reduction-to-vector detection.
//!
//! A reduce qualifies when the dimensions it keeps sit next to each other in
//! memory and the output is exactly the input with the reduced dimensions
//! dropped. Such reductions get the dedicated row/column reduction emitter.

use crate::hlo::{HloGraph, HloInstruction, HloOp};

/// Dimensions of a rank-`rank` input not listed in `reduced`, ascending.
pub fn kept_dimensions(rank: usize, reduced: &[usize]) -> Vec<usize> {
    (0..rank).filter(|dim| !reduced.contains(dim)).collect()
}

/// True if `reduce` collapses its input to a vector of layout-contiguous
/// kept dimensions. Any other opcode is not a reduction to vector.
pub fn is_reduction_to_vector(graph: &HloGraph, reduce: &HloInstruction) -> bool {
    let dimensions = match &reduce.op {
        HloOp::Reduce { dimensions } => dimensions,
        HloOp::Parameter { .. }
        | HloOp::Constant
        | HloOp::Add
        | HloOp::Multiply
        | HloOp::Dot(_)
        | HloOp::Fusion { .. }
        | HloOp::CustomCall { .. }
        | HloOp::Other { .. } => return false,
    };
    let input = match graph.operand(reduce, 0) {
        Some(input) => input,
        None => return false,
    };

    let dims_to_keep = kept_dimensions(input.shape.rank(), dimensions);
    let consecutive = input.shape.layout().are_dimensions_consecutive(&dims_to_keep);
    let filtered = input.shape.filter_dimensions(|dim| dims_to_keep.contains(&dim));
    let shape_matches = reduce.shape.dimensions() == filtered.dimensions();

    tracing::trace!(
        instr = %reduce.id,
        ?dims_to_keep,
        consecutive,
        shape_matches,
        "reduction to vector check"
    );
    consecutive && shape_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hlo::{InstrId, PrimitiveType, Shape};

    fn reduce_graph(input: Shape, dims: Vec<usize>, output: Vec<usize>) -> (HloGraph, InstrId) {
        let mut g = HloGraph::new();
        let p = g.parameter(0, input);
        let r = g.reduce(p, dims, Shape::new(PrimitiveType::F32, output));
        (g, r)
    }

    #[test]
    fn test_kept_dimensions() {
        assert_eq!(kept_dimensions(3, &[1]), vec![0, 2]);
        assert_eq!(kept_dimensions(3, &[]), vec![0, 1, 2]);
        assert_eq!(kept_dimensions(3, &[2, 0]), vec![1]);
        assert_eq!(kept_dimensions(2, &[0, 1]), Vec::<usize>::new());
    }

    #[test]
    fn test_row_reduction_is_valid() {
        let input = Shape::new(PrimitiveType::F32, vec![2, 3, 4]);
        let (g, r) = reduce_graph(input, vec![0], vec![3, 4]);
        assert!(is_reduction_to_vector(&g, g.get(r).unwrap()));
    }

    #[test]
    fn test_non_contiguous_kept_dims_invalid_even_when_shape_matches() {
        // row-major [2,3,4]: dim 1 sits between dims 0 and 2 in memory
        let input = Shape::new(PrimitiveType::F32, vec![2, 3, 4]);
        let (g, r) = reduce_graph(input, vec![1], vec![2, 4]);
        assert!(!is_reduction_to_vector(&g, g.get(r).unwrap()));
    }

    #[test]
    fn test_contiguous_under_custom_layout() {
        // dim 1 is most major, so dims 0 and 2 are adjacent
        let input = Shape::with_layout(PrimitiveType::F32, vec![2, 3, 4], vec![0, 2, 1]).unwrap();
        let (g, r) = reduce_graph(input, vec![1], vec![2, 4]);
        assert!(is_reduction_to_vector(&g, g.get(r).unwrap()));
    }

    #[test]
    fn test_shape_mismatch_invalid_even_when_contiguous() {
        let input = Shape::with_layout(PrimitiveType::F32, vec![2, 3, 4], vec![0, 2, 1]).unwrap();
        let (g, r) = reduce_graph(input, vec![1], vec![4, 2]);
        assert!(!is_reduction_to_vector(&g, g.get(r).unwrap()));
    }

    #[test]
    fn test_full_reduction_to_scalar() {
        let input = Shape::new(PrimitiveType::F32, vec![8, 16]);
        let (g, r) = reduce_graph(input, vec![0, 1], vec![]);
        assert!(is_reduction_to_vector(&g, g.get(r).unwrap()));
    }

    #[test]
    fn test_non_reduce_is_invalid() {
        let mut g = HloGraph::new();
        let p = g.parameter(0, Shape::new(PrimitiveType::F32, vec![4]));
        let add = g.add_op(p, p, Shape::new(PrimitiveType::F32, vec![4]));
        assert!(!is_reduction_to_vector(&g, g.get(add).unwrap()));
        assert!(!is_reduction_to_vector(&g, g.get(p).unwrap()));
    }
}
