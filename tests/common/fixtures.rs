//! HLO graph fixtures
//!
//! Each helper returns the graph and the id of the instruction under test.

use rocmlower::hlo::{DotDimensionNumbers, FusionKind, HloGraph, InstrId, PrimitiveType, Shape};

pub fn shape(ty: PrimitiveType, dims: &[usize]) -> Shape {
    Shape::new(ty, dims.to_vec())
}

pub fn f32s(dims: &[usize]) -> Shape {
    shape(PrimitiveType::F32, dims)
}

/// `lhs x rhs -> out` as a plain dot with no batch dimensions, output of
/// element type `ty`.
pub fn matmul_graph(ty: PrimitiveType, lhs: &[usize], rhs: &[usize], out: &[usize]) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let a = g.parameter(0, shape(ty, lhs));
    let b = g.parameter(1, shape(ty, rhs));
    let dot = g.dot(a, b, DotDimensionNumbers::matmul(0), shape(ty, out));
    (g, dot)
}

/// Batched dot with `batch` leading batch dimensions.
pub fn batched_matmul_graph(
    batch: usize,
    lhs: &[usize],
    rhs: &[usize],
    out: &[usize],
) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let a = g.parameter(0, f32s(lhs));
    let b = g.parameter(1, f32s(rhs));
    let dot = g.dot(a, b, DotDimensionNumbers::matmul(batch), f32s(out));
    (g, dot)
}

/// Output fusion whose multiply root takes the [2,3]x[3,4] dot as operand
/// `dot_operand` and a scale parameter as the other.
pub fn fused_gemm_graph(dot_operand: usize) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let a = g.parameter(0, f32s(&[2, 3]));
    let b = g.parameter(1, f32s(&[3, 4]));
    let s = g.parameter(2, f32s(&[2, 4]));

    let fa = g.parameter(0, f32s(&[2, 3]));
    let fb = g.parameter(1, f32s(&[3, 4]));
    let fs = g.parameter(2, f32s(&[2, 4]));
    let dot = g.dot(fa, fb, DotDimensionNumbers::matmul(0), f32s(&[2, 4]));
    let root = if dot_operand == 0 {
        g.multiply(dot, fs, f32s(&[2, 4]))
    } else {
        g.multiply(fs, dot, f32s(&[2, 4]))
    };
    let fusion = g.fusion(FusionKind::Output, root, vec![a, b, s], f32s(&[2, 4]));
    (g, fusion)
}

/// Output fusion whose add root has a dot in both operands: operand 0 has
/// output element type `first`, operand 1 has `second`.
pub fn two_dot_fusion_graph(first: PrimitiveType, second: PrimitiveType) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let a = g.parameter(0, f32s(&[2, 3]));
    let b = g.parameter(1, f32s(&[3, 4]));

    let fa = g.parameter(0, f32s(&[2, 3]));
    let fb = g.parameter(1, f32s(&[3, 4]));
    let d0 = g.dot(fa, fb, DotDimensionNumbers::matmul(0), shape(first, &[2, 4]));
    let d1 = g.dot(fa, fb, DotDimensionNumbers::matmul(0), shape(second, &[2, 4]));
    let root = g.add_op(d0, d1, f32s(&[2, 4]));
    let fusion = g.fusion(FusionKind::Output, root, vec![a, b], f32s(&[2, 4]));
    (g, fusion)
}

pub fn custom_call_graph(target: &str) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let input = g.parameter(0, f32s(&[1, 8, 8, 3]));
    let call = g.custom_call(target, vec![input], f32s(&[1, 8, 8, 3]));
    (g, call)
}

pub fn reduce_graph(input: Shape, dims: &[usize], output: &[usize]) -> (HloGraph, InstrId) {
    let mut g = HloGraph::new();
    let p = g.parameter(0, input);
    let r = g.reduce(p, dims.to_vec(), f32s(output));
    (g, r)
}

/// A small model step: a gemm, a fused gemm epilogue, a convolution, a
/// row reduction and an elementwise add.
pub fn mixed_graph() -> HloGraph {
    let mut g = HloGraph::new();
    let x = g.parameter(0, f32s(&[2, 3]));
    let w = g.parameter(1, f32s(&[3, 4]));
    let bias = g.parameter(2, f32s(&[2, 4]));

    let dot = g.dot(x, w, DotDimensionNumbers::matmul(0), f32s(&[2, 4]));

    let fx = g.parameter(0, f32s(&[2, 3]));
    let fw = g.parameter(1, f32s(&[3, 4]));
    let fb = g.parameter(2, f32s(&[2, 4]));
    let fdot = g.dot(fx, fw, DotDimensionNumbers::matmul(0), f32s(&[2, 4]));
    let root = g.add_op(fdot, fb, f32s(&[2, 4]));
    let fused = g.fusion(FusionKind::Output, root, vec![x, w, bias], f32s(&[2, 4]));

    let sum = g.add_op(dot, fused, f32s(&[2, 4]));
    g.reduce(sum, vec![1], f32s(&[2]));
    g.custom_call(
        rocmlower::dispatch::custom_call::CONV_FORWARD_CALL_TARGET,
        vec![sum],
        f32s(&[2, 4]),
    );
    g
}
