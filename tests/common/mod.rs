//! Common test utilities for dispatch and emission tests
//!
//! - `fixtures`: small HLO graphs covering each lowering strategy
//! - `tempfile_helpers`: temp files and directories for graph JSON
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::fixtures::matmul_graph;
//!
//! let (graph, dot) = matmul_graph(PrimitiveType::F32, &[2, 3], &[3, 4], &[2, 4]);
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod tempfile_helpers;

use rocmlower::ir::{IrType, LaneId, SimValue};

/// Bit pattern a lane contributes in shuffle tests: distinct per lane and
/// covering every byte of a 128-bit value.
pub fn lane_bits(lane: LaneId, salt: u128) -> u128 {
    let seed = u128::from(lane.thread) + 1;
    seed.wrapping_mul(0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c835) ^ salt
}

/// A lane value of type `ty` built from `bits` (masked to the type width,
/// struct fields packed from the low end).
pub fn sim_value(ty: &IrType, bits: u128) -> SimValue {
    SimValue::from_bits(bits, ty).expect("simulatable type")
}

/// `bits` truncated to `width` bits.
pub fn masked(bits: u128, width: u32) -> u128 {
    if width >= 128 {
        bits
    } else {
        bits & ((1u128 << width) - 1)
    }
}
