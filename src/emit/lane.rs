//! Single-lane predicates.

use crate::error::LowerResult;
use crate::ir::{DeviceBuilder, DeviceValue, IrType};
use crate::target::SimtIntrinsic;

/// Emit an `i1` that is true only in thread 0 of block 0.
pub fn is_block0_thread0<B>(builder: &mut B) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    let zero = builder.const_int(IrType::i32(), 0)?;
    let thread = builder.read_simt_intrinsic(SimtIntrinsic::ThreadIdX)?;
    let is_thread0 = builder.icmp_eq(&thread, &zero)?;
    let block = builder.read_simt_intrinsic(SimtIntrinsic::BlockIdX)?;
    let is_block0 = builder.icmp_eq(&block, &zero)?;
    builder.and(&is_thread0, &is_block0)
}
