//! Full-wavefront shuffle-down of values of any width.
//!
//! The hardware lane read moves 32 bits at a time. Wider (or narrower)
//! values are widened to a whole number of 32-bit segments, each segment is
//! read separately, and the result is reassembled into the original type.
//! Struct values (complex numbers) are shuffled one field at a time.

use crate::error::LowerResult;
use crate::hlo::PrimitiveType;
use crate::ir::{DeviceBuilder, DeviceValue, IrType};
use crate::type_mismatch;

use super::device_call::emit_device_function_call;

/// Bits moved by one lane read.
pub const SEGMENT_BITS: u32 = 32;

/// Number of 32-bit segments needed to carry `width` bits.
pub fn segment_count(width: u32) -> u32 {
    width.div_ceil(SEGMENT_BITS)
}

/// How a value of a given type is split for a shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShufflePlan {
    /// Bit width of the shuffled value
    pub width: u32,
    /// Number of lane reads issued
    pub segments: u32,
    /// Single bitcast read, no widening
    pub fast_path: bool,
}

impl ShufflePlan {
    /// Plan for shuffling a value of type `ty`.
    ///
    /// A struct plans as the sum of its fields, which must all be
    /// shuffleable themselves.
    pub fn for_type(ty: &IrType) -> LowerResult<Self> {
        if let Some(fields) = ty.struct_fields() {
            if fields.is_empty() {
                return Err(type_mismatch!("cannot shuffle a value of type {}", ty));
            }
            return fields.iter().try_fold(
                ShufflePlan {
                    width: 0,
                    segments: 0,
                    fast_path: false,
                },
                |plan, field| -> LowerResult<Self> {
                    let field_plan = ShufflePlan::for_type(field)?;
                    Ok(ShufflePlan {
                        width: plan.width + field_plan.width,
                        segments: plan.segments + field_plan.segments,
                        fast_path: false,
                    })
                },
            );
        }
        let width = ty
            .bit_width()
            .filter(|width| *width > 0)
            .ok_or_else(|| type_mismatch!("cannot shuffle a value of type {}", ty))?;
        Ok(ShufflePlan {
            width,
            segments: segment_count(width),
            fast_path: ty.is_float(),
        })
    }

    /// Width after zero extension to whole segments.
    pub fn padded_width(&self) -> u32 {
        self.segments * SEGMENT_BITS
    }
}

/// Split the low `width` bits of `bits` into 32-bit segments, least
/// significant first.
pub fn split_segments(bits: u128, width: u32) -> Vec<u32> {
    let width = width.min(128);
    let bits = if width >= 128 {
        bits
    } else {
        bits & ((1u128 << width) - 1)
    };
    (0..segment_count(width))
        .map(|i| (bits >> (i * SEGMENT_BITS)) as u32)
        .collect()
}

/// Inverse of [`split_segments`]: reassemble and truncate to `width` bits.
pub fn join_segments(segments: &[u32], width: u32) -> u128 {
    let joined = segments
        .iter()
        .take(4)
        .enumerate()
        .fold(0u128, |acc, (i, seg)| {
            acc | (u128::from(*seg) << (i as u32 * SEGMENT_BITS))
        });
    if width >= 128 {
        joined
    } else {
        joined & ((1u128 << width) - 1)
    }
}

fn emit_lane_read<B>(
    builder: &mut B,
    segment: &DeviceValue,
    offset: &DeviceValue,
) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    let callee = builder.target().lane_read_up_function();
    emit_device_function_call(
        builder,
        callee,
        &[segment.clone(), offset.clone()],
        &[PrimitiveType::S32, PrimitiveType::S32],
        PrimitiveType::S32,
        &[],
    )
}

/// Shuffle each field of a struct value and rebuild the struct.
fn emit_field_shuffles<B>(
    builder: &mut B,
    value: &DeviceValue,
    field_count: usize,
    offset: &DeviceValue,
) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    let mut shuffled = value.clone();
    for index in 0..field_count as u32 {
        let field = builder.extract_value(value, index)?;
        let moved = emit_full_warp_shuffle_down(builder, &field, offset)?;
        shuffled = builder.insert_value(&shuffled, &moved, index)?;
    }
    Ok(shuffled)
}

/// Emit a shuffle-down of `value` by `offset` lanes across the full
/// wavefront.
///
/// Each lane receives the value held by lane `lane + offset`. The result has
/// the type of `value` and carries exactly the bits that lane held, for any
/// scalar or vector width up to 128 bits and for structs of such fields.
pub fn emit_full_warp_shuffle_down<B>(
    builder: &mut B,
    value: &DeviceValue,
    offset: &DeviceValue,
) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    if offset.ty != IrType::i32() {
        return Err(type_mismatch!("shuffle offset must be i32, got {}", offset.ty));
    }
    let plan = ShufflePlan::for_type(&value.ty)?;
    tracing::debug!(
        ty = %value.ty,
        width = plan.width,
        segments = plan.segments,
        fast_path = plan.fast_path,
        "emitting shuffle down"
    );

    if let Some(fields) = value.ty.struct_fields() {
        return emit_field_shuffles(builder, value, fields.len(), offset);
    }

    if plan.fast_path {
        let as_int = builder.bitcast(value, IrType::i32())?;
        let moved = emit_lane_read(builder, &as_int, offset)?;
        return builder.bitcast(&moved, value.ty.clone());
    }

    let segments_ty = IrType::vector(IrType::i32(), plan.segments);
    let as_int = builder.bitcast(value, IrType::int(plan.width))?;
    let widened = builder.zext(&as_int, IrType::int(plan.padded_width()))?;
    let mut segments = builder.bitcast(&widened, segments_ty)?;
    for i in 0..plan.segments {
        let segment = builder.extract_element(&segments, i)?;
        let moved = emit_lane_read(builder, &segment, offset)?;
        segments = builder.insert_element(&segments, &moved, i)?;
    }
    let joined = builder.bitcast(&segments, IrType::int(plan.padded_width()))?;
    let narrowed = builder.trunc(&joined, IrType::int(plan.width))?;
    builder.bitcast(&narrowed, value.ty.clone())
}
