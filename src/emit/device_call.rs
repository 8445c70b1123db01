//! Calls into device library routines.

use crate::error::LowerResult;
use crate::hlo::PrimitiveType;
use crate::internal_error;
use crate::ir::{primitive_to_ir_type, DeviceBuilder, DeviceValue, FnAttribute, FunctionType};

/// Emit a call to the device function `callee_name`.
///
/// The declaration is created on first use with parameter and return types
/// derived from `input_types` and `output_type`, and reused afterwards.
/// `attributes` are added to the declaration; ones it already carries are
/// not repeated.
///
/// Fails with [`LowerError::SignatureMismatch`](crate::error::LowerError::SignatureMismatch)
/// if the module already declares `callee_name` with different types.
pub fn emit_device_function_call<B>(
    builder: &mut B,
    callee_name: &str,
    operands: &[DeviceValue],
    input_types: &[PrimitiveType],
    output_type: PrimitiveType,
    attributes: &[FnAttribute],
) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    if operands.len() != input_types.len() {
        return Err(internal_error!(
            "{} called with {} operands but {} input types",
            callee_name,
            operands.len(),
            input_types.len()
        ));
    }

    let params = input_types
        .iter()
        .map(|ty| primitive_to_ir_type(*ty))
        .collect();
    let ty = FunctionType::new(primitive_to_ir_type(output_type), params);

    let decl = builder.module_mut().get_or_insert_function(callee_name, ty)?;
    for attr in attributes {
        decl.add_attribute(*attr);
    }

    tracing::trace!(callee = callee_name, operands = operands.len(), "device call");
    builder.call(callee_name, operands)
}
