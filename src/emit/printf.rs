//! Device-side formatted printing.

use crate::error::LowerResult;
use crate::ir::{DeviceBuilder, DeviceValue, FunctionType, IrType};

/// Emit a device `printf` of `format` with `arguments`.
///
/// The arguments are packed into an anonymous struct on the stack and the
/// print routine receives the format string and a byte pointer to that
/// struct. Returns the routine's `i32` result.
pub fn emit_printf<B>(
    builder: &mut B,
    format: &str,
    arguments: &[DeviceValue],
) -> LowerResult<DeviceValue>
where
    B: DeviceBuilder + ?Sized,
{
    let packed_ty = IrType::Struct(arguments.iter().map(|arg| arg.ty.clone()).collect());
    let buffer = builder.alloca(packed_ty);
    for (index, argument) in arguments.iter().enumerate() {
        let field = builder.struct_gep(&buffer, index as u32)?;
        builder.store(argument, &field)?;
    }

    let format_ptr = builder.global_string_ptr(format);
    let buffer_ptr = builder.bitcast(&buffer, IrType::i8_ptr())?;

    let callee = builder.target().printf_function();
    builder.module_mut().get_or_insert_function(
        callee,
        FunctionType::new(IrType::i32(), vec![IrType::i8_ptr(), IrType::i8_ptr()]),
    )?;
    tracing::trace!(format, arguments = arguments.len(), "emitting printf");
    builder.call(callee, &[format_ptr, buffer_ptr])
}
