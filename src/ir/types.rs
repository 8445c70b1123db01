//! Device IR types.

use std::fmt;

use crate::hlo::PrimitiveType;

/// First-class and aggregate types of the device instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Integer of the given bit width; `Int(1)` is a predicate.
    Int(u32),
    Half,
    Float,
    Double,
    Vector { elem: Box<IrType>, len: u32 },
    Pointer(Box<IrType>),
    Struct(Vec<IrType>),
    Void,
}

impl IrType {
    pub fn int(bits: u32) -> Self {
        IrType::Int(bits)
    }

    pub fn i1() -> Self {
        IrType::Int(1)
    }

    pub fn i8() -> Self {
        IrType::Int(8)
    }

    pub fn i32() -> Self {
        IrType::Int(32)
    }

    pub fn vector(elem: IrType, len: u32) -> Self {
        IrType::Vector {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn pointer_to(pointee: IrType) -> Self {
        IrType::Pointer(Box::new(pointee))
    }

    /// `i8*`, the type of string pointers.
    pub fn i8_ptr() -> Self {
        IrType::pointer_to(IrType::i8())
    }

    /// Bit width of scalar and vector types. Pointers, structs and `void`
    /// have no width a bitcast could preserve.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            IrType::Int(bits) => Some(*bits),
            IrType::Half => Some(16),
            IrType::Float => Some(32),
            IrType::Double => Some(64),
            IrType::Vector { elem, len } => elem.bit_width().map(|w| w * len),
            IrType::Pointer(_) | IrType::Struct(_) | IrType::Void => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::Int(_))
    }

    /// 32-bit IEEE float specifically.
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::Float)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, IrType::Half | IrType::Float | IrType::Double)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, IrType::Vector { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    pub fn vector_element(&self) -> Option<(&IrType, u32)> {
        match self {
            IrType::Vector { elem, len } => Some((elem, *len)),
            _ => None,
        }
    }

    pub fn struct_fields(&self) -> Option<&[IrType]> {
        match self {
            IrType::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Half => f.write_str("half"),
            IrType::Float => f.write_str("float"),
            IrType::Double => f.write_str("double"),
            IrType::Vector { elem, len } => write!(f, "<{} x {}>", len, elem),
            IrType::Pointer(pointee) => write!(f, "{}*", pointee),
            IrType::Struct(fields) => {
                if fields.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str(" }")
            }
            IrType::Void => f.write_str("void"),
        }
    }
}

/// Signature of a declared function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub ret: IrType,
    pub params: Vec<IrType>,
    pub variadic: bool,
}

impl FunctionType {
    pub fn new(ret: IrType, params: Vec<IrType>) -> Self {
        Self {
            ret,
            params,
            variadic: false,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

/// Device IR type used to hold values of an HLO element type.
///
/// Complex numbers become a `{ re, im }` struct. BF16 has no native device
/// arithmetic and travels as its raw 16 bits.
pub fn primitive_to_ir_type(ty: PrimitiveType) -> IrType {
    match ty {
        PrimitiveType::Pred => IrType::Int(1),
        PrimitiveType::S8 | PrimitiveType::U8 => IrType::Int(8),
        PrimitiveType::S16 | PrimitiveType::U16 | PrimitiveType::Bf16 => IrType::Int(16),
        PrimitiveType::S32 | PrimitiveType::U32 => IrType::Int(32),
        PrimitiveType::S64 | PrimitiveType::U64 => IrType::Int(64),
        PrimitiveType::F16 => IrType::Half,
        PrimitiveType::F32 => IrType::Float,
        PrimitiveType::F64 => IrType::Double,
        PrimitiveType::C64 => IrType::Struct(vec![IrType::Float, IrType::Float]),
        PrimitiveType::C128 => IrType::Struct(vec![IrType::Double, IrType::Double]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_widths() {
        assert_eq!(IrType::Half.bit_width(), Some(16));
        assert_eq!(IrType::Double.bit_width(), Some(64));
        assert_eq!(IrType::vector(IrType::i32(), 3).bit_width(), Some(96));
        assert_eq!(IrType::i8_ptr().bit_width(), None);
        assert_eq!(IrType::Struct(vec![IrType::Float]).bit_width(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(IrType::vector(IrType::i32(), 2).to_string(), "<2 x i32>");
        assert_eq!(IrType::i8_ptr().to_string(), "i8*");
        assert_eq!(
            IrType::Struct(vec![IrType::Float, IrType::Int(64)]).to_string(),
            "{ float, i64 }"
        );
        assert_eq!(IrType::Struct(vec![]).to_string(), "{}");

        let sig = FunctionType::new(IrType::i32(), vec![IrType::i32(), IrType::i32()]);
        assert_eq!(sig.to_string(), "i32 (i32, i32)");
    }

    #[test]
    fn test_primitive_conversion() {
        assert_eq!(primitive_to_ir_type(PrimitiveType::Pred), IrType::Int(1));
        assert_eq!(primitive_to_ir_type(PrimitiveType::U16), IrType::Int(16));
        assert_eq!(primitive_to_ir_type(PrimitiveType::Bf16), IrType::Int(16));
        assert_eq!(primitive_to_ir_type(PrimitiveType::F16), IrType::Half);
        assert_eq!(primitive_to_ir_type(PrimitiveType::S64), IrType::Int(64));
        assert_eq!(
            primitive_to_ir_type(PrimitiveType::C128),
            IrType::Struct(vec![IrType::Double, IrType::Double])
        );
    }

    #[test]
    fn test_float_predicates() {
        assert!(IrType::Float.is_float());
        assert!(!IrType::Double.is_float());
        assert!(IrType::Half.is_floating_point());
        assert!(!IrType::Int(32).is_floating_point());
    }
}
