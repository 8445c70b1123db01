//! Instruction builder.
//!
//! [`DeviceBuilder`] is the surface the emitters program against. Every
//! operation checks operand types up front so a malformed sequence fails at
//! emission time instead of producing invalid IR. Casts to the operand's own
//! type fold to the operand itself.

use std::fmt;

use crate::error::{LowerError, LowerResult};
use crate::ir::{DeviceModule, DeviceValue, FnAttribute, FunctionType, IrType, ValueId};
use crate::target::features::{AmdgpuMachineFeatures, SimtIntrinsic, TargetMachineFeatures};
use crate::{internal_error, type_mismatch};

/// Operations used to emit device code.
pub trait DeviceBuilder {
    fn module(&self) -> &DeviceModule;
    fn module_mut(&mut self) -> &mut DeviceModule;
    fn target(&self) -> &dyn TargetMachineFeatures;

    /// Reinterpret the bits of `value` as `to` (same width, or pointer to pointer).
    fn bitcast(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue>;
    fn zext(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue>;
    fn trunc(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue>;
    fn extract_element(&mut self, vector: &DeviceValue, index: u32) -> LowerResult<DeviceValue>;
    fn insert_element(
        &mut self,
        vector: &DeviceValue,
        element: &DeviceValue,
        index: u32,
    ) -> LowerResult<DeviceValue>;
    /// Field `index` of a struct value.
    fn extract_value(&mut self, aggregate: &DeviceValue, index: u32) -> LowerResult<DeviceValue>;
    fn insert_value(
        &mut self,
        aggregate: &DeviceValue,
        element: &DeviceValue,
        index: u32,
    ) -> LowerResult<DeviceValue>;
    /// Stack slot for one `ty`; the result points to it.
    fn alloca(&mut self, ty: IrType) -> DeviceValue;
    fn store(&mut self, value: &DeviceValue, ptr: &DeviceValue) -> LowerResult<()>;
    /// Address of field `index` of the struct `ptr` points to.
    fn struct_gep(&mut self, ptr: &DeviceValue, index: u32) -> LowerResult<DeviceValue>;
    fn const_int(&mut self, ty: IrType, value: u128) -> LowerResult<DeviceValue>;
    fn const_float(&mut self, ty: IrType, value: f64) -> LowerResult<DeviceValue>;
    /// `i8*` to a NUL-terminated module constant holding `text`.
    fn global_string_ptr(&mut self, text: &str) -> DeviceValue;
    /// Call a function already declared in the module.
    fn call(&mut self, callee: &str, args: &[DeviceValue]) -> LowerResult<DeviceValue>;
    fn icmp_eq(&mut self, lhs: &DeviceValue, rhs: &DeviceValue) -> LowerResult<DeviceValue>;
    fn and(&mut self, lhs: &DeviceValue, rhs: &DeviceValue) -> LowerResult<DeviceValue>;

    /// Read a thread or block coordinate through the target's intrinsic.
    fn read_simt_intrinsic(&mut self, kind: SimtIntrinsic) -> LowerResult<DeviceValue> {
        let name = self.target().simt_intrinsic(kind);
        let decl = self
            .module_mut()
            .get_or_insert_function(name, FunctionType::new(IrType::i32(), vec![]))?;
        decl.add_attribute(FnAttribute::ReadNone);
        decl.add_attribute(FnAttribute::NoUnwind);
        self.call(name, &[])
    }
}

static VOID: IrType = IrType::Void;

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Live-in value supplied by the caller (kernel parameter or a value
    /// computed by code outside this stream).
    Argument { index: usize },
    Bitcast { value: DeviceValue },
    ZExt { value: DeviceValue },
    Trunc { value: DeviceValue },
    ExtractElement { vector: DeviceValue, index: u32 },
    InsertElement { vector: DeviceValue, element: DeviceValue, index: u32 },
    ExtractValue { aggregate: DeviceValue, index: u32 },
    InsertValue { aggregate: DeviceValue, element: DeviceValue, index: u32 },
    Alloca { ty: IrType },
    Store { value: DeviceValue, ptr: DeviceValue },
    StructGep { ptr: DeviceValue, index: u32 },
    ConstInt { value: u128 },
    /// Raw IEEE bits in the result type's width.
    ConstFloat { bits: u64 },
    GlobalStringPtr { global: String },
    Call { callee: String, args: Vec<DeviceValue> },
    ICmpEq { lhs: DeviceValue, rhs: DeviceValue },
    And { lhs: DeviceValue, rhs: DeviceValue },
}

/// One recorded instruction. `result` is `None` only for stores.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<DeviceValue>,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            InstructionKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            if result.ty != IrType::Void {
                write!(f, "{} = ", result.id)?;
            }
        }
        let result_ty = self.result.as_ref().map(|r| &r.ty).unwrap_or(&VOID);
        match &self.kind {
            InstructionKind::Argument { index } => write!(f, "argument {} #{}", result_ty, index),
            InstructionKind::Bitcast { value } => write!(f, "bitcast {} to {}", value, result_ty),
            InstructionKind::ZExt { value } => write!(f, "zext {} to {}", value, result_ty),
            InstructionKind::Trunc { value } => write!(f, "trunc {} to {}", value, result_ty),
            InstructionKind::ExtractElement { vector, index } => {
                write!(f, "extractelement {}, i32 {}", vector, index)
            }
            InstructionKind::InsertElement {
                vector,
                element,
                index,
            } => write!(f, "insertelement {}, {}, i32 {}", vector, element, index),
            InstructionKind::ExtractValue { aggregate, index } => {
                write!(f, "extractvalue {}, {}", aggregate, index)
            }
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            } => write!(f, "insertvalue {}, {}, {}", aggregate, element, index),
            InstructionKind::Alloca { ty } => write!(f, "alloca {}", ty),
            InstructionKind::Store { value, ptr } => write!(f, "store {}, {}", value, ptr),
            InstructionKind::StructGep { ptr, index } => {
                let pointee = ptr.ty.pointee().unwrap_or(&VOID);
                write!(
                    f,
                    "getelementptr inbounds {}, {}, i32 0, i32 {}",
                    pointee, ptr, index
                )
            }
            InstructionKind::ConstInt { value } => write!(f, "constant {} {}", result_ty, value),
            InstructionKind::ConstFloat { bits } => {
                write!(f, "constant {} 0x{:X}", result_ty, bits)
            }
            InstructionKind::GlobalStringPtr { global } => {
                write!(f, "getelementptr inbounds @{}, i32 0, i32 0", global)
            }
            InstructionKind::Call { callee, args } => {
                write!(f, "call {} @{}(", result_ty, callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            InstructionKind::ICmpEq { lhs, rhs } => {
                write!(f, "icmp eq {}, {}", lhs, rhs.id)
            }
            InstructionKind::And { lhs, rhs } => write!(f, "and {}, {}", lhs, rhs.id),
        }
    }
}

/// Records instructions into a flat SSA list against a [`DeviceModule`].
pub struct InstructionBuilder {
    module: DeviceModule,
    target: Box<dyn TargetMachineFeatures>,
    instructions: Vec<Instruction>,
    value_types: Vec<IrType>,
    argument_count: usize,
}

impl fmt::Debug for InstructionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionBuilder")
            .field("module", &self.module.name())
            .field("instructions", &self.instructions.len())
            .field("values", &self.value_types.len())
            .finish()
    }
}

impl InstructionBuilder {
    pub fn new(module: DeviceModule, target: impl TargetMachineFeatures + 'static) -> Self {
        Self {
            module,
            target: Box::new(target),
            instructions: Vec::new(),
            value_types: Vec::new(),
            argument_count: 0,
        }
    }

    /// Builder for an empty AMDGPU module.
    pub fn amdgpu(module_name: &str) -> Self {
        Self::new(DeviceModule::new(module_name), AmdgpuMachineFeatures)
    }

    /// Declare the next live-in value of type `ty`.
    pub fn argument(&mut self, ty: IrType) -> DeviceValue {
        let index = self.argument_count;
        self.argument_count += 1;
        self.push(InstructionKind::Argument { index }, ty)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn value_count(&self) -> usize {
        self.value_types.len()
    }

    pub fn argument_count(&self) -> usize {
        self.argument_count
    }

    pub fn into_module(self) -> DeviceModule {
        self.module
    }

    /// Number of calls recorded to `callee`.
    pub fn call_count(&self, callee: &str) -> usize {
        self.instructions
            .iter()
            .filter(|inst| inst.callee() == Some(callee))
            .count()
    }

    /// Module declarations followed by the instruction stream.
    pub fn dump(&self) -> String {
        format!("{}\n{}", self.module, self)
    }

    fn push(&mut self, kind: InstructionKind, ty: IrType) -> DeviceValue {
        let value = DeviceValue {
            id: ValueId(self.value_types.len()),
            ty: ty.clone(),
        };
        self.value_types.push(ty);
        self.instructions.push(Instruction {
            result: Some(value.clone()),
            kind,
        });
        value
    }

    fn check_owned(&self, value: &DeviceValue) -> LowerResult<()> {
        match self.value_types.get(value.id.0) {
            Some(ty) if *ty == value.ty => Ok(()),
            _ => Err(LowerError::UnknownValue(value.id)),
        }
    }

    fn int_width(value: &DeviceValue, what: &str) -> LowerResult<u32> {
        match value.ty {
            IrType::Int(bits) => Ok(bits),
            _ => Err(type_mismatch!("{} expects an integer, got {}", what, value.ty)),
        }
    }
}

impl fmt::Display for InstructionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inst in &self.instructions {
            writeln!(f, "  {}", inst)?;
        }
        Ok(())
    }
}

impl DeviceBuilder for InstructionBuilder {
    fn module(&self) -> &DeviceModule {
        &self.module
    }

    fn module_mut(&mut self) -> &mut DeviceModule {
        &mut self.module
    }

    fn target(&self) -> &dyn TargetMachineFeatures {
        self.target.as_ref()
    }

    fn bitcast(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue> {
        self.check_owned(value)?;
        if value.ty == to {
            return Ok(value.clone());
        }
        let compatible = match (&value.ty, &to) {
            (IrType::Pointer(_), IrType::Pointer(_)) => true,
            (from, to) => match (from.bit_width(), to.bit_width()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        };
        if !compatible {
            return Err(type_mismatch!("cannot bitcast {} to {}", value.ty, to));
        }
        Ok(self.push(
            InstructionKind::Bitcast {
                value: value.clone(),
            },
            to,
        ))
    }

    fn zext(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue> {
        self.check_owned(value)?;
        let from_bits = Self::int_width(value, "zext")?;
        let to_bits = match to {
            IrType::Int(bits) => bits,
            _ => return Err(type_mismatch!("zext target must be an integer, got {}", to)),
        };
        if from_bits == to_bits {
            return Ok(value.clone());
        }
        if to_bits < from_bits {
            return Err(type_mismatch!("zext from i{} to narrower i{}", from_bits, to_bits));
        }
        Ok(self.push(
            InstructionKind::ZExt {
                value: value.clone(),
            },
            to,
        ))
    }

    fn trunc(&mut self, value: &DeviceValue, to: IrType) -> LowerResult<DeviceValue> {
        self.check_owned(value)?;
        let from_bits = Self::int_width(value, "trunc")?;
        let to_bits = match to {
            IrType::Int(bits) => bits,
            _ => return Err(type_mismatch!("trunc target must be an integer, got {}", to)),
        };
        if from_bits == to_bits {
            return Ok(value.clone());
        }
        if to_bits > from_bits {
            return Err(type_mismatch!("trunc from i{} to wider i{}", from_bits, to_bits));
        }
        Ok(self.push(
            InstructionKind::Trunc {
                value: value.clone(),
            },
            to,
        ))
    }

    fn extract_element(&mut self, vector: &DeviceValue, index: u32) -> LowerResult<DeviceValue> {
        self.check_owned(vector)?;
        let (elem, len) = vector
            .ty
            .vector_element()
            .ok_or_else(|| type_mismatch!("extractelement on non-vector {}", vector.ty))?;
        if index >= len {
            return Err(type_mismatch!("extractelement index {} out of range for {}", index, vector.ty));
        }
        let elem = elem.clone();
        Ok(self.push(
            InstructionKind::ExtractElement {
                vector: vector.clone(),
                index,
            },
            elem,
        ))
    }

    fn insert_element(
        &mut self,
        vector: &DeviceValue,
        element: &DeviceValue,
        index: u32,
    ) -> LowerResult<DeviceValue> {
        self.check_owned(vector)?;
        self.check_owned(element)?;
        let (elem, len) = vector
            .ty
            .vector_element()
            .ok_or_else(|| type_mismatch!("insertelement on non-vector {}", vector.ty))?;
        if *elem != element.ty {
            return Err(type_mismatch!("cannot insert {} into {}", element.ty, vector.ty));
        }
        if index >= len {
            return Err(type_mismatch!("insertelement index {} out of range for {}", index, vector.ty));
        }
        let ty = vector.ty.clone();
        Ok(self.push(
            InstructionKind::InsertElement {
                vector: vector.clone(),
                element: element.clone(),
                index,
            },
            ty,
        ))
    }

    fn extract_value(&mut self, aggregate: &DeviceValue, index: u32) -> LowerResult<DeviceValue> {
        self.check_owned(aggregate)?;
        let field = aggregate
            .ty
            .struct_fields()
            .and_then(|fields| fields.get(index as usize))
            .cloned()
            .ok_or_else(|| type_mismatch!("extractvalue: no field {} in {}", index, aggregate.ty))?;
        Ok(self.push(
            InstructionKind::ExtractValue {
                aggregate: aggregate.clone(),
                index,
            },
            field,
        ))
    }

    fn insert_value(
        &mut self,
        aggregate: &DeviceValue,
        element: &DeviceValue,
        index: u32,
    ) -> LowerResult<DeviceValue> {
        self.check_owned(aggregate)?;
        self.check_owned(element)?;
        let field = aggregate
            .ty
            .struct_fields()
            .and_then(|fields| fields.get(index as usize))
            .ok_or_else(|| type_mismatch!("insertvalue: no field {} in {}", index, aggregate.ty))?;
        if *field != element.ty {
            return Err(type_mismatch!(
                "cannot insert {} as field {} of {}",
                element.ty,
                index,
                aggregate.ty
            ));
        }
        let ty = aggregate.ty.clone();
        Ok(self.push(
            InstructionKind::InsertValue {
                aggregate: aggregate.clone(),
                element: element.clone(),
                index,
            },
            ty,
        ))
    }

    fn alloca(&mut self, ty: IrType) -> DeviceValue {
        self.push(InstructionKind::Alloca { ty: ty.clone() }, IrType::pointer_to(ty))
    }

    fn store(&mut self, value: &DeviceValue, ptr: &DeviceValue) -> LowerResult<()> {
        self.check_owned(value)?;
        self.check_owned(ptr)?;
        match ptr.ty.pointee() {
            Some(pointee) if *pointee == value.ty => {}
            _ => return Err(type_mismatch!("cannot store {} through {}", value.ty, ptr.ty)),
        }
        self.instructions.push(Instruction {
            result: None,
            kind: InstructionKind::Store {
                value: value.clone(),
                ptr: ptr.clone(),
            },
        });
        Ok(())
    }

    fn struct_gep(&mut self, ptr: &DeviceValue, index: u32) -> LowerResult<DeviceValue> {
        self.check_owned(ptr)?;
        let field = ptr
            .ty
            .pointee()
            .and_then(IrType::struct_fields)
            .and_then(|fields| fields.get(index as usize))
            .cloned()
            .ok_or_else(|| type_mismatch!("no field {} behind {}", index, ptr.ty))?;
        Ok(self.push(
            InstructionKind::StructGep {
                ptr: ptr.clone(),
                index,
            },
            IrType::pointer_to(field),
        ))
    }

    fn const_int(&mut self, ty: IrType, value: u128) -> LowerResult<DeviceValue> {
        let bits = match ty {
            IrType::Int(bits) if (1..=128).contains(&bits) => bits,
            _ => return Err(type_mismatch!("integer constant of type {}", ty)),
        };
        if bits < 128 && value >> bits != 0 {
            return Err(type_mismatch!("constant {} does not fit in i{}", value, bits));
        }
        Ok(self.push(InstructionKind::ConstInt { value }, ty))
    }

    fn const_float(&mut self, ty: IrType, value: f64) -> LowerResult<DeviceValue> {
        let bits = match ty {
            IrType::Half => u64::from(half::f16::from_f64(value).to_bits()),
            IrType::Float => u64::from((value as f32).to_bits()),
            IrType::Double => value.to_bits(),
            _ => return Err(type_mismatch!("float constant of type {}", ty)),
        };
        Ok(self.push(InstructionKind::ConstFloat { bits }, ty))
    }

    fn global_string_ptr(&mut self, text: &str) -> DeviceValue {
        let global = self.module.add_global_string(text);
        self.push(InstructionKind::GlobalStringPtr { global }, IrType::i8_ptr())
    }

    fn call(&mut self, callee: &str, args: &[DeviceValue]) -> LowerResult<DeviceValue> {
        for arg in args {
            self.check_owned(arg)?;
        }
        let ty = self
            .module
            .function(callee)
            .map(|decl| decl.ty.clone())
            .ok_or_else(|| internal_error!("call to undeclared function {}", callee))?;

        let arity_ok = if ty.variadic {
            args.len() >= ty.params.len()
        } else {
            args.len() == ty.params.len()
        };
        if !arity_ok {
            return Err(type_mismatch!(
                "{} takes {} arguments, got {}",
                callee,
                ty.params.len(),
                args.len()
            ));
        }
        for (i, (param, arg)) in ty.params.iter().zip(args).enumerate() {
            if *param != arg.ty {
                return Err(type_mismatch!(
                    "argument {} of {} is {}, expected {}",
                    i,
                    callee,
                    arg.ty,
                    param
                ));
            }
        }
        Ok(self.push(
            InstructionKind::Call {
                callee: callee.to_string(),
                args: args.to_vec(),
            },
            ty.ret,
        ))
    }

    fn icmp_eq(&mut self, lhs: &DeviceValue, rhs: &DeviceValue) -> LowerResult<DeviceValue> {
        self.check_owned(lhs)?;
        self.check_owned(rhs)?;
        Self::int_width(lhs, "icmp")?;
        if lhs.ty != rhs.ty {
            return Err(type_mismatch!("icmp between {} and {}", lhs.ty, rhs.ty));
        }
        Ok(self.push(
            InstructionKind::ICmpEq {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            IrType::i1(),
        ))
    }

    fn and(&mut self, lhs: &DeviceValue, rhs: &DeviceValue) -> LowerResult<DeviceValue> {
        self.check_owned(lhs)?;
        self.check_owned(rhs)?;
        Self::int_width(lhs, "and")?;
        if lhs.ty != rhs.ty {
            return Err(type_mismatch!("and between {} and {}", lhs.ty, rhs.ty));
        }
        let ty = lhs.ty.clone();
        Ok(self.push(
            InstructionKind::And {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            ty,
        ))
    }
}
