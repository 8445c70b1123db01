//! Lane-level evaluation of a recorded instruction stream.
//!
//! Every wavefront of a one-dimensional launch runs the stream in lock step,
//! one instruction at a time across all of its lanes, so cross-lane reads
//! observe the same program point in every lane. Values are plain bit
//! patterns of at most 128 bits, or structs of them.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::LowerResult;
use crate::ir::{DeviceValue, Instruction, InstructionBuilder, InstructionKind, IrType};
use crate::ir::builder::DeviceBuilder;
use crate::sim_error;
use crate::target::arch::GpuArchitecture;
use crate::target::features::SimtIntrinsic;

const MAX_SIM_BITS: u32 = 128;

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Position of a lane in the launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId {
    pub block: u32,
    pub thread: u32,
}

impl LaneId {
    pub fn new(block: u32, thread: u32) -> Self {
        Self { block, thread }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} thread {}", self.block, self.thread)
    }
}

/// One-dimensional launch shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDims {
    pub grid_blocks: u32,
    pub block_threads: u32,
}

impl LaunchDims {
    pub fn new(grid_blocks: u32, block_threads: u32) -> Self {
        Self {
            grid_blocks,
            block_threads,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.grid_blocks as usize * self.block_threads as usize
    }
}

/// Per-lane runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimValue {
    /// Integer or floating-point scalar.
    Bits { bits: u128, width: u32 },
    Vector { elems: Vec<u128>, elem_width: u32 },
    Struct(Vec<SimValue>),
    /// Address of a stack slot, or of one field of a struct slot.
    Pointer { slot: usize, field: Option<u32> },
    /// Address of a module string constant.
    Global(String),
    Void,
}

impl SimValue {
    pub fn int(width: u32, bits: u128) -> Self {
        SimValue::Bits {
            bits: bits & mask(width),
            width,
        }
    }

    pub fn from_f32(value: f32) -> Self {
        SimValue::int(32, u128::from(value.to_bits()))
    }

    pub fn from_f64(value: f64) -> Self {
        SimValue::int(64, u128::from(value.to_bits()))
    }

    pub fn from_f16(value: half::f16) -> Self {
        SimValue::int(16, u128::from(value.to_bits()))
    }

    /// Scalar bit pattern.
    pub fn bits(&self) -> Option<u128> {
        match self {
            SimValue::Bits { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SimValue::Bits { bits, width: 32 } => Some(f32::from_bits(*bits as u32)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SimValue::Bits { bits, width: 64 } => Some(f64::from_bits(*bits as u64)),
            _ => None,
        }
    }

    /// Value of type `ty` taken from the low bits of `bits`. Struct fields
    /// are laid out in order, field 0 lowest.
    pub fn from_bits(bits: u128, ty: &IrType) -> LowerResult<Self> {
        match ty {
            IrType::Struct(fields) => {
                let mut shift = 0u32;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    let width = field
                        .bit_width()
                        .ok_or_else(|| sim_error!("{} field {} has no bit pattern", ty, field))?;
                    let part = if shift >= MAX_SIM_BITS { 0 } else { bits >> shift };
                    values.push(SimValue::from_bits(part, field)?);
                    shift += width;
                }
                Ok(SimValue::Struct(values))
            }
            other => SimValue::unflatten(bits, other),
        }
    }

    /// Whether this value could be held by a value of type `ty`.
    pub fn conforms_to(&self, ty: &IrType) -> bool {
        match (self, ty) {
            (SimValue::Struct(values), IrType::Struct(fields)) => {
                values.len() == fields.len()
                    && values.iter().zip(fields).all(|(v, f)| v.conforms_to(f))
            }
            (SimValue::Vector { elems, elem_width }, IrType::Vector { elem, len }) => {
                elems.len() == *len as usize && scalar_width(elem).ok() == Some(*elem_width)
            }
            (SimValue::Bits { width, .. }, scalar) => scalar_width(scalar).ok() == Some(*width),
            _ => false,
        }
    }

    /// Zero-initialized value of `ty`, used for fresh stack slots.
    pub fn zero(ty: &IrType) -> LowerResult<Self> {
        match ty {
            IrType::Struct(fields) => Ok(SimValue::Struct(
                fields.iter().map(SimValue::zero).collect::<LowerResult<_>>()?,
            )),
            IrType::Vector { elem, len } => {
                let elem_width = scalar_width(elem)?;
                Ok(SimValue::Vector {
                    elems: vec![0; *len as usize],
                    elem_width,
                })
            }
            IrType::Pointer(_) => Err(sim_error!("pointer-typed stack slots are not simulated")),
            IrType::Void => Ok(SimValue::Void),
            scalar => Ok(SimValue::int(scalar_width(scalar)?, 0)),
        }
    }

    /// Flatten a scalar or vector into one bit pattern, element 0 lowest.
    fn flatten(&self) -> LowerResult<(u128, u32)> {
        match self {
            SimValue::Bits { bits, width } => Ok((*bits, *width)),
            SimValue::Vector { elems, elem_width } => {
                let width = elem_width * elems.len() as u32;
                if width > MAX_SIM_BITS {
                    return Err(sim_error!("{}-bit vector exceeds simulator width", width));
                }
                let bits = elems
                    .iter()
                    .enumerate()
                    .fold(0u128, |acc, (i, e)| acc | (e << (i as u32 * elem_width)));
                Ok((bits, width))
            }
            other => Err(sim_error!("{} has no bit pattern", other)),
        }
    }

    /// Reinterpret a bit pattern as `ty`.
    fn unflatten(bits: u128, ty: &IrType) -> LowerResult<Self> {
        match ty {
            IrType::Vector { elem, len } => {
                let elem_width = scalar_width(elem)?;
                if elem_width * len > MAX_SIM_BITS {
                    return Err(sim_error!("{} exceeds simulator width", ty));
                }
                let elems = (0..*len)
                    .map(|i| (bits >> (i * elem_width)) & mask(elem_width))
                    .collect();
                Ok(SimValue::Vector { elems, elem_width })
            }
            scalar => Ok(SimValue::int(scalar_width(scalar)?, bits)),
        }
    }
}

impl fmt::Display for SimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimValue::Bits { bits, width } => write!(f, "i{} 0x{:X}", width, bits),
            SimValue::Vector { elems, elem_width } => {
                write!(f, "<")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "i{} 0x{:X}", elem_width, e)?;
                }
                write!(f, ">")
            }
            SimValue::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            SimValue::Pointer { slot, field } => match field {
                Some(index) => write!(f, "&slot{}.{}", slot, index),
                None => write!(f, "&slot{}", slot),
            },
            SimValue::Global(name) => write!(f, "@{}", name),
            SimValue::Void => write!(f, "void"),
        }
    }
}

fn scalar_width(ty: &IrType) -> LowerResult<u32> {
    match ty {
        IrType::Int(_) | IrType::Half | IrType::Float | IrType::Double => {
            let width = ty.bit_width().unwrap_or(0);
            if width == 0 || width > MAX_SIM_BITS {
                return Err(sim_error!("{} is outside the simulated widths", ty));
            }
            Ok(width)
        }
        other => Err(sim_error!("{} is not a scalar", other)),
    }
}

/// A captured device printf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRecord {
    pub lane: LaneId,
    pub format: String,
    pub args: Vec<SimValue>,
}

/// Final per-lane values of a simulation.
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    values: BTreeMap<LaneId, Vec<Option<SimValue>>>,
    prints: Vec<PrintRecord>,
}

impl SimulationResult {
    /// Value `value` took in `lane`.
    pub fn value(&self, lane: LaneId, value: &DeviceValue) -> Option<&SimValue> {
        self.values
            .get(&lane)
            .and_then(|values| values.get(value.id.0))
            .and_then(Option::as_ref)
    }

    /// Lanes that executed, in launch order.
    pub fn lanes(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.values.keys().copied()
    }

    /// Lanes whose `value` is a non-zero predicate.
    pub fn lanes_where(&self, value: &DeviceValue) -> Vec<LaneId> {
        self.lanes()
            .filter(|&lane| {
                self.value(lane, value)
                    .and_then(SimValue::bits)
                    .is_some_and(|bits| bits != 0)
            })
            .collect()
    }

    pub fn prints(&self) -> &[PrintRecord] {
        &self.prints
    }
}

struct LaneState {
    id: LaneId,
    values: Vec<Option<SimValue>>,
    slots: Vec<SimValue>,
}

impl LaneState {
    fn get(&self, value: &DeviceValue) -> LowerResult<&SimValue> {
        self.values
            .get(value.id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| sim_error!("{} used before definition in {}", value.id, self.id))
    }

    fn set(&mut self, value: &DeviceValue, result: SimValue) {
        self.values[value.id.0] = Some(result);
    }
}

/// Runs an [`InstructionBuilder`]'s stream over a simulated launch.
#[derive(Debug)]
pub struct WavefrontSimulator<'a> {
    builder: &'a InstructionBuilder,
    wave_size: u32,
}

impl<'a> WavefrontSimulator<'a> {
    pub fn new(builder: &'a InstructionBuilder, arch: GpuArchitecture) -> Self {
        Self {
            builder,
            wave_size: arch.wave_size(),
        }
    }

    pub fn with_wave_size(mut self, wave_size: u32) -> Self {
        self.wave_size = wave_size.max(1);
        self
    }

    pub fn wave_size(&self) -> u32 {
        self.wave_size
    }

    /// Execute every lane of `launch`.
    ///
    /// `argument(lane, index)` supplies the value of live-in `index` for a
    /// lane; its width must match the declared argument type.
    pub fn run<F>(&self, launch: LaunchDims, mut argument: F) -> LowerResult<SimulationResult>
    where
        F: FnMut(LaneId, usize) -> SimValue,
    {
        let mut result = SimulationResult::default();
        for block in 0..launch.grid_blocks {
            let mut wave_start = 0;
            while wave_start < launch.block_threads {
                let wave_end = (wave_start + self.wave_size).min(launch.block_threads);
                let mut lanes: Vec<LaneState> = (wave_start..wave_end)
                    .map(|thread| LaneState {
                        id: LaneId::new(block, thread),
                        values: vec![None; self.builder.value_count()],
                        slots: Vec::new(),
                    })
                    .collect();
                self.run_wave(&mut lanes, &mut argument, &mut result.prints)?;
                for lane in lanes {
                    result.values.insert(lane.id, lane.values);
                }
                wave_start = wave_end;
            }
        }
        tracing::trace!(
            lanes = launch.lane_count(),
            prints = result.prints.len(),
            "simulation finished"
        );
        Ok(result)
    }

    fn run_wave<F>(
        &self,
        lanes: &mut [LaneState],
        argument: &mut F,
        prints: &mut Vec<PrintRecord>,
    ) -> LowerResult<()>
    where
        F: FnMut(LaneId, usize) -> SimValue,
    {
        let lane_read_up = self.builder.target().lane_read_up_function();
        for inst in self.builder.instructions() {
            match &inst.kind {
                InstructionKind::Call { callee, args } if callee == lane_read_up => {
                    self.exchange(inst, args, lanes)?;
                }
                _ => {
                    for lane in lanes.iter_mut() {
                        self.step(inst, lane, argument, prints)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Cross-lane read: lane `l` takes `value` from lane `l + offset`. A
    /// source outside the wavefront leaves the lane with its own value.
    fn exchange(
        &self,
        inst: &Instruction,
        args: &[DeviceValue],
        lanes: &mut [LaneState],
    ) -> LowerResult<()> {
        let (value, offset) = match args {
            [value, offset] => (value, offset),
            _ => return Err(sim_error!("lane read expects (value, offset)")),
        };
        let result = inst
            .result
            .as_ref()
            .ok_or_else(|| sim_error!("lane read without result"))?;
        let sources = lanes
            .iter()
            .map(|lane| lane.get(value).cloned())
            .collect::<LowerResult<Vec<_>>>()?;
        for (index, lane) in lanes.iter_mut().enumerate() {
            let delta = lane
                .get(offset)?
                .bits()
                .ok_or_else(|| sim_error!("lane read offset is not a scalar"))?;
            let delta = delta as u32 as i32 as i64;
            let source = index as i64 + delta;
            let picked = if source >= 0 && (source as usize) < sources.len() {
                sources[source as usize].clone()
            } else {
                sources[index].clone()
            };
            lane.set(result, picked);
        }
        Ok(())
    }

    fn step<F>(
        &self,
        inst: &Instruction,
        lane: &mut LaneState,
        argument: &mut F,
        prints: &mut Vec<PrintRecord>,
    ) -> LowerResult<()>
    where
        F: FnMut(LaneId, usize) -> SimValue,
    {
        let result = match &inst.result {
            Some(result) => result,
            None => {
                if let InstructionKind::Store { value, ptr } = &inst.kind {
                    let stored = lane.get(value)?.clone();
                    store(lane, ptr, stored)?;
                }
                return Ok(());
            }
        };
        let ty = &result.ty;
        let computed = match &inst.kind {
            InstructionKind::Argument { index } => {
                let supplied = argument(lane.id, *index);
                if !supplied.conforms_to(ty) {
                    return Err(sim_error!(
                        "argument #{} for {} is {}, expected {}",
                        index,
                        lane.id,
                        supplied,
                        ty
                    ));
                }
                supplied
            }
            InstructionKind::Bitcast { value } => {
                let source = lane.get(value)?;
                if ty.is_pointer() {
                    source.clone()
                } else {
                    let (bits, _) = source.flatten()?;
                    SimValue::unflatten(bits, ty)?
                }
            }
            InstructionKind::ZExt { value } | InstructionKind::Trunc { value } => {
                let (bits, _) = lane.get(value)?.flatten()?;
                SimValue::unflatten(bits, ty)?
            }
            InstructionKind::ExtractElement { vector, index } => match lane.get(vector)? {
                SimValue::Vector { elems, elem_width } => {
                    SimValue::int(*elem_width, elems[*index as usize])
                }
                other => return Err(sim_error!("extractelement from {}", other)),
            },
            InstructionKind::InsertElement {
                vector,
                element,
                index,
            } => {
                let bits = lane
                    .get(element)?
                    .bits()
                    .ok_or_else(|| sim_error!("inserted element is not a scalar"))?;
                match lane.get(vector)? {
                    SimValue::Vector { elems, elem_width } => {
                        let mut elems = elems.clone();
                        elems[*index as usize] = bits;
                        SimValue::Vector {
                            elems,
                            elem_width: *elem_width,
                        }
                    }
                    other => return Err(sim_error!("insertelement into {}", other)),
                }
            }
            InstructionKind::ExtractValue { aggregate, index } => match lane.get(aggregate)? {
                SimValue::Struct(fields) => fields
                    .get(*index as usize)
                    .cloned()
                    .ok_or_else(|| sim_error!("extractvalue of missing field {}", index))?,
                other => return Err(sim_error!("extractvalue from {}", other)),
            },
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            } => {
                let inserted = lane.get(element)?.clone();
                match lane.get(aggregate)? {
                    SimValue::Struct(fields) => {
                        let mut fields = fields.clone();
                        match fields.get_mut(*index as usize) {
                            Some(field) => *field = inserted,
                            None => return Err(sim_error!("insertvalue into missing field {}", index)),
                        }
                        SimValue::Struct(fields)
                    }
                    other => return Err(sim_error!("insertvalue into {}", other)),
                }
            }
            InstructionKind::Alloca { ty } => {
                lane.slots.push(SimValue::zero(ty)?);
                SimValue::Pointer {
                    slot: lane.slots.len() - 1,
                    field: None,
                }
            }
            InstructionKind::StructGep { ptr, index } => match lane.get(ptr)? {
                SimValue::Pointer { slot, field: None } => SimValue::Pointer {
                    slot: *slot,
                    field: Some(*index),
                },
                other => return Err(sim_error!("nested getelementptr on {}", other)),
            },
            InstructionKind::ConstInt { value } => SimValue::int(scalar_width(ty)?, *value),
            InstructionKind::ConstFloat { bits } => {
                SimValue::int(scalar_width(ty)?, u128::from(*bits))
            }
            InstructionKind::GlobalStringPtr { global } => SimValue::Global(global.clone()),
            InstructionKind::ICmpEq { lhs, rhs } => {
                let equal = lane.get(lhs)?.flatten()? == lane.get(rhs)?.flatten()?;
                SimValue::int(1, u128::from(equal))
            }
            InstructionKind::And { lhs, rhs } => {
                let (a, width) = lane.get(lhs)?.flatten()?;
                let (b, _) = lane.get(rhs)?.flatten()?;
                SimValue::int(width, a & b)
            }
            InstructionKind::Call { callee, args } => {
                self.call(callee, args, ty, lane, prints)?
            }
            InstructionKind::Store { .. } => return Err(sim_error!("store with a result")),
        };
        lane.set(result, computed);
        Ok(())
    }

    fn call(
        &self,
        callee: &str,
        args: &[DeviceValue],
        ret: &IrType,
        lane: &LaneState,
        prints: &mut Vec<PrintRecord>,
    ) -> LowerResult<SimValue> {
        let target = self.builder.target();
        if let Some(kind) = target.classify_intrinsic(callee) {
            // one-dimensional launch: y and z coordinates are always zero
            let coordinate = match kind {
                SimtIntrinsic::ThreadIdX => lane.id.thread,
                SimtIntrinsic::BlockIdX => lane.id.block,
                _ => 0,
            };
            return Ok(SimValue::int(32, u128::from(coordinate)));
        }
        if callee == target.printf_function() {
            let format = match args.first().map(|a| lane.get(a)).transpose()? {
                Some(SimValue::Global(name)) => self
                    .builder
                    .module()
                    .global_string(name)
                    .ok_or_else(|| sim_error!("unknown string constant @{}", name))?
                    .to_string(),
                _ => return Err(sim_error!("printf format is not a string constant")),
            };
            let values = match args.get(1).map(|a| lane.get(a)).transpose()? {
                Some(SimValue::Pointer { slot, field: None }) => match &lane.slots[*slot] {
                    SimValue::Struct(fields) => fields.clone(),
                    other => vec![other.clone()],
                },
                Some(other) => return Err(sim_error!("printf arguments at {}", other)),
                None => Vec::new(),
            };
            prints.push(PrintRecord {
                lane: lane.id,
                format,
                args: values,
            });
            return SimValue::zero(ret);
        }
        Err(sim_error!("no simulation for external function {}", callee))
    }
}

fn store(lane: &mut LaneState, ptr: &DeviceValue, value: SimValue) -> LowerResult<()> {
    let (slot, field) = match lane.get(ptr)? {
        SimValue::Pointer { slot, field } => (*slot, *field),
        other => return Err(sim_error!("store through {}", other)),
    };
    let target = lane
        .slots
        .get_mut(slot)
        .ok_or_else(|| sim_error!("store to unknown slot {}", slot))?;
    match field {
        None => *target = value,
        Some(index) => match target {
            SimValue::Struct(fields) => match fields.get_mut(index as usize) {
                Some(field) => *field = value,
                None => return Err(sim_error!("store to missing field {}", index)),
            },
            other => return Err(sim_error!("field store into {}", other)),
        },
    }
    Ok(())
}
