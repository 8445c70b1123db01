//! Instruction arena for HLO graphs.
//!
//! Fused computations live in the same arena as the outer graph: a fusion
//! names its fused root, and the fused body is everything reachable from
//! that root up to (and including) the body's own parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{LowerError, LowerResult};
use crate::hlo::{DotDimensionNumbers, FusionKind, HloInstruction, HloOp, InstrId, Shape};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HloGraph {
    pub instructions: Vec<HloInstruction>,
}

impl HloGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn add(&mut self, op: HloOp, operands: Vec<InstrId>, shape: Shape) -> InstrId {
        let id = InstrId(self.instructions.len());
        self.instructions.push(HloInstruction {
            id,
            op,
            operands,
            shape,
        });
        id
    }

    pub fn parameter(&mut self, number: usize, shape: Shape) -> InstrId {
        self.add(HloOp::Parameter { number }, vec![], shape)
    }

    pub fn dot(
        &mut self,
        lhs: InstrId,
        rhs: InstrId,
        dnums: DotDimensionNumbers,
        shape: Shape,
    ) -> InstrId {
        self.add(HloOp::Dot(dnums), vec![lhs, rhs], shape)
    }

    pub fn add_op(&mut self, lhs: InstrId, rhs: InstrId, shape: Shape) -> InstrId {
        self.add(HloOp::Add, vec![lhs, rhs], shape)
    }

    pub fn multiply(&mut self, lhs: InstrId, rhs: InstrId, shape: Shape) -> InstrId {
        self.add(HloOp::Multiply, vec![lhs, rhs], shape)
    }

    pub fn fusion(
        &mut self,
        kind: FusionKind,
        fused_root: InstrId,
        operands: Vec<InstrId>,
        shape: Shape,
    ) -> InstrId {
        self.add(HloOp::Fusion { kind, fused_root }, operands, shape)
    }

    pub fn reduce(&mut self, input: InstrId, dimensions: Vec<usize>, shape: Shape) -> InstrId {
        self.add(HloOp::Reduce { dimensions }, vec![input], shape)
    }

    pub fn custom_call(
        &mut self,
        target: impl Into<String>,
        operands: Vec<InstrId>,
        shape: Shape,
    ) -> InstrId {
        self.add(
            HloOp::CustomCall {
                target: target.into(),
            },
            operands,
            shape,
        )
    }

    pub fn instruction(&self, id: InstrId) -> Option<&HloInstruction> {
        self.instructions.get(id.0)
    }

    /// Like [`instruction`](Self::instruction) but reports a miss as an error.
    pub fn get(&self, id: InstrId) -> LowerResult<&HloInstruction> {
        self.instruction(id).ok_or(LowerError::UnknownInstruction(id))
    }

    pub fn operand(&self, instr: &HloInstruction, index: usize) -> Option<&HloInstruction> {
        instr.operand_id(index).and_then(|id| self.instruction(id))
    }

    /// Root of a fusion's body; `None` for other opcodes.
    pub fn fused_root(&self, instr: &HloInstruction) -> Option<&HloInstruction> {
        match &instr.op {
            HloOp::Fusion { fused_root, .. } => self.instruction(*fused_root),
            _ => None,
        }
    }

    /// Instructions inside a fusion's body, root first.
    pub fn fused_instructions(&self, fusion: &HloInstruction) -> Vec<InstrId> {
        let mut body = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<InstrId> = match &fusion.op {
            HloOp::Fusion { fused_root, .. } => vec![*fused_root],
            _ => return body,
        };
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            body.push(id);
            if let Some(instr) = self.instruction(id) {
                if matches!(instr.op, HloOp::Parameter { .. }) {
                    continue;
                }
                stack.extend(instr.operands.iter().rev().copied());
            }
        }
        body
    }

    /// Instructions that are not part of any fused body.
    pub fn top_level(&self) -> Vec<&HloInstruction> {
        let fused: HashSet<InstrId> = self
            .instructions
            .iter()
            .filter(|i| matches!(i.op, HloOp::Fusion { .. }))
            .flat_map(|f| self.fused_instructions(f))
            .collect();
        self.instructions
            .iter()
            .filter(|i| !fused.contains(&i.id))
            .collect()
    }

    /// Check ids are dense and every reference points backwards.
    pub fn validate(&self) -> LowerResult<()> {
        for (index, instr) in self.instructions.iter().enumerate() {
            if instr.id.0 != index {
                return Err(LowerError::InvalidGraph(format!(
                    "instruction at position {} has id {}",
                    index, instr.id
                )));
            }
            for operand in &instr.operands {
                if operand.0 >= index {
                    return Err(LowerError::InvalidGraph(format!(
                        "{} uses {} which is not defined before it",
                        instr.id, operand
                    )));
                }
            }
            match &instr.op {
                HloOp::Fusion { fused_root, .. } if fused_root.0 >= index => {
                    return Err(LowerError::InvalidGraph(format!(
                        "fusion {} has root {} which is not defined before it",
                        instr.id, fused_root
                    )));
                }
                HloOp::Dot(_) if instr.operands.len() != 2 => {
                    return Err(LowerError::InvalidGraph(format!(
                        "dot {} has {} operands, expected 2",
                        instr.id,
                        instr.operands.len()
                    )));
                }
                HloOp::Dot(dnums) => self.validate_dot_dimensions(instr, dnums)?,
                HloOp::Reduce { .. } if instr.operands.is_empty() => {
                    return Err(LowerError::InvalidGraph(format!(
                        "reduce {} has no input",
                        instr.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Contracting and batch indices must exist in their operand and pair up
    /// one to one between the two sides.
    fn validate_dot_dimensions(
        &self,
        dot: &HloInstruction,
        dnums: &DotDimensionNumbers,
    ) -> LowerResult<()> {
        if dnums.lhs_contracting_dimensions.len() != dnums.rhs_contracting_dimensions.len()
            || dnums.lhs_batch_dimensions.len() != dnums.rhs_batch_dimensions.len()
        {
            return Err(LowerError::InvalidGraph(format!(
                "dot {} pairs {} lhs with {} rhs contracting and {} lhs with {} rhs batch dimensions",
                dot.id,
                dnums.lhs_contracting_dimensions.len(),
                dnums.rhs_contracting_dimensions.len(),
                dnums.lhs_batch_dimensions.len(),
                dnums.rhs_batch_dimensions.len()
            )));
        }
        let sides = [
            (0, &dnums.lhs_contracting_dimensions, &dnums.lhs_batch_dimensions),
            (1, &dnums.rhs_contracting_dimensions, &dnums.rhs_batch_dimensions),
        ];
        for (index, contracting, batch) in sides {
            let operand = self.operand(dot, index).ok_or_else(|| {
                LowerError::InvalidGraph(format!("dot {} is missing operand {}", dot.id, index))
            })?;
            let rank = operand.shape.rank();
            if let Some(bad) = contracting.iter().chain(batch).find(|&&d| d >= rank) {
                return Err(LowerError::InvalidGraph(format!(
                    "dot {} names dimension {} of rank-{} operand {}",
                    dot.id, bad, rank, operand.id
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> LowerResult<Self> {
        let graph: HloGraph = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn to_json(&self) -> LowerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> LowerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> LowerResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
