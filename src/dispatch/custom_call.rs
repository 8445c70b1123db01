//! Custom calls into the DNN library.
//!
//! The call-target strings below are shared with the runtime that services
//! the calls. Changing one is an ABI break.

use std::fmt;

use crate::error::{LowerError, LowerResult};
use crate::hlo::{HloInstruction, HloOp};

pub const BATCH_NORM_FORWARD_INFERENCE_CALL_TARGET: &str =
    "__cudnn$batchNormalizationForwardInference";
pub const BATCH_NORM_FORWARD_TRAINING_CALL_TARGET: &str =
    "__cudnn$batchNormalizationForwardTraining";
pub const BATCH_NORM_BACKWARD_CALL_TARGET: &str = "__cudnn$batchNormalizationBackward";

pub const CONV_FORWARD_CALL_TARGET: &str = "__cudnn$convForward";
pub const CONV_BACKWARD_INPUT_CALL_TARGET: &str = "__cudnn$convBackwardInput";
pub const CONV_BACKWARD_FILTER_CALL_TARGET: &str = "__cudnn$convBackwardFilter";
pub const CONV_BIAS_ACTIVATION_FORWARD_CALL_TARGET: &str = "__cudnn$convBiasActivationForward";

const BATCH_NORM_CALL_TARGETS: [&str; 3] = [
    BATCH_NORM_FORWARD_INFERENCE_CALL_TARGET,
    BATCH_NORM_FORWARD_TRAINING_CALL_TARGET,
    BATCH_NORM_BACKWARD_CALL_TARGET,
];

const CONV_CALL_TARGETS: [&str; 4] = [
    CONV_FORWARD_CALL_TARGET,
    CONV_BACKWARD_INPUT_CALL_TARGET,
    CONV_BACKWARD_FILTER_CALL_TARGET,
    CONV_BIAS_ACTIVATION_FORWARD_CALL_TARGET,
];

/// Which convolution entry point a custom call invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvKind {
    Forward,
    BackwardInput,
    BackwardFilter,
    /// Fused conv + bias + activation.
    ForwardActivation,
}

impl ConvKind {
    /// Label used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            ConvKind::Forward => "forward",
            ConvKind::BackwardFilter => "backward_filter",
            ConvKind::BackwardInput => "backward_input",
            ConvKind::ForwardActivation => "forward with activation",
        }
    }

    /// Map a call-target string to its kind; `None` if unknown.
    pub fn from_call_target(target: &str) -> Option<Self> {
        match target {
            CONV_FORWARD_CALL_TARGET => Some(ConvKind::Forward),
            CONV_BACKWARD_INPUT_CALL_TARGET => Some(ConvKind::BackwardInput),
            CONV_BACKWARD_FILTER_CALL_TARGET => Some(ConvKind::BackwardFilter),
            CONV_BIAS_ACTIVATION_FORWARD_CALL_TARGET => Some(ConvKind::ForwardActivation),
            _ => None,
        }
    }

    pub fn call_target(self) -> &'static str {
        match self {
            ConvKind::Forward => CONV_FORWARD_CALL_TARGET,
            ConvKind::BackwardInput => CONV_BACKWARD_INPUT_CALL_TARGET,
            ConvKind::BackwardFilter => CONV_BACKWARD_FILTER_CALL_TARGET,
            ConvKind::ForwardActivation => CONV_BIAS_ACTIVATION_FORWARD_CALL_TARGET,
        }
    }
}

impl fmt::Display for ConvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn custom_call_target(hlo: &HloInstruction) -> Option<&str> {
    match &hlo.op {
        HloOp::CustomCall { target } => Some(target),
        HloOp::Parameter { .. }
        | HloOp::Constant
        | HloOp::Add
        | HloOp::Multiply
        | HloOp::Dot(_)
        | HloOp::Fusion { .. }
        | HloOp::Reduce { .. }
        | HloOp::Other { .. } => None,
    }
}

/// True if `hlo` is a custom call to one of the batch-norm entry points.
pub fn is_custom_call_to_dnn_batch_norm(hlo: &HloInstruction) -> bool {
    custom_call_target(hlo)
        .is_some_and(|target| BATCH_NORM_CALL_TARGETS.iter().any(|&known| known == target))
}

/// True if `hlo` is a custom call to one of the convolution entry points.
pub fn is_custom_call_to_dnn_convolution(hlo: &HloInstruction) -> bool {
    custom_call_target(hlo)
        .is_some_and(|target| CONV_CALL_TARGETS.iter().any(|&known| known == target))
}

/// Convolution kind of a custom call.
///
/// Fails with [`LowerError::UnrecognizedCallTarget`] carrying the literal
/// target when it is not a convolution identifier, and with
/// [`LowerError::NotACustomCall`] for other opcodes.
pub fn conv_kind(hlo: &HloInstruction) -> LowerResult<ConvKind> {
    let target = custom_call_target(hlo).ok_or(LowerError::NotACustomCall(hlo.id))?;
    ConvKind::from_call_target(target)
        .ok_or_else(|| LowerError::UnrecognizedCallTarget(target.to_string()))
}
