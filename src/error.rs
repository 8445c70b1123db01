//! Unified error handling for rocmlower
//!
//! Classification never fails: an ineligible node is an ordinary `false`.
//! Errors exist for the few places where an unsupported program or a
//! builder misuse must reach the compilation's top-level error channel:
//! - Lowering errors (unrecognized call targets, malformed graphs)
//! - Emission errors (signature conflicts, type mismatches)
//! - Simulation errors (wavefront evaluation of recorded IR)
//! - Configuration and I/O errors

use std::fmt;

use crate::hlo::InstrId;
use crate::ir::ValueId;

/// Unified error type for rocmlower
#[derive(Debug, thiserror::Error)]
pub enum LowerError {
    // ========== Lowering Errors ==========
    /// Custom-call target is not one of the known convolution identifiers
    #[error("unrecognized call target: {0}")]
    UnrecognizedCallTarget(String),

    /// A custom-call-only query was asked of another opcode
    #[error("instruction {0} is not a custom call")]
    NotACustomCall(InstrId),

    /// Instruction id does not belong to the graph
    #[error("unknown instruction: {0}")]
    UnknownInstruction(InstrId),

    /// Structural problem in an HLO graph
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    // ========== Emission Errors ==========
    /// A function already exists under this name with another signature
    #[error("conflicting declaration of {name}: existing {existing}, requested {requested}")]
    SignatureMismatch {
        name: String,
        existing: String,
        requested: String,
    },

    /// Instruction operands have incompatible types
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Value handle was not produced by this builder
    #[error("unknown value: {0}")]
    UnknownValue(ValueId),

    // ========== Simulation Errors ==========
    /// Wavefront simulation failed
    #[error("simulation failed: {0}")]
    Simulation(String),

    // ========== Configuration Errors ==========
    /// Backend configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== I/O Errors ==========
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl LowerError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Unsupported programs and bad inputs
            LowerError::UnrecognizedCallTarget(_)
            | LowerError::InvalidGraph(_)
            | LowerError::Json(_) => ErrorCategory::User,

            LowerError::InvalidConfiguration(_) | LowerError::Io(_) => ErrorCategory::Config,

            LowerError::SignatureMismatch { .. }
            | LowerError::TypeMismatch(_)
            | LowerError::UnknownValue(_)
            | LowerError::Simulation(_) => ErrorCategory::Backend,

            LowerError::NotACustomCall(_)
            | LowerError::UnknownInstruction(_)
            | LowerError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this is a user-facing error (unsupported or malformed program)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a compiler bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
///
/// - User: the input program is unsupported or malformed
/// - Config: environment, files or backend settings
/// - Backend: the instruction builder or simulator rejected something
/// - Internal: indicates a bug in the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    User,
    Config,
    Backend,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

pub type LowerResult<T> = std::result::Result<T, LowerError>;

/// Create an internal error with context
///
/// # Examples
/// ```ignore
/// return Err(internal_error!("fusion {} has no root", id));
/// ```
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::LowerError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LowerError::Internal(format!($fmt, $($arg)*))
    };
}

/// Create a type-mismatch error for builder misuse
///
/// # Examples
/// ```ignore
/// return Err(type_mismatch!("bitcast {} -> {}", from, to));
/// ```
#[macro_export]
macro_rules! type_mismatch {
    ($msg:expr) => {
        $crate::error::LowerError::TypeMismatch($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LowerError::TypeMismatch(format!($fmt, $($arg)*))
    };
}

/// Create a simulation error
#[macro_export]
macro_rules! sim_error {
    ($msg:expr) => {
        $crate::error::LowerError::Simulation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LowerError::Simulation(format!($fmt, $($arg)*))
    };
}
