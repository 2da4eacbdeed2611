//! Error Types
//!
//! Every fallible operation in the crate returns [`GraphError`]. Type
//! capability failures are reported as [`TypeError`] and nested into
//! [`GraphError::Type`] when they cross into graph code.
//!
//! Nothing here is retried: construction, structural and execution errors
//! are all fatal for the call that raised them.

use thiserror::Error;

use crate::graph::{ApplyId, VarId};
use crate::value::DType;

/// Errors raised by a [`Type`](crate::types::Type) when data or a variable
/// does not fit its domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("expected dtype {expected}, got {got}")]
    DType { expected: DType, got: DType },

    #[error("cannot downcast {from} to {to} without allow_downcast")]
    Downcast { from: DType, to: DType },

    #[error("expected shape {expected}, got {got:?}")]
    Shape { expected: String, got: Vec<usize> },

    #[error("expected {expected} elements, got {got}")]
    Size { expected: usize, got: usize },

    #[error("variable of type {got} is not compatible with {expected}")]
    Incompatible { expected: String, got: String },

    #[error("{0}")]
    Invalid(String),
}

/// Errors raised by the graph model, the scheduler, the cloning engine and
/// the linkers.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),

    #[error("unknown apply node {0}")]
    UnknownApply(ApplyId),

    #[error("output {var} passed to an apply already belongs to another node")]
    ForeignOutput { var: VarId },

    #[error("atomic variable {var} cannot be the output of an apply")]
    AtomicOutput { var: VarId },

    #[error("{op} expects {expected} inputs, got {got}")]
    Arity {
        op: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("graph contains cycles")]
    Cycle,

    #[error("multi-output op {op} does not specify a default output")]
    AmbiguousOutput { op: String },

    #[error("default output {index} of {op} is out of range ({nout} outputs)")]
    DefaultOutputOutOfRange {
        op: String,
        index: usize,
        nout: usize,
    },

    #[error("the number of graphs in each argument must match ({left} != {right})")]
    LengthMismatch { left: usize, right: usize },

    #[error("variable {0} has no replacement in the clone memo")]
    Unmapped(VarId),

    #[error("variable {var} is needed to compute the outputs but is not a graph input")]
    MissingInput { var: VarId },

    #[error("{op}: {reason}")]
    Perform { op: String, reason: String },

    #[error("no value in storage for input {position} of {op}")]
    MissingValue { op: String, position: usize },

    #[error("error while executing {op} (node {apply}, inputs: [{inputs}]): {source}")]
    Execution {
        apply: ApplyId,
        op: String,
        inputs: String,
        #[source]
        source: Box<GraphError>,
    },

    #[error("all linkers must execute operations in the same order")]
    OrderMismatch,

    #[error("a wrap linker needs at least one linker")]
    NoLinkers,

    #[error("cannot set read-only container {name}")]
    ReadOnly { name: String },

    #[error("container {name}: {source}")]
    Container {
        name: String,
        #[source]
        source: TypeError,
    },

    #[error("function takes exactly {expected} arguments ({got} given)")]
    ArgumentCount { expected: usize, got: usize },

    #[error("invalid linker configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl GraphError {
    /// Shorthand for an op-level failure raised from `perform`.
    pub fn perform(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Perform {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
