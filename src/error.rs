// Copyright (c) 2017-2021 Fabian Schuiki

//! Errors raised while analysing a function or rewriting it into GSA form.
//!
//! All of these are structural errors in the input. None of them are
//! transient; a function that produces one must be treated as untransformed.

use thiserror::Error;

/// An error encountered while building or transforming a control flow graph.
#[derive(Debug, Error)]
pub enum GsaError {
    /// A label referenced by an edge is not part of the block map, or the
    /// graph lacks a single reachable entry.
    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    /// A back edge whose header and latch both lack a conditional branch.
    #[error("loop back edge {latch} -> {header} has no conditional branch")]
    MalformedLoop { header: String, latch: String },

    /// A loop header phi whose incoming edges do not split into exactly one
    /// edge from inside and one from outside the loop.
    #[error("phi {reg} in loop header {block} cannot be split into initial and loop value")]
    UnpartitionableLoopPhi { block: String, reg: String },

    /// A phi outside a loop header that cannot be tied to a controlling
    /// conditional branch.
    #[error("cannot resolve gamma condition for {reg} in {block}: {reason}")]
    UnresolvableGammaCondition {
        block: String,
        reg: String,
        reason: String,
    },

    /// A request to synthesize an instruction for an opcode that has no
    /// corresponding variant.
    #[error("unknown instruction kind `{0}`")]
    UnknownInstructionKind(String),

    /// An instruction record whose fields do not fit its opcode.
    #[error("malformed `{opcode}` instruction: {reason}")]
    MalformedInstruction { opcode: String, reason: String },

    /// A transformed function violates the post-conditions of GSA form.
    #[error("verification failed:\n{0}")]
    Verification(String),

    /// The input could not be parsed.
    #[error("invalid input: {0}")]
    Json(#[from] serde_json::Error),
}

/// A result carrying a `GsaError`.
pub type Result<T> = std::result::Result<T, GsaError>;

/// An error attributed to a single function of a module.
#[derive(Debug, Error)]
#[error("function {function}: {source}")]
pub struct FunctionError {
    /// The name of the function that failed.
    pub function: String,
    /// The underlying error.
    #[source]
    pub source: GsaError,
}

impl FunctionError {
    /// Attribute an error to a function.
    pub fn new(function: impl Into<String>, source: GsaError) -> Self {
        Self {
            function: function.into(),
            source,
        }
    }
}

pub(crate) fn malformed(opcode: &str, reason: impl Into<String>) -> GsaError {
    GsaError::MalformedInstruction {
        opcode: opcode.to_owned(),
        reason: reason.into(),
    }
}
