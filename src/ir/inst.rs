// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of basic block instructions.
//!
//! Instructions arrive as loosely shaped records from the IR extraction and
//! are turned into a closed set of variants here. Besides the ordinary SSA
//! instructions this includes the nodes synthesized during the GSA
//! transformation: `gamma`, `mu`, `eta`, and the monadic forms of the memory
//! instructions.

use crate::error::{GsaError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

/// The initial memory state token threaded into the first memory instruction.
pub const INITIAL_STATE: &str = "s0";

/// The suffix appended to a loop-carried register materialized at a loop exit.
pub const ETA_SUFFIX: &str = "_eta";

/// An instruction operand.
///
/// Registers, labels, function names, and types are all carried as names.
/// Structured fields such as case tables are kept opaque in `Other` and never
/// refer to registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Bool(bool),
    Int(i64),
    Float(f64),
    Name(String),
    List(Vec<Operand>),
    Other(Value),
}

impl Operand {
    /// Return the name carried by this operand, if any.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Check whether this operand refers to a register.
    pub fn mentions(&self, reg: &str) -> bool {
        match self {
            Operand::Name(n) => n == reg,
            Operand::List(ops) => ops.iter().any(|op| op.mentions(reg)),
            _ => false,
        }
    }

    /// Replace every reference to `old` with `new`. Returns the number of
    /// replaced occurrences.
    pub fn rename(&mut self, old: &str, new: &str) -> usize {
        match self {
            Operand::Name(n) if n == old => {
                *n = new.to_owned();
                1
            }
            Operand::List(ops) => ops.iter_mut().map(|op| op.rename(old, new)).sum(),
            _ => 0,
        }
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_owned())
    }
}

impl From<String> for Operand {
    fn from(name: String) -> Self {
        Operand::Name(name)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Bool(v) => write!(f, "{}", v),
            Operand::Int(v) => write!(f, "{}", v),
            Operand::Float(v) => write!(f, "{}", v),
            Operand::Name(v) => write!(f, "{}", v),
            Operand::List(v) => write!(f, "[{}]", v.iter().format(", ")),
            Operand::Other(v) => write!(f, "{}", v),
        }
    }
}

/// The named operand fields of an instruction that is not modelled in detail.
pub type Operands = BTreeMap<String, Operand>;

/// The families of instructions distinguished by the analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Phi,
    Br,
    Alloca,
    Load,
    Store,
    Gamma,
    Mu,
    Eta,
    Other,
}

impl Opcode {
    /// Map an opcode mnemonic to its family.
    pub fn from_name(name: &str) -> Self {
        match name {
            "phi" => Opcode::Phi,
            "br" => Opcode::Br,
            "alloca" => Opcode::Alloca,
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "gamma" => Opcode::Gamma,
            "mu" => Opcode::Mu,
            "eta" => Opcode::Eta,
            _ => Opcode::Other,
        }
    }

    /// Check if this is a phi instruction.
    pub fn is_phi(self) -> bool {
        self == Opcode::Phi
    }

    /// Check if this is a branch instruction.
    pub fn is_branch(self) -> bool {
        self == Opcode::Br
    }

    /// Check if this instruction reads or writes memory.
    pub fn is_memory(self) -> bool {
        match self {
            Opcode::Alloca | Opcode::Load | Opcode::Store => true,
            _ => false,
        }
    }

    /// Check if this is one of the synthesized GSA nodes.
    pub fn is_gated(self) -> bool {
        match self {
            Opcode::Gamma | Opcode::Mu | Opcode::Eta => true,
            _ => false,
        }
    }
}

/// The memory instructions that are threaded through a state token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Alloca,
    Load,
    Store,
}

impl MemoryOp {
    /// The mnemonic of this instruction.
    pub fn name(self) -> &'static str {
        match self {
            MemoryOp::Alloca => "alloca",
            MemoryOp::Load => "load",
            MemoryOp::Store => "store",
        }
    }

    /// The opcode family of this instruction.
    pub fn opcode(self) -> Opcode {
        match self {
            MemoryOp::Alloca => Opcode::Alloca,
            MemoryOp::Load => Opcode::Load,
            MemoryOp::Store => Opcode::Store,
        }
    }
}

/// A single incoming edge of a phi instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incoming {
    /// The value flowing in along the edge.
    pub value: Operand,
    /// The predecessor block the edge comes from.
    pub label: String,
}

impl Incoming {
    /// Create a new incoming edge.
    pub fn new(value: impl Into<Operand>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// An instruction in a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum InstData {
    /// `ret_reg = phi [value, label]*`
    Phi {
        ret_reg: String,
        incoming: Vec<Incoming>,
    },
    /// `br condition, if_true, if_false`
    CondBranch {
        condition: Operand,
        if_true: String,
        if_false: String,
    },
    /// `br target`
    Branch { target: String },
    /// An `alloca`, `load`, or `store` that has not been threaded yet.
    Memory { op: MemoryOp, fields: Operands },
    /// A memory instruction consuming `input_state` and producing
    /// `output_state`.
    Monadic {
        op: MemoryOp,
        fields: Operands,
        input_state: String,
        output_state: String,
    },
    /// `ret_reg = condition ? true_value : false_value`
    Gamma {
        ret_reg: String,
        condition: Operand,
        true_value: Operand,
        false_value: Operand,
    },
    /// A loop-carried value; `initial_value` on entry, `loop_value` on every
    /// further iteration.
    Mu {
        ret_reg: String,
        initial_value: Operand,
        loop_value: Operand,
    },
    /// The value of a loop-carried register once `condition` lets control
    /// leave the loop.
    Eta {
        ret_reg: String,
        condition: Operand,
        value: Operand,
    },
    /// Any other instruction, treated as an uninterpreted operation.
    Other { opcode: String, fields: Operands },
}

impl InstData {
    /// Create a conditional branch.
    pub fn cond_br(
        condition: impl Into<Operand>,
        if_true: impl Into<String>,
        if_false: impl Into<String>,
    ) -> Self {
        InstData::CondBranch {
            condition: condition.into(),
            if_true: if_true.into(),
            if_false: if_false.into(),
        }
    }

    /// Create an unconditional branch.
    pub fn br(target: impl Into<String>) -> Self {
        InstData::Branch {
            target: target.into(),
        }
    }

    /// Create a phi instruction.
    pub fn phi(ret_reg: impl Into<String>, incoming: Vec<Incoming>) -> Self {
        InstData::Phi {
            ret_reg: ret_reg.into(),
            incoming,
        }
    }

    /// Create an ordinary instruction from an opcode and its named operands.
    ///
    /// Memory, phi, and branch opcodes are routed to their dedicated
    /// variants; other dedicated opcodes are rejected since their operands
    /// are not free-form.
    pub fn op<'a>(
        opcode: &str,
        fields: impl IntoIterator<Item = (&'a str, Operand)>,
    ) -> Result<Self> {
        let fields: Operands = fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        match Opcode::from_name(opcode) {
            Opcode::Alloca => Ok(InstData::Memory {
                op: MemoryOp::Alloca,
                fields,
            }),
            Opcode::Load => Ok(InstData::Memory {
                op: MemoryOp::Load,
                fields,
            }),
            Opcode::Store => Ok(InstData::Memory {
                op: MemoryOp::Store,
                fields,
            }),
            Opcode::Other => Ok(InstData::Other {
                opcode: opcode.to_owned(),
                fields,
            }),
            _ => Err(GsaError::UnknownInstructionKind(opcode.to_owned())),
        }
    }

    /// Create a binary operation `ret_reg = opcode arg_1, arg_2`.
    pub fn binary(
        opcode: &str,
        ret_reg: &str,
        arg_1: impl Into<Operand>,
        arg_2: impl Into<Operand>,
    ) -> Self {
        InstData::Other {
            opcode: opcode.to_owned(),
            fields: vec![
                ("ret_reg".to_owned(), Operand::from(ret_reg)),
                ("arg_1".to_owned(), arg_1.into()),
                ("arg_2".to_owned(), arg_2.into()),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Return the opcode family of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            InstData::Phi { .. } => Opcode::Phi,
            InstData::CondBranch { .. } | InstData::Branch { .. } => Opcode::Br,
            InstData::Memory { op, .. } | InstData::Monadic { op, .. } => op.opcode(),
            InstData::Gamma { .. } => Opcode::Gamma,
            InstData::Mu { .. } => Opcode::Mu,
            InstData::Eta { .. } => Opcode::Eta,
            InstData::Other { .. } => Opcode::Other,
        }
    }

    /// Return the mnemonic of this instruction.
    pub fn name(&self) -> &str {
        match self {
            InstData::Phi { .. } => "phi",
            InstData::CondBranch { .. } | InstData::Branch { .. } => "br",
            InstData::Memory { op, .. } | InstData::Monadic { op, .. } => op.name(),
            InstData::Gamma { .. } => "gamma",
            InstData::Mu { .. } => "mu",
            InstData::Eta { .. } => "eta",
            InstData::Other { opcode, .. } => opcode,
        }
    }

    /// Return the register defined by this instruction, if any.
    pub fn ret_reg(&self) -> Option<&str> {
        match self {
            InstData::Phi { ret_reg, .. }
            | InstData::Gamma { ret_reg, .. }
            | InstData::Mu { ret_reg, .. }
            | InstData::Eta { ret_reg, .. } => Some(ret_reg),
            InstData::Memory { fields, .. }
            | InstData::Monadic { fields, .. }
            | InstData::Other { fields, .. } => {
                fields.get("ret_reg").and_then(Operand::as_name)
            }
            InstData::CondBranch { .. } | InstData::Branch { .. } => None,
        }
    }

    /// Check whether this is a branch.
    pub fn is_branch(&self) -> bool {
        self.opcode().is_branch()
    }

    /// Return the condition and the two targets if this is a conditional
    /// branch.
    pub fn as_cond_branch(&self) -> Option<(&Operand, &str, &str)> {
        match self {
            InstData::CondBranch {
                condition,
                if_true,
                if_false,
            } => Some((condition, if_true, if_false)),
            _ => None,
        }
    }

    /// Return the state tokens consumed and produced by a monadic memory
    /// instruction.
    pub fn states(&self) -> Option<(&str, &str)> {
        match self {
            InstData::Monadic {
                input_state,
                output_state,
                ..
            } => Some((input_state, output_state)),
            _ => None,
        }
    }

    fn operands(&self) -> Vec<&Operand> {
        match self {
            InstData::Phi { incoming, .. } => incoming.iter().map(|i| &i.value).collect(),
            InstData::CondBranch { condition, .. } => vec![condition],
            InstData::Branch { .. } => vec![],
            InstData::Memory { fields, .. }
            | InstData::Monadic { fields, .. }
            | InstData::Other { fields, .. } => fields.values().collect(),
            InstData::Gamma {
                condition,
                true_value,
                false_value,
                ..
            } => vec![condition, true_value, false_value],
            InstData::Mu {
                initial_value,
                loop_value,
                ..
            } => vec![initial_value, loop_value],
            InstData::Eta {
                condition, value, ..
            } => vec![condition, value],
        }
    }

    fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            InstData::Phi { incoming, .. } => incoming.iter_mut().map(|i| &mut i.value).collect(),
            InstData::CondBranch { condition, .. } => vec![condition],
            InstData::Branch { .. } => vec![],
            InstData::Memory { fields, .. }
            | InstData::Monadic { fields, .. }
            | InstData::Other { fields, .. } => fields.values_mut().collect(),
            InstData::Gamma {
                condition,
                true_value,
                false_value,
                ..
            } => vec![condition, true_value, false_value],
            InstData::Mu {
                initial_value,
                loop_value,
                ..
            } => vec![initial_value, loop_value],
            InstData::Eta {
                condition, value, ..
            } => vec![condition, value],
        }
    }

    /// Check whether a register occurs anywhere in this instruction.
    ///
    /// Block labels of branches and phi edges are not registers and are not
    /// considered.
    pub fn has_register(&self, reg: &str) -> bool {
        let defines = match self {
            InstData::Phi { ret_reg, .. }
            | InstData::Gamma { ret_reg, .. }
            | InstData::Mu { ret_reg, .. }
            | InstData::Eta { ret_reg, .. } => ret_reg.as_str() == reg,
            _ => false,
        };
        defines || self.operands().into_iter().any(|op| op.mentions(reg))
    }

    /// Replace every occurrence of register `old` with `new`. Returns the
    /// number of replaced occurrences.
    pub fn replace_register(&mut self, old: &str, new: &str) -> usize {
        let mut count = match self {
            InstData::Phi { ret_reg, .. }
            | InstData::Gamma { ret_reg, .. }
            | InstData::Mu { ret_reg, .. }
            | InstData::Eta { ret_reg, .. }
                if ret_reg.as_str() == old =>
            {
                *ret_reg = new.to_owned();
                1
            }
            _ => 0,
        };
        for op in self.operands_mut() {
            count += op.rename(old, new);
        }
        count
    }

    /// Turn a memory instruction into its monadic counterpart.
    pub fn into_monadic(
        self,
        input_state: impl Into<String>,
        output_state: impl Into<String>,
    ) -> Result<InstData> {
        match self {
            InstData::Memory { op, fields } => Ok(InstData::Monadic {
                op,
                fields,
                input_state: input_state.into(),
                output_state: output_state.into(),
            }),
            other => Err(GsaError::UnknownInstructionKind(format!(
                "monadic {}",
                other.name()
            ))),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter, fields: &Operands) -> fmt::Result {
    let args = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "ret_reg")
        .map(|(k, v)| format!("{}={}", k, v));
    write!(f, "{}", args.format(", "))
}

impl fmt::Display for InstData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(reg) = self.ret_reg() {
            write!(f, "{} = ", reg)?;
        }
        match self {
            InstData::Phi { incoming, .. } => write!(
                f,
                "phi {}",
                incoming
                    .iter()
                    .format_with(", ", |i, f| f(&format_args!("[{}, {}]", i.value, i.label)))
            ),
            InstData::CondBranch {
                condition,
                if_true,
                if_false,
            } => write!(f, "br {}, {}, {}", condition, if_true, if_false),
            InstData::Branch { target } => write!(f, "br {}", target),
            InstData::Memory { op, fields } => {
                write!(f, "{} ", op.name())?;
                write_fields(f, fields)
            }
            InstData::Monadic {
                op,
                fields,
                input_state,
                output_state,
            } => {
                write!(f, "{} ", op.name())?;
                write_fields(f, fields)?;
                write!(f, " [{} -> {}]", input_state, output_state)
            }
            InstData::Gamma {
                condition,
                true_value,
                false_value,
                ..
            } => write!(f, "gamma {}, {}, {}", condition, true_value, false_value),
            InstData::Mu {
                initial_value,
                loop_value,
                ..
            } => write!(f, "mu {}, {}", initial_value, loop_value),
            InstData::Eta {
                condition, value, ..
            } => write!(f, "eta {}, {}", condition, value),
            InstData::Other { opcode, fields } => {
                write!(f, "{} ", opcode)?;
                write_fields(f, fields)
            }
        }
    }
}
