// Copyright (c) 2017-2021 Fabian Schuiki

//! Verification of GSA form.
//!
//! This module implements verification of transformed functions. It checks
//! that no phi nodes or unthreaded memory instructions remain, that the state
//! tokens form a single chain, and that eta registers are scoped outside their
//! loops.

use crate::{
    error::Result,
    ir::{prelude::*, ETA_SUFFIX, INITIAL_STATE},
};
use std::{
    collections::HashSet,
    fmt::Display,
    ops::{Deref, DerefMut},
};

/// A GSA verifier.
///
/// The `Verifier` acts as a context to call the various checking functions
/// on. It keeps track of errors.
#[derive(Default)]
pub struct Verifier {
    errors: VerifierErrors,
    function: Option<String>,
}

impl Verifier {
    /// Create a new verifier.
    pub fn new() -> Self {
        Default::default()
    }

    /// Verify that a control flow graph is in GSA form.
    ///
    /// Fails only if the loop structure of the graph cannot be analysed;
    /// violations are collected and reported by `finish()`.
    pub fn verify_cfg(&mut self, cfg: &ControlFlowGraph) -> Result<()> {
        if cfg.is_declaration {
            return Ok(());
        }
        self.function = Some(cfg.name.clone());

        for bb in cfg.blocks() {
            for inst in &bb.insts {
                let opcode = inst.opcode();
                if opcode.is_phi() {
                    self.error(bb, inst, "phi node remains");
                } else if opcode.is_memory() && inst.states().is_none() {
                    self.error(bb, inst, "memory instruction carries no state");
                }
            }
        }

        self.verify_state_chain(cfg);
        self.verify_eta_scoping(cfg)?;
        self.function = None;
        Ok(())
    }

    /// Check that monadic instructions chain their state tokens from the
    /// initial token, in block order.
    fn verify_state_chain(&mut self, cfg: &ControlFlowGraph) {
        let mut current = INITIAL_STATE;
        let mut seen = HashSet::new();
        seen.insert(INITIAL_STATE);
        for bb in cfg.blocks() {
            for inst in &bb.insts {
                let (input, output) = match inst.states() {
                    Some(states) => states,
                    None => continue,
                };
                if input != current {
                    self.error(
                        bb,
                        inst,
                        format!("consumes state {} but current state is {}", input, current),
                    );
                }
                if !seen.insert(output) {
                    self.error(bb, inst, format!("state {} produced twice", output));
                }
                current = output;
            }
        }
    }

    /// Check that the eta register of every loop-carried value is defined by
    /// an eta node outside the loop, and not used inside it.
    fn verify_eta_scoping(&mut self, cfg: &ControlFlowGraph) -> Result<()> {
        for lp in cfg.loops()? {
            let header = cfg.get_block(&lp.entry)?;
            let carried = header.insts.iter().filter_map(|inst| match inst {
                InstData::Mu { ret_reg, .. } => Some(ret_reg),
                _ => None,
            });
            for reg in carried {
                let eta_reg = format!("{}{}", reg, ETA_SUFFIX);
                for bb in cfg.blocks() {
                    let inside = lp.contains(&bb.label);
                    for inst in &bb.insts {
                        if inside && inst.has_register(&eta_reg) {
                            self.error(bb, inst, format!("{} used inside its loop", eta_reg));
                        } else if inst.ret_reg() == Some(eta_reg.as_str())
                            && inst.opcode() != Opcode::Eta
                        {
                            self.error(bb, inst, format!("{} not defined by an eta", eta_reg));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn error(&mut self, bb: &BasicBlock, inst: &InstData, message: impl Into<String>) {
        self.errors.push(VerifierError {
            function: self.function.clone(),
            object: Some(format!("{}: {}", bb.label, inst)),
            message: message.into(),
        });
    }

    /// Finish verification and return the result.
    ///
    /// Consumes the verifier.
    pub fn finish(self) -> std::result::Result<(), VerifierErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// A verification error.
#[derive(Debug)]
pub struct VerifierError {
    /// The function within which the error occurred.
    pub function: Option<String>,
    /// The object which caused the error.
    pub object: Option<String>,
    /// The error message.
    pub message: String,
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(ref function) = self.function {
            write!(f, "{}: ", function)?;
        }
        if let Some(ref object) = self.object {
            write!(f, "{}: ", object)?;
        }
        write!(f, "{}", self.message)?;
        Ok(())
    }
}

/// A list of verification errors.
#[derive(Debug, Default)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl Deref for VerifierErrors {
    type Target = Vec<VerifierError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VerifierErrors {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for VerifierErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for err in self.iter() {
            writeln!(f, "- {}", err)?;
        }
        Ok(())
    }
}
