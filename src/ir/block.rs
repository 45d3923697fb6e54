// Copyright (c) 2017-2021 Fabian Schuiki

use crate::ir::{InstData, Opcode};

/// A basic block.
///
/// The predecessor and successor lists are taken verbatim from the input and
/// mirror the edges of the owning control flow graph; they are never
/// recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// The label of the block, unique within its function.
    pub label: String,
    /// Labels of the predecessor blocks.
    pub preds: Vec<String>,
    /// Labels of the successor blocks.
    pub succs: Vec<String>,
    /// The instructions of the block, in order.
    pub insts: Vec<InstData>,
}

impl BasicBlock {
    /// Create an empty block.
    pub fn new(label: impl Into<String>, preds: Vec<String>, succs: Vec<String>) -> Self {
        Self {
            label: label.into(),
            preds,
            succs,
            insts: vec![],
        }
    }

    /// Append instructions to the block, in order.
    pub fn add_instructions(&mut self, insts: impl IntoIterator<Item = InstData>) {
        self.insts.extend(insts);
    }

    /// Get the positions of all instructions of an opcode family.
    pub fn get_instructions_indexes(&self, opcode: Opcode) -> Vec<usize> {
        self.insts
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.opcode() == opcode)
            .map(|(i, _)| i)
            .collect()
    }

    /// Get the branch instruction of the block.
    ///
    /// Searches from the end of the block, so trailing non-branch
    /// instructions are skipped.
    pub fn get_branch_instruction(&self) -> Option<&InstData> {
        self.insts.iter().rev().find(|inst| inst.is_branch())
    }

    /// Get the positions of all instructions that mention a register.
    pub fn instructions_with_register(&self, reg: &str) -> Vec<usize> {
        self.insts
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.has_register(reg))
            .map(|(i, _)| i)
            .collect()
    }

    /// Get the registers defined by the instructions of the block.
    pub fn declared_registers(&self) -> Vec<&str> {
        self.insts.iter().filter_map(InstData::ret_reg).collect()
    }

    /// Replace the instruction at a position.
    ///
    /// Returns the previous instruction. Positions of all other instructions
    /// are unaffected.
    pub fn replace_instruction(&mut self, index: usize, inst: InstData) -> InstData {
        std::mem::replace(&mut self.insts[index], inst)
    }

    /// Insert an instruction at the start of the block.
    pub fn prepend_instruction(&mut self, inst: InstData) {
        self.insts.insert(0, inst);
    }

    /// Rename a register in the instruction at a position.
    pub fn replace_register(&mut self, index: usize, old: &str, new: &str) -> usize {
        self.insts[index].replace_register(old, new)
    }
}
