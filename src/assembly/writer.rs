// Copyright (c) 2017-2021 Fabian Schuiki

//! Emitting control flow graphs as human-readable text.

use crate::{ir::prelude::*, module::FunctionOutcome};
use itertools::Itertools;
use std::io::{Result, Write};

/// Temporary object to emit the textual form of functions.
pub struct Writer<T> {
    sink: T,
}

impl<T: Write> Writer<T> {
    /// Create a new writer.
    pub fn new(sink: T) -> Self {
        Self { sink }
    }

    /// Emit every function of a transformed module.
    ///
    /// Functions that failed to transform are listed as comments.
    pub fn write_module(&mut self, outcomes: &[FunctionOutcome]) -> Result<()> {
        let mut separate = false;
        for outcome in outcomes {
            if separate {
                write!(self.sink, "\n")?;
            }
            separate = true;
            match outcome {
                FunctionOutcome::Transformed(cfg) => self.write_cfg(cfg)?,
                FunctionOutcome::Declaration(name) => write!(self.sink, "declare {}\n", name)?,
                FunctionOutcome::Failed(err) => write!(self.sink, "; {}\n", err)?,
            }
        }
        Ok(())
    }

    /// Emit a function.
    pub fn write_cfg(&mut self, cfg: &ControlFlowGraph) -> Result<()> {
        write!(
            self.sink,
            "{} {}({})",
            if cfg.is_declaration { "declare" } else { "func" },
            cfg.name,
            cfg.params.iter().format(", ")
        )?;
        if !cfg.ret_type.is_empty() {
            write!(self.sink, " {}", cfg.ret_type)?;
        }
        if cfg.is_declaration {
            return write!(self.sink, "\n");
        }
        write!(self.sink, " {{\n")?;
        for bb in cfg.blocks() {
            self.write_block(bb)?;
        }
        write!(self.sink, "}}\n")?;
        Ok(())
    }

    /// Emit a basic block.
    pub fn write_block(&mut self, bb: &BasicBlock) -> Result<()> {
        write!(self.sink, "{}:", bb.label)?;
        if !bb.preds.is_empty() {
            write!(self.sink, "  ; preds {}", bb.preds.iter().format(", "))?;
        }
        write!(self.sink, "\n")?;
        for inst in &bb.insts {
            write!(self.sink, "    {}\n", inst)?;
        }
        Ok(())
    }
}
