// Copyright (c) 2017-2021 Fabian Schuiki

//! Facilities to emit control flow graphs as human-readable text or as
//! Graphviz DOT.

pub mod dot;
pub mod writer;

pub use self::dot::{to_dot, write_dot};
pub use self::writer::Writer;

use crate::module::FunctionOutcome;
use std::io::{Result, Write};

/// Emit the textual form of a transformed module.
pub fn write_module(sink: impl Write, outcomes: &[FunctionOutcome]) -> Result<()> {
    Writer::new(sink).write_module(outcomes)
}
