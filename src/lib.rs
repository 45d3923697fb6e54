// Copyright (c) 2017-2021 Fabian Schuiki

//! Control flow analysis and Gated-SSA construction for functions in SSA form.
//!
//! This library builds control flow graphs from function records, computes
//! dominance, control dependence, and natural loops on them, and rewrites
//! their phi nodes and memory instructions into a side-effect-free gated form
//! suitable for term rewriting.

#[macro_use]
extern crate log;

pub mod analysis;
pub mod assembly;
pub mod engine;
pub mod error;
pub mod ir;
pub mod module;
pub mod opt;
pub mod pass;
pub mod verifier;

pub use crate::error::{FunctionError, GsaError, Result};
