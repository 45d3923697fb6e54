// Copyright (c) 2017-2021 Fabian Schuiki

//! Equivalence checking of modules through a term rewriting backend.
//!
//! The `Engine` transforms the functions of every module into GSA form and
//! hands them to a `TermBackend`, which lowers them into terms, saturates its
//! rewrite system, and answers equivalence queries. The backend's algorithm is
//! opaque to this crate.

use crate::{
    ir::ControlFlowGraph,
    module::{FunctionOutcome, Module},
    opt::prelude::*,
};
use std::collections::BTreeMap;

/// A term rewriting system that decides equivalence of functions.
pub trait TermBackend {
    /// A handle to a term previously built by the backend.
    type Handle;
    /// The error raised by the backend.
    type Error;

    /// Build the term of a function in GSA form.
    ///
    /// `module` is the position of the function's module in the comparison.
    fn lower_function(
        &mut self,
        module: usize,
        cfg: &ControlFlowGraph,
    ) -> Result<Self::Handle, Self::Error>;

    /// Apply the rewrite rules until a fixpoint is reached.
    fn saturate(&mut self) -> Result<(), Self::Error>;

    /// Check whether two terms are known to be equivalent.
    fn equivalent(&mut self, a: &Self::Handle, b: &Self::Handle) -> bool;
}

/// Compares the functions of several modules.
pub struct Engine<B> {
    backend: B,
    ctx: PassContext,
}

impl<B: TermBackend> Engine<B> {
    /// Create a new engine on top of a backend.
    pub fn new(backend: B, ctx: PassContext) -> Self {
        Self { backend, ctx }
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume the engine and return the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Check whether the modules are equivalent.
    ///
    /// Functions are matched by name. Only functions transformed successfully
    /// in every module take part; failed functions and declarations are
    /// excluded. With fewer than two modules the answer is trivially `true`;
    /// without any function common to all modules it is `false`.
    pub fn compare(&mut self, modules: &[Module]) -> Result<bool, B::Error> {
        if modules.len() < 2 {
            return Ok(true);
        }
        let outcomes: Vec<Vec<FunctionOutcome>> =
            modules.iter().map(|m| m.transform(&self.ctx)).collect();
        let transformed: Vec<BTreeMap<&str, &ControlFlowGraph>> = outcomes
            .iter()
            .map(|outcomes| {
                outcomes
                    .iter()
                    .filter_map(|o| o.cfg().map(|cfg| (cfg.name.as_str(), cfg)))
                    .collect()
            })
            .collect();

        let common: Vec<&str> = transformed[0]
            .keys()
            .cloned()
            .filter(|name| transformed[1..].iter().all(|m| m.contains_key(name)))
            .collect();
        if common.is_empty() {
            info!("No function is common to all {} modules", modules.len());
            return Ok(false);
        }
        info!(
            "Comparing {} functions across {} modules",
            common.len(),
            modules.len()
        );

        let mut handles = Vec::with_capacity(common.len());
        for &name in &common {
            let per_module = transformed
                .iter()
                .enumerate()
                .map(|(i, m)| self.backend.lower_function(i, m[name]))
                .collect::<Result<Vec<_>, _>>()?;
            handles.push((name, per_module));
        }

        self.backend.saturate()?;

        for (name, per_module) in &handles {
            let (first, rest) = match per_module.split_first() {
                Some(split) => split,
                None => continue,
            };
            for other in rest {
                if !self.backend.equivalent(first, other) {
                    info!("Function {} differs", name);
                    return Ok(false);
                }
            }
            debug!("Function {} is equivalent", name);
        }
        Ok(true)
    }
}
