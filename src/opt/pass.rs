// Copyright (c) 2017-2021 Fabian Schuiki

use crate::{
    error::{FunctionError, GsaError, Result},
    ir::prelude::*,
    module::{FunctionOutcome, Module},
    verifier::Verifier,
};
use rayon::prelude::*;

/// A transformation pass.
///
/// The infrastructure will always call `run_on_module()`. Implementors of the
/// trait only provide `run_on_cfg()`; the `Pass` trait provides a sane default
/// for building each function's graph, skipping declarations, and verifying
/// the result.
pub trait Pass {
    /// Run this pass on an entire module.
    ///
    /// Functions are processed in parallel. The outcomes are in the order of
    /// the module's functions.
    fn run_on_module(ctx: &PassContext, module: &Module) -> Vec<FunctionOutcome> {
        module
            .functions
            .par_iter()
            .map(|func| Self::run_on_function(ctx, func))
            .collect()
    }

    /// Run this pass on a single function record.
    ///
    /// Failures are attributed to the function and never escape.
    fn run_on_function(ctx: &PassContext, func: &FunctionRecord) -> FunctionOutcome {
        match Self::build_and_run(ctx, func) {
            Ok(Some(cfg)) => FunctionOutcome::Transformed(cfg),
            Ok(None) => FunctionOutcome::Declaration(func.name.clone()),
            Err(err) => {
                warn!("Skipping function {}: {}", func.name, err);
                FunctionOutcome::Failed(FunctionError::new(func.name.as_str(), err))
            }
        }
    }

    #[doc(hidden)]
    fn build_and_run(ctx: &PassContext, func: &FunctionRecord) -> Result<Option<ControlFlowGraph>> {
        let mut cfg = ControlFlowGraph::new(func.clone())?;
        if cfg.is_declaration {
            debug!("Function {} is a declaration", cfg.name);
            return Ok(None);
        }
        Self::run_on_cfg(ctx, &mut cfg)?;
        if ctx.verify {
            let mut verifier = Verifier::new();
            verifier.verify_cfg(&cfg)?;
            verifier
                .finish()
                .map_err(|errs| GsaError::Verification(errs.to_string()))?;
        }
        Ok(Some(cfg))
    }

    /// Run this pass on the control flow graph of a function.
    ///
    /// Returns whether the graph was modified.
    fn run_on_cfg(ctx: &PassContext, cfg: &mut ControlFlowGraph) -> Result<bool>;
}

/// Additional context and configuration for passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassContext {
    /// Verify every transformed function.
    pub verify: bool,
}
